use super::lane::ChunkConsumer;
use super::shared::LaneSink;
use crate::models::analysis::SpectrumSnapshot;
use crate::models::error::CaptureError;
use crate::processing::band_plan::BandPlan;
use crate::processing::spectral::SpectralEngine;

/// Live feedback: A-weighted spectrum and instantaneous level, refreshed
/// every `refresh_period` seconds of captured audio.
///
/// The engine window is one refresh period long, so each update describes
/// only the most recent period.
#[derive(Debug)]
pub struct FastAnalysisLane {
    engine: SpectralEngine,
    refresh_samples: f64,
    samples_since_update: usize,
    samples_pushed: u64,
}

impl FastAnalysisLane {
    pub fn new(
        sample_rate: u32,
        bands: BandPlan,
        refresh_period_secs: f64,
        reference_rms: f64,
    ) -> Result<Self, CaptureError> {
        let refresh_samples = refresh_period_secs * sample_rate as f64;
        let engine = SpectralEngine::new(sample_rate, bands, refresh_samples.round() as usize)?
            .with_reference_rms(reference_rms)?;
        Ok(Self {
            engine,
            refresh_samples,
            samples_since_update: 0,
            samples_pushed: 0,
        })
    }

    /// Feed one chunk; returns a snapshot once more than one refresh period
    /// has accumulated since the previous one.
    pub fn process_chunk(&mut self, chunk: &[i16]) -> Result<Option<SpectrumSnapshot>, CaptureError> {
        self.engine.push_samples(chunk);
        self.samples_pushed += chunk.len() as u64;
        self.samples_since_update += chunk.len();

        if self.samples_since_update as f64 <= self.refresh_samples {
            return Ok(None);
        }
        self.samples_since_update = 0;

        let result = self.engine.analyze(false, true, true)?;
        Ok(Some(SpectrumSnapshot {
            spectrum: result.spectrum.unwrap_or_default(),
            bin_width_hz: self.engine.bin_width(),
            band_levels: result.band_levels,
            leq: self.engine.compute_global_leq(),
        }))
    }

    /// Samples per refresh period; also the analysis window length, rounded.
    pub fn refresh_samples(&self) -> f64 {
        self.refresh_samples
    }

    pub fn samples_pushed(&self) -> u64 {
        self.samples_pushed
    }

    pub fn bin_width(&self) -> f64 {
        self.engine.bin_width()
    }

    pub fn band_plan(&self) -> &BandPlan {
        self.engine.band_plan()
    }
}

impl ChunkConsumer for FastAnalysisLane {
    fn consume(&mut self, chunk: &[i16], sink: &LaneSink) {
        match self.process_chunk(chunk) {
            Ok(Some(snapshot)) => sink.publish_spectrum(&snapshot),
            Ok(None) => {}
            Err(e) => sink.record_failure("fast lane", &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::DEFAULT_REFERENCE_RMS;
    use crate::test_signals::sine;
    use approx::assert_abs_diff_eq;

    fn lane() -> FastAnalysisLane {
        FastAnalysisLane::new(44100, BandPlan::for_sample_rate(44100, 16000.0), 0.125, DEFAULT_REFERENCE_RMS)
            .unwrap()
    }

    #[test]
    fn updates_only_after_more_than_one_period() {
        let mut lane = lane();
        assert_abs_diff_eq!(lane.refresh_samples(), 5512.5);

        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 5512);
        assert!(lane.process_chunk(&signal).unwrap().is_none());
        assert!(lane.process_chunk(&signal[..1]).unwrap().is_some());
        assert!(lane.process_chunk(&signal[..100]).unwrap().is_none());
        assert_eq!(lane.samples_pushed(), 5613);
    }

    #[test]
    fn snapshot_reports_calibrated_level() {
        let mut lane = lane();
        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 44100);

        let mut last = None;
        for chunk in signal.chunks(1024) {
            if let Some(snapshot) = lane.process_chunk(chunk).unwrap() {
                last = Some(snapshot);
            }
        }
        let snapshot = last.unwrap();

        assert_abs_diff_eq!(snapshot.leq, 90.0, epsilon = 0.05);
        assert_eq!(snapshot.band_levels.len(), lane.band_plan().len());
        assert_abs_diff_eq!(snapshot.bin_width_hz, 44100.0 / 5513.0, epsilon = 1e-9);
        assert!(!snapshot.spectrum.is_empty());
        // A-weighting is zero at 1 kHz.
        let k = lane.band_plan().position(1000.0).unwrap();
        assert!((snapshot.band_levels[k] - 90.0).abs() < 1.5);
    }
}
