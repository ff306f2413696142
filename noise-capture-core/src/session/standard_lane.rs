use chrono::{DateTime, Duration, Utc};

use super::lane::ChunkConsumer;
use super::shared::LaneSink;
use crate::models::analysis::DelayedMeasurement;
use crate::models::error::CaptureError;
use crate::processing::band_plan::BandPlan;
use crate::processing::spectral::SpectralEngine;

/// Stored measurements: one unweighted third-octave analysis per exact,
/// non-overlapping window of captured audio.
///
/// Chunks are split at window boundaries, so results do not depend on how
/// the capture device fragments the stream. A window still incomplete when
/// the session ends is dropped.
#[derive(Debug)]
pub struct StandardAnalysisLane {
    engine: SpectralEngine,
    window_length: usize,
    filled: usize,
    window_start: u64,
    recording_start: DateTime<Utc>,
}

impl StandardAnalysisLane {
    pub fn new(
        sample_rate: u32,
        bands: BandPlan,
        window_secs: f64,
        reference_rms: f64,
        recording_start: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        let window_length = (window_secs * sample_rate as f64).round() as usize;
        let engine =
            SpectralEngine::new(sample_rate, bands, window_length)?.with_reference_rms(reference_rms)?;
        Ok(Self {
            engine,
            window_length,
            filled: 0,
            window_start: 0,
            recording_start,
        })
    }

    /// Feed one chunk and return one result per window it completes.
    pub fn process_chunk(&mut self, chunk: &[i16]) -> Vec<Result<DelayedMeasurement, CaptureError>> {
        let mut completed = Vec::new();
        let mut rest = chunk;
        while !rest.is_empty() {
            let room = self.window_length - self.filled;
            if rest.len() < room {
                self.engine.push_samples(rest);
                self.filled += rest.len();
                break;
            }

            let (head, tail) = rest.split_at(room);
            self.engine.push_samples(head);
            rest = tail;

            let started_at = self.window_start_time();
            self.window_start += self.window_length as u64;
            self.filled = 0;

            completed.push(
                self.engine
                    .analyze(false, false, false)
                    .map(|result| DelayedMeasurement::new(started_at, result)),
            );
        }
        completed
    }

    /// Wall-clock time of the first sample of the current window, to the millisecond.
    fn window_start_time(&self) -> DateTime<Utc> {
        let millis = self.window_start * 1000 / u64::from(self.engine.sample_rate());
        self.recording_start + Duration::milliseconds(millis as i64)
    }

    /// Anchor window timestamps to the wall-clock time of the first sample.
    pub fn set_recording_start(&mut self, recording_start: DateTime<Utc>) {
        self.recording_start = recording_start;
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// Samples accumulated in the window not yet completed.
    pub fn pending_samples(&self) -> usize {
        self.filled
    }

    pub fn band_plan(&self) -> &BandPlan {
        self.engine.band_plan()
    }
}

impl ChunkConsumer for StandardAnalysisLane {
    fn consume(&mut self, chunk: &[i16], sink: &LaneSink) {
        for outcome in self.process_chunk(chunk) {
            match outcome {
                Ok(measurement) => sink.publish_measurement(&measurement),
                Err(e) => sink.record_failure("standard lane", &e),
            }
        }
    }
}
