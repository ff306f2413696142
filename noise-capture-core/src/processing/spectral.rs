use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::models::analysis::{db_to_power, power_to_db, AnalysisResult, SPL_FLOOR_DB};
use crate::models::config::DEFAULT_REFERENCE_RMS;
use crate::models::error::CaptureError;
use crate::processing::band_plan::{Band, BandPlan};
use crate::processing::ring_buffer::RingBuffer;

/// Longest analysis window accepted, about 87 s at 48 kHz.
pub const MAX_WINDOW_LENGTH: usize = 1 << 22;

/// Turns a fixed-length window of 16-bit samples into calibrated levels.
///
/// Levels are dB relative to `reference_rms`: a signal with that RMS
/// amplitude reads exactly 90 dB. The FFT length equals the window length and
/// may be any value of at least two samples.
pub struct SpectralEngine {
    sample_rate: u32,
    bands: BandPlan,
    window: RingBuffer,
    fft: Arc<dyn Fft<f64>>,
    reference_rms: f64,
    calibration_offset: f64,
}

impl SpectralEngine {
    pub fn new(sample_rate: u32, bands: BandPlan, window_length: usize) -> Result<Self, CaptureError> {
        if sample_rate == 0 {
            return Err(CaptureError::ConfigurationFailed("sample rate must be positive".into()));
        }
        if window_length < 2 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "analysis window of {} samples is too short",
                window_length
            )));
        }
        if window_length > MAX_WINDOW_LENGTH {
            return Err(CaptureError::ConfigurationFailed(format!(
                "analysis window of {} samples exceeds {}",
                window_length, MAX_WINDOW_LENGTH
            )));
        }
        if bands.is_empty() {
            return Err(CaptureError::ConfigurationFailed(
                "band plan has no band below the frequency ceiling".into(),
            ));
        }

        let fft = FftPlanner::new().plan_fft_forward(window_length);

        Ok(Self {
            sample_rate,
            bands,
            window: RingBuffer::new(window_length),
            fft,
            reference_rms: DEFAULT_REFERENCE_RMS,
            calibration_offset: calibration_offset(DEFAULT_REFERENCE_RMS),
        })
    }

    /// Use a device-specific RMS amplitude for the 90 dB reference.
    pub fn with_reference_rms(mut self, reference_rms: f64) -> Result<Self, CaptureError> {
        if !(reference_rms.is_finite() && reference_rms > 0.0) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid reference rms: {}",
                reference_rms
            )));
        }
        self.reference_rms = reference_rms;
        self.calibration_offset = calibration_offset(reference_rms);
        Ok(self)
    }

    /// Append samples to the analysis window. No analysis happens here.
    pub fn push_samples(&mut self, chunk: &[i16]) {
        self.window.write(chunk);
    }

    /// RMS of the current window contents.
    pub fn compute_rms(&self) -> f64 {
        let sum: f64 = self
            .window
            .iter()
            .map(|s| {
                let s = f64::from(s);
                s * s
            })
            .sum();
        (sum / self.window.capacity() as f64).sqrt()
    }

    /// `20·log10(rms) + offset`, floored at [`SPL_FLOOR_DB`].
    pub fn to_db_spl(&self, rms: f64) -> f64 {
        if rms > 0.0 && rms.is_finite() {
            (20.0 * rms.log10() + self.calibration_offset).max(SPL_FLOOR_DB)
        } else {
            SPL_FLOOR_DB
        }
    }

    /// Level of the whole window computed from its RMS.
    pub fn compute_global_leq(&self) -> f64 {
        self.to_db_spl(self.compute_rms())
    }

    /// Analyse the current window.
    ///
    /// - `hanning`: taper the window before the FFT.
    /// - `a_weighting`: add the A-weighting correction to each band level.
    /// - `full_spectrum`: also return per-bin levels up to the highest band
    ///   edge or Nyquist, whichever is lower.
    pub fn analyze(
        &self,
        hanning: bool,
        a_weighting: bool,
        full_spectrum: bool,
    ) -> Result<AnalysisResult, CaptureError> {
        let n = self.window.capacity();
        let mut signal: Vec<f64> = self.window.iter().map(f64::from).collect();
        if hanning {
            apply_hann_window(&mut signal);
        }

        let mut buffer: Vec<Complex<f64>> = signal
            .into_iter()
            .map(|re| Complex { re, im: 0.0 })
            .collect();
        if buffer.len() != self.fft.len() {
            return Err(CaptureError::AnalysisFailure(format!(
                "window holds {} samples, transform expects {}",
                buffer.len(),
                self.fft.len()
            )));
        }
        self.fft.process(&mut buffer);

        let half = n / 2;
        let squared: Vec<f64> = buffer[..half].iter().map(|c| c.norm_sqr()).collect();

        let band_levels: Vec<f64> = self
            .bands
            .bands()
            .iter()
            .map(|band| {
                let level = self.band_level(&squared, band);
                if a_weighting && level > SPL_FLOOR_DB {
                    (level + band.a_weighting_db).max(SPL_FLOOR_DB)
                } else {
                    level
                }
            })
            .collect();

        let global_power: f64 = band_levels
            .iter()
            .filter(|&&level| level > SPL_FLOOR_DB)
            .map(|&level| db_to_power(level))
            .sum();

        let spectrum = full_spectrum.then(|| {
            squared[..self.spectrum_bin_count().min(half)]
                .iter()
                .map(|&value| self.to_db_spl(squared_magnitude_to_rms(value, half)))
                .collect()
        });

        Ok(AnalysisResult {
            spectrum,
            band_levels,
            global_level: power_to_db(global_power),
        })
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.window.capacity() as f64
    }

    /// Number of bins reported by a full-spectrum analysis.
    pub fn spectrum_bin_count(&self) -> usize {
        let limit = (self.sample_rate as f64 / 2.0).min(self.bands.upper_edge_hz());
        ((limit / self.bin_width()) as usize).min(self.window.capacity() / 2)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn band_plan(&self) -> &BandPlan {
        &self.bands
    }

    pub fn window_length(&self) -> usize {
        self.window.capacity()
    }

    /// Total samples pushed since creation.
    pub fn samples_pushed(&self) -> u64 {
        self.window.total_written()
    }

    fn band_level(&self, squared: &[f64], band: &Band) -> f64 {
        let Some(last_bin) = squared.len().checked_sub(1) else {
            return SPL_FLOOR_DB;
        };
        let bin_width = self.bin_width();
        let first = (band.lower_hz / bin_width).ceil() as usize;
        let last = ((band.upper_hz / bin_width).floor() as usize).min(last_bin);
        if first > last {
            return SPL_FLOOR_DB;
        }
        let sum: f64 = squared[first..=last].iter().sum();
        self.to_db_spl(squared_magnitude_to_rms(sum, squared.len()))
    }
}

impl fmt::Debug for SpectralEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralEngine")
            .field("sample_rate", &self.sample_rate)
            .field("window_length", &self.window.capacity())
            .field("bands", &self.bands.len())
            .field("reference_rms", &self.reference_rms)
            .finish()
    }
}

/// dB offset such that `reference_rms` reads 90 dB.
pub fn calibration_offset(reference_rms: f64) -> f64 {
    -20.0 * reference_rms.log10() + 90.0
}

/// RMS amplitude carried by a sum of squared FFT magnitudes over `half` bins.
fn squared_magnitude_to_rms(squared_sum: f64, half: usize) -> f64 {
    let half = half as f64;
    ((squared_sum / 2.0) / (half * half)).sqrt()
}

/// Applies a Hann window to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        *sample *= 0.5 * (1.0 - (2.0 * PI * i as f64 / n_minus_1).cos());
    }
}
