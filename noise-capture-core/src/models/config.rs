use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Sample rates probed on the capture device, highest first.
pub const DEFAULT_SAMPLE_RATES: [u32; 6] = [48000, 44100, 22050, 16000, 11025, 8000];

/// RMS amplitude of a 16-bit signal that reads 90 dB SPL before gain correction.
pub const DEFAULT_REFERENCE_RMS: f64 = 2500.0;

/// "Fast" sound level meter time constant, in seconds.
pub const FAST_TIME_CONSTANT_SECS: f64 = 0.125;

/// Longest stored measurement window, in seconds.
pub const MAX_STANDARD_WINDOW_SECS: f64 = 60.0;

/// Configuration for a measurement session.
///
/// Every field has a default so partial settings files deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfiguration {
    /// Candidate capture sample rates in Hz, in order of preference.
    pub sample_rates: Vec<u32>,

    /// Device calibration offset in dB, applied as a linear gain on raw samples.
    pub gain_db: f64,

    /// RMS amplitude that maps to exactly 90 dB.
    pub reference_rms: f64,

    /// Refresh period of the live spectrum, capped at one second.
    pub fast_time_constant_secs: f64,

    /// Duration of one stored measurement window in seconds (default: 1.0).
    pub standard_window_secs: f64,

    /// Highest third-octave center frequency analysed, further bounded by Nyquist.
    pub frequency_ceiling_hz: f64,

    /// A recording is kept only if it produced at least this many measurements.
    pub min_measurement_count: usize,

    /// Sleep between drain cycles of the live lane.
    pub fast_poll_interval_ms: u64,

    /// Sleep between drain cycles of the standard lane.
    pub standard_poll_interval_ms: u64,
}

impl MeasurementConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rates.is_empty() {
            return Err("at least one candidate sample rate is required".into());
        }
        if self.sample_rates.contains(&0) {
            return Err("sample rates must be positive".into());
        }
        if !self.gain_db.is_finite() {
            return Err(format!("invalid gain: {}", self.gain_db));
        }
        if !(self.reference_rms.is_finite() && self.reference_rms > 0.0) {
            return Err(format!("invalid reference rms: {}", self.reference_rms));
        }
        if !(self.fast_time_constant_secs.is_finite() && self.fast_time_constant_secs > 0.0) {
            return Err(format!(
                "fast time constant must be positive: {}",
                self.fast_time_constant_secs
            ));
        }
        if !(self.standard_window_secs > 0.0 && self.standard_window_secs <= MAX_STANDARD_WINDOW_SECS) {
            return Err(format!(
                "standard window must be in (0, {}] seconds: {}",
                MAX_STANDARD_WINDOW_SECS, self.standard_window_secs
            ));
        }
        if !(self.frequency_ceiling_hz.is_finite() && self.frequency_ceiling_hz > 0.0) {
            return Err(format!(
                "frequency ceiling must be positive: {}",
                self.frequency_ceiling_hz
            ));
        }
        if self.fast_poll_interval_ms == 0 || self.standard_poll_interval_ms == 0 {
            return Err("poll intervals must be at least 1 ms".into());
        }
        Ok(())
    }

    /// Parse a (possibly partial) JSON settings document and validate it.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid settings: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    /// Linear amplitude gain derived from `gain_db`.
    pub fn linear_gain(&self) -> f64 {
        10f64.powf(self.gain_db / 20.0)
    }

    /// Live spectrum refresh period: never slower than once per second.
    pub fn refresh_period_secs(&self) -> f64 {
        self.fast_time_constant_secs.min(1.0)
    }
}

impl Default for MeasurementConfiguration {
    fn default() -> Self {
        Self {
            sample_rates: DEFAULT_SAMPLE_RATES.to_vec(),
            gain_db: 0.0,
            reference_rms: DEFAULT_REFERENCE_RMS,
            fast_time_constant_secs: FAST_TIME_CONSTANT_SECS,
            standard_window_secs: 1.0,
            frequency_ceiling_hz: 16000.0,
            min_measurement_count: 0,
            fast_poll_interval_ms: 1,
            standard_poll_interval_ms: 5,
        }
    }
}
