use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Level reported for silent buffers and bands that cover no FFT bin.
///
/// Finite so that energetic sums never propagate `-inf`.
pub const SPL_FLOOR_DB: f64 = -100.0;

/// dB value to linear power.
pub fn db_to_power(level: f64) -> f64 {
    10f64.powf(level / 10.0)
}

/// Linear power to dB, clamped at [`SPL_FLOOR_DB`].
pub fn power_to_db(power: f64) -> f64 {
    if power > 0.0 && power.is_finite() {
        (10.0 * power.log10()).max(SPL_FLOOR_DB)
    } else {
        SPL_FLOOR_DB
    }
}

/// Calibrated levels computed from one analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Per-bin levels up to the highest analysed frequency, when requested.
    pub spectrum: Option<Vec<f64>>,
    /// Third-octave levels, aligned with the engine's band plan.
    pub band_levels: Vec<f64>,
    /// Energetic sum of `band_levels`.
    pub global_level: f64,
}

impl AnalysisResult {
    /// Energetic sum of results captured over disjoint windows.
    ///
    /// Each band, each spectrum bin and the global level is converted to
    /// power, summed and converted back. The merged spectrum is kept only if
    /// every input carries one.
    pub fn merge(results: &[AnalysisResult]) -> Result<AnalysisResult, CaptureError> {
        let Some(first) = results.first() else {
            return Err(CaptureError::ShapeMismatch {
                expected: 1,
                found: 0,
            });
        };

        let band_count = first.band_levels.len();
        if let Some(bad) = results.iter().find(|r| r.band_levels.len() != band_count) {
            log::error!(
                "refusing to merge results with {} and {} bands",
                band_count,
                bad.band_levels.len()
            );
            return Err(CaptureError::ShapeMismatch {
                expected: band_count,
                found: bad.band_levels.len(),
            });
        }

        let band_levels = energetic_sum(results.iter().map(|r| r.band_levels.as_slice()), band_count);

        let spectrum = match first.spectrum.as_ref() {
            Some(first_spectrum) if results.iter().all(|r| r.spectrum.is_some()) => {
                let bins = first_spectrum.len();
                let mut spectra = Vec::with_capacity(results.len());
                for result in results {
                    let spectrum = result.spectrum.as_deref().unwrap_or_default();
                    if spectrum.len() != bins {
                        return Err(CaptureError::ShapeMismatch {
                            expected: bins,
                            found: spectrum.len(),
                        });
                    }
                    spectra.push(spectrum);
                }
                Some(energetic_sum(spectra.into_iter(), bins))
            }
            _ => None,
        };

        let global_power: f64 = results.iter().map(|r| db_to_power(r.global_level)).sum();

        Ok(AnalysisResult {
            spectrum,
            band_levels,
            global_level: power_to_db(global_power),
        })
    }
}

fn energetic_sum<'a>(rows: impl Iterator<Item = &'a [f64]>, width: usize) -> Vec<f64> {
    let mut power = vec![0.0f64; width];
    for row in rows {
        for (acc, &level) in power.iter_mut().zip(row) {
            *acc += db_to_power(level);
        }
    }
    power.into_iter().map(power_to_db).collect()
}

/// Live spectrum published by the fast lane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumSnapshot {
    /// Per-bin levels; bin `i` is centred on `i * bin_width_hz`.
    pub spectrum: Vec<f64>,
    pub bin_width_hz: f64,
    /// A-weighted third-octave levels.
    pub band_levels: Vec<f64>,
    /// Level of the whole live window, from its RMS.
    pub leq: f64,
}

/// One stored measurement window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedMeasurement {
    /// Wall-clock start of the summarised window, in recording time.
    pub started_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl DelayedMeasurement {
    pub fn new(started_at: DateTime<Utc>, result: AnalysisResult) -> Self {
        Self { started_at, result }
    }

    pub fn band_levels(&self) -> &[f64] {
        &self.result.band_levels
    }

    pub fn global_level(&self) -> f64 {
        self.result.global_level
    }

    /// Milliseconds since the Unix epoch of the window start.
    pub fn begin_record_time_millis(&self) -> i64 {
        self.started_at.timestamp_millis()
    }
}
