//! Third-octave band plan (NF-EN 61260, base 10).
//!
//! Band centres are derived from their position in the canonical nominal
//! table relative to 1000 Hz, not from the rounded nominal values:
//! `f_center = 1000 · 10^((i − i_1k) / 10)`, with edges at `f_center · 10^(∓1/20)`.

use serde::Serialize;

use crate::models::error::CaptureError;

/// Nominal third-octave center frequencies, 10 Hz to 20 kHz.
pub const STANDARD_FREQUENCIES: [f64; 34] = [
    10.0, 12.5, 16.0, 20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0,
    315.0, 400.0, 500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0,
    5000.0, 6300.0, 8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

/// A-weighting correction in dB for each entry of [`STANDARD_FREQUENCIES`] (IEC 61672-1).
pub const A_WEIGHTING: [f64; 34] = [
    -70.4, -63.4, -56.7, -50.5, -44.7, -39.4, -34.6, -30.2, -26.2, -22.5, -19.1, -16.1, -13.4,
    -10.9, -8.6, -6.6, -4.8, -3.2, -1.9, -0.8, 0.0, 0.6, 1.0, 1.2, 1.3, 1.2, 1.0, 0.5, -0.1, -1.1,
    -2.5, -4.3, -6.6, -9.3,
];

/// Index of 1000 Hz in [`STANDARD_FREQUENCIES`].
const REFERENCE_INDEX: usize = 20;

/// First band of the reduced set used for measurements (100 Hz).
const REDUCED_FIRST_INDEX: usize = 10;

/// Last band of the reduced set (16 kHz).
const REDUCED_LAST_INDEX: usize = 32;

/// One third-octave band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    /// Rounded label, e.g. 31.5 or 1000.
    pub nominal_hz: f64,
    /// Exact base-10 center frequency.
    pub center_hz: f64,
    pub lower_hz: f64,
    pub upper_hz: f64,
    pub a_weighting_db: f64,
}

impl Band {
    fn from_standard_index(index: usize) -> Self {
        let exponent = (index as f64 - REFERENCE_INDEX as f64) / 10.0;
        let center_hz = 1000.0 * 10f64.powf(exponent);
        Self {
            nominal_hz: STANDARD_FREQUENCIES[index],
            center_hz,
            lower_hz: center_hz * 10f64.powf(-1.0 / 20.0),
            upper_hz: center_hz * 10f64.powf(1.0 / 20.0),
            a_weighting_db: A_WEIGHTING[index],
        }
    }
}

/// Ordered, strictly increasing set of third-octave bands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandPlan {
    bands: Vec<Band>,
}

impl BandPlan {
    /// Builds a plan from nominal frequencies that must all appear in
    /// [`STANDARD_FREQUENCIES`], in increasing order.
    pub fn from_nominal(frequencies: &[f64]) -> Result<Self, CaptureError> {
        let mut bands = Vec::with_capacity(frequencies.len());
        let mut previous: Option<usize> = None;
        for &nominal in frequencies {
            let index = standard_index(nominal).ok_or_else(|| {
                CaptureError::ConfigurationFailed(format!(
                    "{} Hz is not a nominal third-octave frequency",
                    nominal
                ))
            })?;
            if previous.is_some_and(|p| p >= index) {
                return Err(CaptureError::ConfigurationFailed(
                    "band frequencies must be strictly increasing".into(),
                ));
            }
            previous = Some(index);
            bands.push(Band::from_standard_index(index));
        }
        Ok(Self { bands })
    }

    /// 100 Hz to 16 kHz, the set reported by measurements.
    pub fn reduced() -> Self {
        Self {
            bands: (REDUCED_FIRST_INDEX..=REDUCED_LAST_INDEX)
                .map(Band::from_standard_index)
                .collect(),
        }
    }

    /// Reduced set limited to nominal frequencies not above `ceiling_hz`.
    pub fn up_to(ceiling_hz: f64) -> Self {
        Self {
            bands: (REDUCED_FIRST_INDEX..=REDUCED_LAST_INDEX)
                .take_while(|&i| STANDARD_FREQUENCIES[i] <= ceiling_hz)
                .map(Band::from_standard_index)
                .collect(),
        }
    }

    /// Reduced set bounded by both `ceiling_hz` and the Nyquist frequency.
    pub fn for_sample_rate(sample_rate: u32, ceiling_hz: f64) -> Self {
        Self::up_to(ceiling_hz.min(sample_rate as f64 / 2.0))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Nominal center frequencies, in plan order.
    pub fn nominal_frequencies(&self) -> Vec<f64> {
        self.bands.iter().map(|b| b.nominal_hz).collect()
    }

    /// Position of the band labelled `nominal_hz`.
    pub fn position(&self, nominal_hz: f64) -> Option<usize> {
        self.bands
            .iter()
            .position(|b| (b.nominal_hz - nominal_hz).abs() < 1e-6)
    }

    /// Upper edge of the highest band, 0 for an empty plan.
    pub fn upper_edge_hz(&self) -> f64 {
        self.bands.last().map_or(0.0, |b| b.upper_hz)
    }
}

fn standard_index(nominal: f64) -> Option<usize> {
    STANDARD_FREQUENCIES
        .iter()
        .position(|&f| (f - nominal).abs() < 1e-6)
}
