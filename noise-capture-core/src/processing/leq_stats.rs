use serde::{Deserialize, Serialize};

use crate::models::analysis::{db_to_power, power_to_db};

/// Streaming min / max / energetic mean over a sequence of levels in dB.
///
/// The mean is computed in the power domain: `10·log10(Σ10^(L/10) / n)`.
/// A fresh instance starts every session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeqStatistics {
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
    power_sum: f64,
}

impl LeqStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, leq: f64) {
        self.count += 1;
        self.min = Some(self.min.map_or(leq, |m| m.min(leq)));
        self.max = Some(self.max.map_or(leq, |m| m.max(leq)));
        self.power_sum += db_to_power(leq);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Energetic mean, `None` until a value has been added.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(power_to_db(self.power_sum / self.count as f64))
    }
}

impl Extend<f64> for LeqStatistics {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for leq in iter {
            self.add(leq);
        }
    }
}
