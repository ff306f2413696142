use chrono::{DateTime, Utc};
use serde::Serialize;

use super::audio_models::CaptureFormat;
use crate::processing::leq_stats::LeqStatistics;

/// Returned when a measurement session closes.
///
/// Collaborators use `retained` to decide whether the stored measurements
/// of this session are kept or discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub format: CaptureFormat,
    pub measurement_count: usize,
    pub statistics: LeqStatistics,
    pub canceled: bool,
    pub retained: bool,
}

impl SessionSummary {
    /// A session is kept unless it was canceled or produced fewer than
    /// `min_measurement_count` measurements.
    pub fn is_retained(canceled: bool, measurement_count: usize, min_measurement_count: usize) -> bool {
        !canceled && measurement_count >= min_measurement_count
    }

    /// Energetic mean level over the whole session.
    pub fn mean_level(&self) -> Option<f64> {
        self.statistics.mean()
    }
}
