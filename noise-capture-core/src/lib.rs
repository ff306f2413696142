//! # noise-capture-core
//!
//! Platform-agnostic sound level measurement core.
//!
//! Turns a stream of 16-bit PCM samples into calibrated third-octave levels.
//! Platform backends implement the `CaptureProvider` trait and plug into the
//! generic `CaptureSupervisor`, which feeds two analysis lanes:
//!
//! - the fast lane refreshes an A-weighted spectrum and the instantaneous
//!   level several times per second for live display;
//! - the standard lane emits one timestamped third-octave measurement per
//!   window (one second by default) for storage.
//!
//! ## Architecture
//!
//! ```text
//! noise-capture-core (this crate)
//! ├── traits/       ← CaptureProvider, MeasurementListener, Clock
//! ├── models/       ← CaptureError, LifecycleState, MeasurementConfiguration, AnalysisResult, etc.
//! ├── processing/   ← SpectralEngine, BandPlan, RingBuffer, LeqStatistics, PCM helpers
//! └── session/      ← CaptureSupervisor, FastAnalysisLane, StandardAnalysisLane
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_signals;

// Re-export key types at crate root for convenience.
pub use models::analysis::{AnalysisResult, DelayedMeasurement, SpectrumSnapshot, SPL_FLOOR_DB};
pub use models::audio_models::{AudioSource, CaptureFormat, SampleEncoding, SessionDiagnostics};
pub use models::config::MeasurementConfiguration;
pub use models::error::CaptureError;
pub use models::state::LifecycleState;
pub use models::summary::SessionSummary;
pub use processing::band_plan::{Band, BandPlan};
pub use processing::leq_stats::LeqStatistics;
pub use processing::ring_buffer::RingBuffer;
pub use processing::spectral::SpectralEngine;
pub use session::fast_lane::FastAnalysisLane;
pub use session::standard_lane::StandardAnalysisLane;
pub use session::supervisor::CaptureSupervisor;
pub use traits::capture_provider::CaptureProvider;
pub use traits::clock::{Clock, FixedClock, SystemClock};
pub use traits::measurement_listener::MeasurementListener;
