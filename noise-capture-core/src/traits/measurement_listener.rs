use crate::models::analysis::{DelayedMeasurement, SpectrumSnapshot};
use crate::models::state::LifecycleState;

/// Event sink for measurement session notifications.
///
/// Methods are called from the thread that produced the event: state
/// changes from the caller of `start`/`stop`, spectra from the live lane,
/// measurements from the standard lane. Implementations should marshal to
/// their own execution context if needed and must not block for long.
pub trait MeasurementListener: Send + Sync {
    /// Called synchronously at every lifecycle transition.
    fn on_state_changed(&self, old: LifecycleState, new: LifecycleState);

    /// Called at the live refresh rate with the latest spectrum.
    fn on_spectrum_updated(&self, snapshot: &SpectrumSnapshot);

    /// Called once per completed standard window.
    fn on_measurement_ready(&self, measurement: &DelayedMeasurement);
}
