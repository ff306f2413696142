use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::analysis::{DelayedMeasurement, SpectrumSnapshot};
use crate::models::audio_models::SessionDiagnostics;
use crate::models::state::LifecycleState;
use crate::processing::leq_stats::LeqStatistics;
use crate::traits::measurement_listener::MeasurementListener;

/// Lifecycle state and cancel flag, written by the supervisor only.
#[derive(Debug)]
pub(crate) struct SessionControl {
    state: AtomicU8,
    canceled: AtomicBool,
}

impl SessionControl {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle.as_u8()),
            canceled: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Store `state` and return the previous one.
    pub(crate) fn swap_state(&self, state: LifecycleState) -> LifecycleState {
        LifecycleState::from_u8(self.state.swap(state.as_u8(), Ordering::SeqCst))
    }

    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Live values read by the supervisor's accessors.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) latest_leq: Option<f64>,
    pub(crate) latest_band_levels: Vec<f64>,
    pub(crate) statistics: LeqStatistics,
    pub(crate) diagnostics: SessionDiagnostics,
}

/// Where lanes publish their results: shared live state plus listeners.
#[derive(Clone)]
pub(crate) struct LaneSink {
    state: Arc<Mutex<SessionState>>,
    listeners: Arc<[Arc<dyn MeasurementListener>]>,
}

impl LaneSink {
    pub(crate) fn new(
        state: Arc<Mutex<SessionState>>,
        listeners: Arc<[Arc<dyn MeasurementListener>]>,
    ) -> Self {
        Self { state, listeners }
    }

    pub(crate) fn publish_spectrum(&self, snapshot: &SpectrumSnapshot) {
        {
            let mut s = self.state.lock();
            s.latest_leq = Some(snapshot.leq);
            s.latest_band_levels.clone_from(&snapshot.band_levels);
            s.diagnostics.spectrum_updates += 1;
        }
        for listener in self.listeners.iter() {
            listener.on_spectrum_updated(snapshot);
        }
    }

    pub(crate) fn publish_measurement(&self, measurement: &DelayedMeasurement) {
        {
            let mut s = self.state.lock();
            s.statistics.add(measurement.global_level());
            s.diagnostics.measurements_emitted += 1;
        }
        log::debug!(
            "measurement at {}: {:.2} dB",
            measurement.started_at,
            measurement.global_level()
        );
        for listener in self.listeners.iter() {
            listener.on_measurement_ready(measurement);
        }
    }

    pub(crate) fn record_failure(&self, lane: &str, error: &dyn std::fmt::Display) {
        log::warn!("{} analysis failed: {}", lane, error);
        self.state.lock().diagnostics.analysis_failures += 1;
    }
}
