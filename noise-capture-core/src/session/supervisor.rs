use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::fast_lane::FastAnalysisLane;
use super::lane::{spawn_lane, LaneHandle};
use super::queue::ChunkQueue;
use super::shared::{LaneSink, SessionControl, SessionState};
use super::standard_lane::StandardAnalysisLane;
use crate::models::audio_models::{CaptureFormat, SessionDiagnostics};
use crate::models::config::MeasurementConfiguration;
use crate::models::error::CaptureError;
use crate::models::state::LifecycleState;
use crate::models::summary::SessionSummary;
use crate::processing::band_plan::BandPlan;
use crate::processing::pcm;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::clock::{Clock, SystemClock};
use crate::traits::measurement_listener::MeasurementListener;

/// Owns the capture device and the two analysis lanes of one measurement
/// session.
///
/// ```text
///                              ┌→ [fast queue] → FastAnalysisLane → on_spectrum_updated
/// [CaptureProvider] → producer ┤
///   (downmix, gain)            └→ [standard queue] → StandardAnalysisLane → on_measurement_ready
/// ```
///
/// A supervisor runs a single session: `Idle → Processing → DrainingTail → Closed`.
pub struct CaptureSupervisor<P: CaptureProvider> {
    provider: Option<P>,
    config: MeasurementConfiguration,
    format: CaptureFormat,
    buffer_size: usize,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn MeasurementListener>>,

    fast_lane: Option<FastAnalysisLane>,
    standard_lane: Option<StandardAnalysisLane>,
    realtime_bands: BandPlan,
    delayed_bands: BandPlan,
    spectrum_bin_width: f64,

    control: Arc<SessionControl>,
    session_state: Arc<Mutex<SessionState>>,
    fast_queue: ChunkQueue,
    standard_queue: ChunkQueue,

    // Producer thread control; the thread hands the provider back on exit.
    capturing: Arc<AtomicBool>,
    source_exhausted: Arc<AtomicBool>,
    producer_handle: Option<thread::JoinHandle<Option<P>>>,
    fast_handle: Option<LaneHandle>,
    standard_handle: Option<LaneHandle>,

    id: Uuid,
    started_at: Option<DateTime<Utc>>,
    capture_start: Option<Instant>,
    summary: Option<SessionSummary>,
}

impl<P: CaptureProvider> CaptureSupervisor<P> {
    /// Validate `config` and pick the first capture format `provider` accepts.
    ///
    /// Fails with `DeviceUnavailable` when no candidate format is supported.
    pub fn new(provider: P, config: MeasurementConfiguration) -> Result<Self, CaptureError> {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: P,
        config: MeasurementConfiguration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let (format, buffer_size) = select_format(&provider, &config)?;
        log::info!(
            "capturing from {} at {} (buffer {} samples)",
            provider.device_info().name,
            format,
            buffer_size
        );

        let bands = BandPlan::for_sample_rate(format.sample_rate, config.frequency_ceiling_hz);
        let fast_lane = FastAnalysisLane::new(
            format.sample_rate,
            bands.clone(),
            config.refresh_period_secs(),
            config.reference_rms,
        )?;
        let standard_lane = StandardAnalysisLane::new(
            format.sample_rate,
            bands.clone(),
            config.standard_window_secs,
            config.reference_rms,
            clock.now(),
        )?;

        Ok(Self {
            provider: Some(provider),
            format,
            buffer_size,
            clock,
            listeners: Vec::new(),
            realtime_bands: fast_lane.band_plan().clone(),
            delayed_bands: standard_lane.band_plan().clone(),
            spectrum_bin_width: fast_lane.bin_width(),
            fast_lane: Some(fast_lane),
            standard_lane: Some(standard_lane),
            control: Arc::new(SessionControl::new()),
            session_state: Arc::new(Mutex::new(SessionState::default())),
            fast_queue: ChunkQueue::new(),
            standard_queue: ChunkQueue::new(),
            capturing: Arc::new(AtomicBool::new(false)),
            source_exhausted: Arc::new(AtomicBool::new(false)),
            producer_handle: None,
            fast_handle: None,
            standard_handle: None,
            id: Uuid::new_v4(),
            started_at: None,
            capture_start: None,
            summary: None,
            config,
        })
    }

    /// Register a listener. Lanes take their listener set at `start`, so
    /// listeners added later only see state changes.
    pub fn add_listener(&mut self, listener: Arc<dyn MeasurementListener>) {
        self.listeners.push(listener);
    }

    pub fn state(&self) -> LifecycleState {
        self.control.state()
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MeasurementConfiguration {
        &self.config
    }

    /// Capture format selected for this session.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Device read size in samples, all channels.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.session_state.lock().diagnostics.clone()
    }

    /// Level of the most recent live window.
    pub fn latest_leq(&self) -> Option<f64> {
        self.session_state.lock().latest_leq
    }

    /// A-weighted third-octave levels of the most recent live window.
    pub fn latest_band_levels(&self) -> Vec<f64> {
        self.session_state.lock().latest_band_levels.clone()
    }

    pub fn spectrum_bin_width(&self) -> f64 {
        self.spectrum_bin_width
    }

    pub fn realtime_band_plan(&self) -> &BandPlan {
        &self.realtime_bands
    }

    pub fn delayed_band_plan(&self) -> &BandPlan {
        &self.delayed_bands
    }

    /// Chunks captured but not yet processed by the standard lane.
    pub fn pending_chunks(&self) -> usize {
        self.standard_queue.len()
    }

    /// Whether a finite source has delivered its last chunk.
    pub fn source_exhausted(&self) -> bool {
        self.source_exhausted.load(Ordering::SeqCst)
    }

    /// Whether either lane thread is still running.
    pub fn is_analysing(&self) -> bool {
        [self.fast_handle.as_ref(), self.standard_handle.as_ref()]
            .into_iter()
            .flatten()
            .any(LaneHandle::is_active)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Seconds since `start`, 0 before it.
    pub fn elapsed_secs(&self) -> f64 {
        self.capture_start
            .map_or(0.0, |start| start.elapsed().as_secs_f64())
    }

    /// Summary of the closed session.
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Open the device and start both lanes and the producer. Transitions: idle → processing.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.state().is_idle() {
            return Err(CaptureError::InvalidState(format!(
                "can only start from idle state, session is {:?}",
                self.state()
            )));
        }
        let (Some(mut provider), Some(fast_lane), Some(mut standard_lane)) = (
            self.provider.take(),
            self.fast_lane.take(),
            self.standard_lane.take(),
        ) else {
            return Err(CaptureError::InvalidState("session already used".into()));
        };

        if let Err(e) = provider.open(&self.format, self.buffer_size) {
            self.provider = Some(provider);
            self.fast_lane = Some(fast_lane);
            self.standard_lane = Some(standard_lane);
            return Err(e);
        }

        let started_at = self.clock.now();
        standard_lane.set_recording_start(started_at);
        self.started_at = Some(started_at);
        self.capture_start = Some(Instant::now());

        let sink = self.lane_sink();
        match spawn_lane(
            "spl-fast-lane",
            fast_lane,
            self.fast_queue.clone(),
            Arc::clone(&self.control),
            sink.clone(),
            Duration::from_millis(self.config.fast_poll_interval_ms),
        ) {
            Ok(handle) => self.fast_handle = Some(handle),
            Err(e) => return Err(self.abort_start(Some(provider), e)),
        }
        // Lower priority would be preferable here; std has no portable API for it.
        match spawn_lane(
            "spl-standard-lane",
            standard_lane,
            self.standard_queue.clone(),
            Arc::clone(&self.control),
            sink,
            Duration::from_millis(self.config.standard_poll_interval_ms),
        ) {
            Ok(handle) => self.standard_handle = Some(handle),
            Err(e) => return Err(self.abort_start(Some(provider), e)),
        }

        self.set_state(LifecycleState::Processing);
        if let Err((e, provider)) = self.start_producer(provider) {
            return Err(self.abort_start(provider, e));
        }
        Ok(())
    }

    /// Stop capturing, wait for both lanes to analyse everything already
    /// captured and release the device.
    ///
    /// Transitions: processing → draining_tail → closed.
    pub fn stop(&mut self) -> Result<SessionSummary, CaptureError> {
        self.finish(false)
    }

    /// Like `stop`, but lanes drop whatever is still queued. Partial windows
    /// are never emitted and the session is not retained.
    pub fn cancel(&mut self) -> Result<SessionSummary, CaptureError> {
        self.finish(true)
    }

    // --- Internal helpers ---

    fn set_state(&self, new_state: LifecycleState) {
        let old_state = self.control.swap_state(new_state);
        if !old_state.can_transition_to(new_state) {
            log::error!("unexpected transition {:?} -> {:?}", old_state, new_state);
        }
        log::info!("session {}: {:?} -> {:?}", self.id, old_state, new_state);
        for listener in &self.listeners {
            listener.on_state_changed(old_state, new_state);
        }
    }

    fn lane_sink(&self) -> LaneSink {
        LaneSink::new(
            Arc::clone(&self.session_state),
            Arc::from(self.listeners.clone()),
        )
    }

    /// Undo a `start` that failed after the device was opened. Lanes already
    /// running are stopped and the device is closed; the supervisor cannot be
    /// started again.
    fn abort_start(&mut self, provider: Option<P>, error: CaptureError) -> CaptureError {
        log::error!("session {} failed to start: {}", self.id, error);
        self.control.cancel();
        self.capturing.store(false, Ordering::SeqCst);
        for lane in [self.fast_handle.as_mut(), self.standard_handle.as_mut()]
            .into_iter()
            .flatten()
        {
            lane.join();
        }
        if let Some(mut provider) = provider {
            if let Err(e) = provider.close() {
                log::warn!("failed to close capture device: {}", e);
            }
            self.provider = Some(provider);
        }
        if self.state().is_processing() {
            self.set_state(LifecycleState::DrainingTail);
            self.set_state(LifecycleState::Closed);
        }
        error
    }

    /// Spawn the capture thread. On failure the provider is handed back.
    fn start_producer(&mut self, provider: P) -> Result<(), (CaptureError, Option<P>)> {
        self.capturing.store(true, Ordering::SeqCst);

        // The thread takes the provider from here; a failed spawn leaves it in place.
        let slot = Arc::new(Mutex::new(Some(provider)));
        let thread_slot = Arc::clone(&slot);

        let capturing = Arc::clone(&self.capturing);
        let exhausted = Arc::clone(&self.source_exhausted);
        let control = Arc::clone(&self.control);
        let session_state = Arc::clone(&self.session_state);
        let fast_queue = self.fast_queue.clone();
        let standard_queue = self.standard_queue.clone();
        let channels = usize::from(self.format.channels);
        let gain = self.config.linear_gain();
        let idle_sleep = Duration::from_millis(self.config.fast_poll_interval_ms);
        let mut buffer = vec![0i16; self.buffer_size];

        let handle = thread::Builder::new()
            .name("spl-capture".into())
            .spawn(move || {
                let mut provider = thread_slot.lock().take()?;
                while capturing.load(Ordering::SeqCst) && !control.is_canceled() {
                    let read = match provider.read(&mut buffer) {
                        Ok(read) => read,
                        Err(e) => {
                            log::warn!("dropping chunk: {}", e);
                            session_state.lock().diagnostics.read_errors += 1;
                            thread::sleep(idle_sleep);
                            continue;
                        }
                    };
                    if read == 0 {
                        if provider.is_exhausted() {
                            log::info!("capture source exhausted");
                            exhausted.store(true, Ordering::SeqCst);
                            break;
                        }
                        thread::sleep(idle_sleep);
                        continue;
                    }

                    let mut chunk = pcm::downmix_to_mono(&buffer[..read], channels);
                    pcm::apply_gain(&mut chunk, gain);
                    {
                        let mut s = session_state.lock();
                        s.diagnostics.chunks_captured += 1;
                        s.diagnostics.samples_captured += chunk.len() as u64;
                    }
                    standard_queue.push(chunk.clone());
                    fast_queue.push(chunk);
                }
                Some(provider)
            })
            .map_err(|e| {
                (
                    CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)),
                    slot.lock().take(),
                )
            })?;

        self.producer_handle = Some(handle);
        Ok(())
    }

    fn finish(&mut self, canceled: bool) -> Result<SessionSummary, CaptureError> {
        if !self.state().is_processing() {
            return Err(CaptureError::InvalidState(format!(
                "can only stop a processing session, session is {:?}",
                self.state()
            )));
        }

        if canceled {
            self.control.cancel();
        }
        self.capturing.store(false, Ordering::SeqCst);
        let provider = self.producer_handle.take().and_then(|handle| match handle.join() {
            Ok(provider) => provider,
            Err(_) => {
                log::error!("capture thread panicked, device not released");
                None
            }
        });

        self.set_state(LifecycleState::DrainingTail);
        for lane in [self.fast_handle.as_mut(), self.standard_handle.as_mut()]
            .into_iter()
            .flatten()
        {
            lane.join();
        }

        if let Some(mut provider) = provider {
            if let Err(e) = provider.close() {
                log::warn!("failed to close capture device: {}", e);
            }
            self.provider = Some(provider);
        }
        self.set_state(LifecycleState::Closed);

        let summary = self.build_summary(canceled);
        log::info!(
            "session {} closed: {} measurements, retained: {}",
            summary.id,
            summary.measurement_count,
            summary.retained
        );
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    fn build_summary(&self, canceled: bool) -> SessionSummary {
        let statistics = self.session_state.lock().statistics.clone();
        let measurement_count = statistics.count();
        SessionSummary {
            id: self.id.to_string(),
            started_at: self.started_at.unwrap_or_else(|| self.clock.now()),
            duration_secs: self.elapsed_secs(),
            format: self.format,
            measurement_count,
            statistics,
            canceled,
            retained: SessionSummary::is_retained(
                canceled,
                measurement_count,
                self.config.min_measurement_count,
            ),
        }
    }
}

impl<P: CaptureProvider> Drop for CaptureSupervisor<P> {
    fn drop(&mut self) {
        if self.state().is_processing() {
            let _ = self.cancel();
        }
    }
}

/// First candidate format accepted by `provider`, with its read buffer size.
fn select_format<P: CaptureProvider>(
    provider: &P,
    config: &MeasurementConfiguration,
) -> Result<(CaptureFormat, usize), CaptureError> {
    for format in CaptureFormat::candidates(&config.sample_rates) {
        match provider.min_buffer_size(&format) {
            Some(min_buffer) => {
                let fast_buffer = (config.fast_time_constant_secs
                    * f64::from(format.sample_rate)
                    * f64::from(format.channels)) as usize;
                return Ok((format, min_buffer.max(fast_buffer).max(1)));
            }
            None => log::debug!("capture format {} not supported", format),
        }
    }
    Err(CaptureError::DeviceUnavailable(format!(
        "{} supports none of the candidate formats",
        provider.device_info().name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{DelayedMeasurement, SpectrumSnapshot};
    use crate::models::audio_models::{AudioSource, SampleEncoding};
    use crate::models::config::DEFAULT_REFERENCE_RMS;
    use crate::test_signals::sine;
    use crate::traits::clock::FixedClock;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    enum Step {
        Data(Vec<i16>),
        Fail,
    }

    /// In-memory device replaying a script of reads.
    struct ScriptedProvider {
        formats: Vec<CaptureFormat>,
        script: VecDeque<Step>,
        endless: bool,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedProvider {
        fn new(formats: Vec<CaptureFormat>, script: Vec<Step>) -> Self {
            Self {
                formats,
                script: script.into(),
                endless: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn mono(signal: &[i16], chunk: usize) -> Self {
            Self::new(
                vec![CaptureFormat::mono16(44100)],
                signal.chunks(chunk).map(|c| Step::Data(c.to_vec())).collect(),
            )
        }
    }

    impl CaptureProvider for ScriptedProvider {
        fn min_buffer_size(&self, format: &CaptureFormat) -> Option<usize> {
            self.formats.contains(format).then_some(1024)
        }

        fn open(&mut self, _format: &CaptureFormat, _buffer_size: usize) -> Result<(), CaptureError> {
            Ok(())
        }

        fn read(&mut self, buffer: &mut [i16]) -> Result<usize, CaptureError> {
            match self.script.pop_front() {
                Some(Step::Data(mut data)) => {
                    let n = data.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.script.push_front(Step::Data(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Step::Fail) => Err(CaptureError::CaptureRead("overrun".into())),
                None if self.endless => {
                    thread::sleep(Duration::from_millis(1));
                    buffer.fill(0);
                    Ok(buffer.len())
                }
                None => Ok(0),
            }
        }

        fn close(&mut self) -> Result<(), CaptureError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_exhausted(&self) -> bool {
            !self.endless && self.script.is_empty()
        }

        fn device_info(&self) -> AudioSource {
            AudioSource {
                id: "scripted".into(),
                name: "Scripted device".into(),
                is_default: true,
            }
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        transitions: Mutex<Vec<(LifecycleState, LifecycleState)>>,
        spectra: Mutex<Vec<SpectrumSnapshot>>,
        measurements: Mutex<Vec<DelayedMeasurement>>,
    }

    impl MeasurementListener for RecordingListener {
        fn on_state_changed(&self, old: LifecycleState, new: LifecycleState) {
            self.transitions.lock().push((old, new));
        }

        fn on_spectrum_updated(&self, snapshot: &SpectrumSnapshot) {
            self.spectra.lock().push(snapshot.clone());
        }

        fn on_measurement_ready(&self, measurement: &DelayedMeasurement) {
            self.measurements.lock().push(measurement.clone());
        }
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    fn supervisor(
        provider: ScriptedProvider,
        config: MeasurementConfiguration,
    ) -> (CaptureSupervisor<ScriptedProvider>, Arc<RecordingListener>) {
        let mut supervisor =
            CaptureSupervisor::with_clock(provider, config, Arc::new(FixedClock(epoch()))).unwrap();
        let listener = Arc::new(RecordingListener::default());
        supervisor.add_listener(listener.clone());
        (supervisor, listener)
    }

    fn wait_until_exhausted(supervisor: &CaptureSupervisor<ScriptedProvider>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !supervisor.source_exhausted() {
            assert!(Instant::now() < deadline, "source never exhausted");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn run_to_completion(
        provider: ScriptedProvider,
        config: MeasurementConfiguration,
    ) -> (SessionSummary, Arc<RecordingListener>, SessionDiagnostics) {
        let (mut supervisor, listener) = supervisor(provider, config);
        supervisor.start().unwrap();
        wait_until_exhausted(&supervisor);
        let summary = supervisor.stop().unwrap();
        (summary, listener, supervisor.diagnostics())
    }

    #[test]
    fn no_supported_format_means_device_unavailable() {
        let provider = ScriptedProvider::new(Vec::new(), Vec::new());
        let err = CaptureSupervisor::new(provider, MeasurementConfiguration::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let provider = ScriptedProvider::mono(&[], 1);
        let config = MeasurementConfiguration {
            reference_rms: 0.0,
            ..Default::default()
        };
        let err = CaptureSupervisor::new(provider, config).err().unwrap();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
    }

    #[test]
    fn oversized_window_fails_without_allocating() {
        let config = MeasurementConfiguration {
            standard_window_secs: 1e30,
            ..Default::default()
        };
        let err = CaptureSupervisor::new(ScriptedProvider::mono(&[], 1), config).err().unwrap();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));

        let lane = StandardAnalysisLane::new(
            44100,
            BandPlan::for_sample_rate(44100, 16000.0),
            1e30,
            DEFAULT_REFERENCE_RMS,
            epoch(),
        );
        assert!(matches!(lane, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn picks_highest_supported_rate_first() {
        let stereo_22k = CaptureFormat {
            sample_rate: 22050,
            encoding: SampleEncoding::Pcm16,
            channels: 2,
        };
        let provider = ScriptedProvider::new(vec![CaptureFormat::mono16(8000), stereo_22k], Vec::new());
        let supervisor = CaptureSupervisor::new(provider, MeasurementConfiguration::default()).unwrap();

        assert_eq!(supervisor.format(), stereo_22k);
        assert_eq!(supervisor.buffer_size(), 5512);
        assert_abs_diff_eq!(supervisor.spectrum_bin_width(), 22050.0 / 2756.0, epsilon = 1e-9);
        assert_eq!(supervisor.realtime_band_plan().nominal_frequencies().last(), Some(&10000.0));
        assert_eq!(supervisor.delayed_band_plan(), supervisor.realtime_band_plan());
    }

    #[test]
    fn full_session_emits_one_measurement_per_second() {
        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 44100 * 3 + 2000);
        let config = MeasurementConfiguration {
            min_measurement_count: 3,
            ..Default::default()
        };
        let (summary, listener, diagnostics) =
            run_to_completion(ScriptedProvider::mono(&signal, 4410), config);

        assert_eq!(
            *listener.transitions.lock(),
            vec![
                (LifecycleState::Idle, LifecycleState::Processing),
                (LifecycleState::Processing, LifecycleState::DrainingTail),
                (LifecycleState::DrainingTail, LifecycleState::Closed),
            ]
        );

        let measurements = listener.measurements.lock();
        assert_eq!(measurements.len(), 3);
        for (i, m) in measurements.iter().enumerate() {
            assert_eq!(m.started_at, epoch() + chrono::Duration::seconds(i as i64));
            assert_abs_diff_eq!(m.global_level(), 90.0, epsilon = 0.05);
        }

        let spectra = listener.spectra.lock();
        assert!(!spectra.is_empty());
        assert_abs_diff_eq!(spectra.last().unwrap().leq, 90.0, epsilon = 0.1);

        assert_eq!(summary.measurement_count, 3);
        assert!(summary.retained);
        assert!(!summary.canceled);
        assert_eq!(summary.started_at, epoch());
        assert_abs_diff_eq!(summary.mean_level().unwrap(), 90.0, epsilon = 0.05);

        assert_eq!(diagnostics.samples_captured, signal.len() as u64);
        assert_eq!(diagnostics.measurements_emitted, 3);
        assert_eq!(diagnostics.spectrum_updates, spectra.len() as u64);
        assert_eq!(diagnostics.read_errors, 0);
    }

    #[test]
    fn gain_is_applied_before_analysis() {
        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS / 2.0, 44100);
        let config = MeasurementConfiguration {
            gain_db: 20.0 * 2f64.log10(),
            ..Default::default()
        };
        let (summary, _, _) = run_to_completion(ScriptedProvider::mono(&signal, 4000), config);

        assert_eq!(summary.measurement_count, 1);
        assert_abs_diff_eq!(summary.statistics.max().unwrap(), 90.0, epsilon = 0.05);
    }

    #[test]
    fn stereo_capture_is_downmixed() {
        let mono = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 44100);
        let stereo: Vec<i16> = mono.iter().flat_map(|&s| [s, s]).collect();
        let format = CaptureFormat {
            sample_rate: 44100,
            encoding: SampleEncoding::Pcm16,
            channels: 2,
        };
        let provider = ScriptedProvider::new(
            vec![format],
            stereo.chunks(8820).map(|c| Step::Data(c.to_vec())).collect(),
        );
        let (summary, _, diagnostics) = run_to_completion(provider, MeasurementConfiguration::default());

        assert_eq!(diagnostics.samples_captured, 44100);
        assert_eq!(summary.measurement_count, 1);
        assert_abs_diff_eq!(summary.statistics.min().unwrap(), 90.0, epsilon = 0.05);
    }

    #[test]
    fn read_errors_are_counted_and_skipped() {
        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 44100);
        let mut script = vec![Step::Fail];
        script.extend(signal[..22050].chunks(2205).map(|c| Step::Data(c.to_vec())));
        script.push(Step::Fail);
        script.extend(signal[22050..].chunks(2205).map(|c| Step::Data(c.to_vec())));
        let provider = ScriptedProvider::new(vec![CaptureFormat::mono16(44100)], script);

        let (summary, listener, diagnostics) =
            run_to_completion(provider, MeasurementConfiguration::default());

        assert_eq!(diagnostics.read_errors, 2);
        assert_eq!(summary.measurement_count, 1);
        assert_eq!(listener.measurements.lock().len(), 1);
    }

    #[test]
    fn partial_window_is_dropped_and_session_not_retained() {
        let signal = sine(44100, 1000.0, DEFAULT_REFERENCE_RMS, 30000);
        let config = MeasurementConfiguration {
            min_measurement_count: 1,
            ..Default::default()
        };
        let (summary, listener, _) = run_to_completion(ScriptedProvider::mono(&signal, 3000), config);

        assert!(listener.measurements.lock().is_empty());
        assert_eq!(summary.measurement_count, 0);
        assert!(summary.statistics.mean().is_none());
        assert!(!summary.retained);
    }

    #[test]
    fn cancel_stops_an_endless_source() {
        let mut provider = ScriptedProvider::new(vec![CaptureFormat::mono16(44100)], Vec::new());
        provider.endless = true;
        let closed = Arc::clone(&provider.closed);
        let (mut supervisor, listener) = supervisor(provider, MeasurementConfiguration::default());

        supervisor.start().unwrap();
        assert_eq!(supervisor.state(), LifecycleState::Processing);
        thread::sleep(Duration::from_millis(20));
        let summary = supervisor.cancel().unwrap();

        assert!(summary.canceled);
        assert!(!summary.retained);
        assert_eq!(supervisor.state(), LifecycleState::Closed);
        assert_eq!(
            listener.transitions.lock().last(),
            Some(&(LifecycleState::DrainingTail, LifecycleState::Closed))
        );
        assert!(closed.load(Ordering::SeqCst));
        assert!(!supervisor.is_analysing());
        assert!(!supervisor.source_exhausted());
        assert_eq!(supervisor.summary(), Some(&summary));
    }

    #[test]
    fn failed_start_releases_lanes_and_device() {
        let mut provider = ScriptedProvider::new(vec![CaptureFormat::mono16(44100)], Vec::new());
        provider.endless = true;
        let closed = Arc::clone(&provider.closed);
        let (mut supervisor, listener) = supervisor(provider, MeasurementConfiguration::default());

        // Device open and fast lane running when the next spawn fails.
        let mut provider = supervisor.provider.take().unwrap();
        provider.open(&supervisor.format, supervisor.buffer_size).unwrap();
        let fast_lane = supervisor.fast_lane.take().unwrap();
        supervisor.fast_handle = Some(
            spawn_lane(
                "spl-fast-lane",
                fast_lane,
                supervisor.fast_queue.clone(),
                Arc::clone(&supervisor.control),
                supervisor.lane_sink(),
                Duration::from_millis(1),
            )
            .unwrap(),
        );
        assert!(supervisor.is_analysing());

        let err = supervisor.abort_start(
            Some(provider),
            CaptureError::Unknown("failed to spawn spl-standard-lane".into()),
        );

        assert!(matches!(err, CaptureError::Unknown(_)));
        assert!(!supervisor.is_analysing());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), LifecycleState::Idle);
        assert!(listener.transitions.lock().is_empty());
        assert!(matches!(supervisor.start(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn failed_producer_spawn_closes_a_processing_session() {
        let mut provider = ScriptedProvider::new(vec![CaptureFormat::mono16(44100)], Vec::new());
        provider.endless = true;
        let closed = Arc::clone(&provider.closed);
        let (mut supervisor, listener) = supervisor(provider, MeasurementConfiguration::default());

        supervisor.start().unwrap();
        supervisor.capturing.store(false, Ordering::SeqCst);
        let provider = supervisor
            .producer_handle
            .take()
            .and_then(|handle| handle.join().unwrap());

        supervisor.abort_start(provider, CaptureError::Unknown("failed to spawn spl-capture".into()));

        assert!(!supervisor.is_analysing());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), LifecycleState::Closed);
        assert_eq!(
            listener.transitions.lock().last(),
            Some(&(LifecycleState::DrainingTail, LifecycleState::Closed))
        );
        assert!(matches!(supervisor.stop(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn lifecycle_misuse_is_rejected() {
        let (mut supervisor, _) =
            supervisor(ScriptedProvider::mono(&[0; 10], 10), MeasurementConfiguration::default());

        assert!(matches!(supervisor.stop(), Err(CaptureError::InvalidState(_))));
        supervisor.start().unwrap();
        assert!(matches!(supervisor.start(), Err(CaptureError::InvalidState(_))));
        supervisor.stop().unwrap();
        assert!(matches!(supervisor.cancel(), Err(CaptureError::InvalidState(_))));
        assert!(matches!(supervisor.start(), Err(CaptureError::InvalidState(_))));
    }
}
