use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::queue::ChunkQueue;
use super::shared::{LaneSink, SessionControl};
use crate::models::error::CaptureError;

/// Analysis stage run on a lane thread, one chunk at a time.
pub(crate) trait ChunkConsumer: Send + 'static {
    fn consume(&mut self, chunk: &[i16], sink: &LaneSink);
}

/// Clears the lane's active flag on every exit path, unwinding included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running lane thread.
pub(crate) struct LaneHandle {
    name: String,
    active: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LaneHandle {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for the lane to exit.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} panicked", self.name);
            }
        }
    }
}

/// Spawn a lane draining `queue` into `consumer` until the session is
/// draining with nothing left queued, or canceled.
pub(crate) fn spawn_lane<C: ChunkConsumer>(
    name: &str,
    mut consumer: C,
    queue: ChunkQueue,
    control: Arc<SessionControl>,
    sink: LaneSink,
    poll_interval: Duration,
) -> Result<LaneHandle, CaptureError> {
    let active = Arc::new(AtomicBool::new(true));
    let guard = ActiveGuard(Arc::clone(&active));

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = guard;
            run_lane(&mut consumer, &queue, &control, &sink, poll_interval);
        })
        .map_err(|e| CaptureError::Unknown(format!("failed to spawn {}: {}", name, e)))?;

    Ok(LaneHandle {
        name: name.to_string(),
        active,
        handle: Some(handle),
    })
}

fn run_lane<C: ChunkConsumer>(
    consumer: &mut C,
    queue: &ChunkQueue,
    control: &SessionControl,
    sink: &LaneSink,
    poll_interval: Duration,
) {
    loop {
        // Read before draining so chunks pushed just before the stop are seen.
        let draining = control.state().is_draining();
        for chunk in queue.drain() {
            if control.is_canceled() {
                return;
            }
            consumer.consume(&chunk, sink);
        }
        if control.is_canceled() || (draining && queue.is_empty()) {
            return;
        }
        thread::sleep(poll_interval);
    }
}
