use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-lane FIFO of captured chunks.
///
/// The producer pushes copies; the lane thread drains everything queued at
/// once. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct ChunkQueue {
    chunks: Arc<Mutex<VecDeque<Vec<i16>>>>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chunk: Vec<i16>) {
        self.chunks.lock().push_back(chunk);
    }

    /// Take every queued chunk, oldest first.
    pub fn drain(&self) -> Vec<Vec<i16>> {
        self.chunks.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }
}
