/// Fixed-capacity window over the most recent 16-bit samples.
///
/// Starts zero-filled so analysis always sees exactly `capacity` samples.
/// Not thread-safe; each analysis engine owns its own buffer.
///
/// Overflow behavior: drops oldest samples.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<i16>,
    write_index: usize,
    written: u64,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            write_index: 0,
            written: 0,
            capacity,
        }
    }

    /// Write samples into the ring buffer.
    ///
    /// If `samples` is larger than capacity, only the last `capacity` samples are kept.
    pub fn write(&mut self, samples: &[i16]) {
        if samples.is_empty() || self.capacity == 0 {
            return;
        }
        self.written += samples.len() as u64;

        // If more data than capacity, only keep the tail
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let first = samples.len().min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        self.buffer[..rest].copy_from_slice(&samples[first..]);
        self.write_index = (self.write_index + samples.len()) % self.capacity;
    }

    /// Samples in window order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        self.buffer[self.write_index..]
            .iter()
            .chain(&self.buffer[..self.write_index])
            .copied()
    }

    /// Total samples written since creation.
    pub fn total_written(&self) -> u64 {
        self.written
    }

    /// The total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
