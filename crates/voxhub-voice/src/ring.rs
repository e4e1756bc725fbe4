//! Fixed-capacity PCM ring buffer.
//!
//! Decoded samples are pushed as they arrive; the segmenter reads fixed-size
//! windows with [`CircularBuffer::get`] and consumes them with
//! [`CircularBuffer::pop`].
//!
//! # Overflow
//!
//! The buffer never grows. Pushing into a full buffer discards the oldest
//! unread samples; the number discarded is returned and accumulated in
//! [`CircularBuffer::overflowed`].

/// Ten seconds of 16 kHz audio.
pub const DEFAULT_CAPACITY: usize = 10 * 16_000;

#[derive(Debug, Clone)]
pub struct CircularBuffer {
    data: Vec<f32>,
    /// Physical index of the oldest unread sample.
    start: usize,
    len: usize,
    /// Samples popped since creation or the last clear.
    head: usize,
    overflowed: u64,
}

impl CircularBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            start: 0,
            len: 0,
            head: 0,
            overflowed: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unread samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total samples consumed so far.
    #[must_use]
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Total samples discarded because the buffer was full.
    #[must_use]
    pub const fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Append samples, discarding the oldest unread ones on overflow.
    ///
    /// Returns how many samples were discarded.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let cap = self.capacity();
        let mut dropped = 0;

        // Only the newest `cap` samples can survive.
        let samples = if samples.len() > cap {
            dropped += samples.len() - cap;
            &samples[samples.len() - cap..]
        } else {
            samples
        };

        let free = cap - self.len;
        if samples.len() > free {
            let evict = samples.len() - free;
            self.start = (self.start + evict) % cap;
            self.len -= evict;
            self.head += evict;
            dropped += evict;
        }

        let write = (self.start + self.len) % cap;
        let first = samples.len().min(cap - write);
        self.data[write..write + first].copy_from_slice(&samples[..first]);
        self.data[..samples.len() - first].copy_from_slice(&samples[first..]);
        self.len += samples.len();

        self.overflowed += dropped as u64;
        dropped
    }

    /// Read `len` samples starting `offset` samples past the read cursor,
    /// without consuming them. Returns `None` if not enough are buffered.
    #[must_use]
    pub fn get(&self, offset: usize, len: usize) -> Option<Vec<f32>> {
        if offset + len > self.len {
            return None;
        }
        let cap = self.capacity();
        let begin = (self.start + offset) % cap;
        let first = len.min(cap - begin);
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&self.data[begin..begin + first]);
        out.extend_from_slice(&self.data[..len - first]);
        Some(out)
    }

    /// Consume up to `n` samples.
    pub fn pop(&mut self, n: usize) {
        let n = n.min(self.len);
        self.start = (self.start + n) % self.capacity();
        self.len -= n;
        self.head += n;
    }

    /// Drop all buffered samples and reset counters.
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
        self.head = 0;
        self.overflowed = 0;
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
