//! Process-wide scratch buffer pool.
//!
//! The transmitter needs one PCM frame and one packet buffer per encoded
//! frame. Buffers are grouped by size class; a checkout is exclusively owned
//! by its [`Pooled`] guard and goes back to its class when the guard drops,
//! on success and error paths alike. Only the free lists are locked.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use voxhub_core::SAMPLES_PER_FRAME;

/// Largest packet libopus will produce for one frame.
pub const MAX_PACKET_LEN: usize = 4000;

/// Idle buffers kept per class; extras are freed on return.
const MAX_IDLE: usize = 256;

static GLOBAL: BufferPool = BufferPool::new();

/// The shared pool used by every session.
pub fn global() -> &'static BufferPool {
    &GLOBAL
}

/// Size classes used by the audio path.
pub struct BufferPool {
    /// One 60 ms mono frame of 16-bit samples.
    pub pcm: SizeClass<i16>,
    /// One compressed packet.
    pub packets: SizeClass<u8>,
}

impl BufferPool {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pcm: SizeClass::new(SAMPLES_PER_FRAME, MAX_IDLE),
            packets: SizeClass::new(MAX_PACKET_LEN, MAX_IDLE),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Free list of equally sized buffers.
pub struct SizeClass<T> {
    len: usize,
    max_idle: usize,
    free: Mutex<Vec<Vec<T>>>,
}

impl<T: Copy + Default> SizeClass<T> {
    #[must_use]
    pub const fn new(len: usize, max_idle: usize) -> Self {
        Self {
            len,
            max_idle,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Buffer length of this class.
    #[must_use]
    pub const fn buffer_len(&self) -> usize {
        self.len
    }

    /// Take a zeroed buffer of [`buffer_len`](Self::buffer_len) elements.
    pub fn checkout(&self) -> Pooled<'_, T> {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let buf = reused.unwrap_or_else(|| vec![T::default(); self.len]);
        Pooled {
            class: self,
            buf: Some(buf),
        }
    }

    /// Buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn give_back(&self, mut buf: Vec<T>) {
        buf.clear();
        buf.resize(self.len, T::default());
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// Exclusive checkout from a [`SizeClass`], returned on drop.
pub struct Pooled<'a, T: Copy + Default> {
    class: &'a SizeClass<T>,
    buf: Option<Vec<T>>,
}

impl<T: Copy + Default> Deref for Pooled<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl<T: Copy + Default> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T: Copy + Default> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.class.give_back(buf);
        }
    }
}

impl<T: Copy + Default + std::fmt::Debug> std::fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled").field("len", &self.len()).finish()
    }
}
