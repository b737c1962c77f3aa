//! Growable FIFO of interleaved canonical samples.
//!
//! [`SampleBuffer`] stores interleaved `i16` samples at a fixed channel count.
//! Producers append whole sample frames to the tail; consumers take exactly
//! `n` samples-per-channel off the head.  Nothing is ever overwritten or
//! dropped, which is what keeps the pipeline's sample accounting exact.
//!
//! # Example
//!
//! ```rust
//! use denoise_transcoder::audio::SampleBuffer;
//!
//! let mut buf = SampleBuffer::new(2);
//! buf.append(&[1, -1, 2, -2, 3, -3]); // 3 stereo frames
//! assert_eq!(buf.available(), 3);
//!
//! let head = buf.consume(2).unwrap();
//! assert_eq!(head, vec![1, -1, 2, -2]);
//! assert_eq!(buf.available(), 1);
//! ```

use std::collections::VecDeque;

use thiserror::Error;

// ---------------------------------------------------------------------------
// BufferError
// ---------------------------------------------------------------------------

/// Contract violations reported by [`SampleBuffer`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// `consume` asked for more samples-per-channel than are held.
    #[error("insufficient data: requested {requested} samples-per-channel, {available} available")]
    InsufficientData { requested: usize, available: usize },
}

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// An unbounded append-then-consume queue of interleaved `i16` samples.
///
/// ## Invariant
///
/// The number of stored values is always a multiple of [`channels`](Self::channels).
/// [`append`](Self::append) enforces this on entry, so every read from the
/// head starts on a sample-frame boundary.
///
/// Head removal is O(1) amortized per sample (`VecDeque`).
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<i16>,
    channels: usize,
}

impl SampleBuffer {
    /// Create an empty buffer for `channels` interleaved channels.
    ///
    /// # Panics
    ///
    /// Panics if `channels == 0`.
    pub fn new(channels: u16) -> Self {
        assert!(channels > 0, "SampleBuffer channel count must be > 0");
        Self {
            samples: VecDeque::new(),
            channels: channels as usize,
        }
    }

    /// Append interleaved samples to the tail.
    ///
    /// # Panics
    ///
    /// Panics if `samples.len()` is not a multiple of the channel count; a
    /// partial sample frame would misalign every channel that follows it.
    pub fn append(&mut self, samples: &[i16]) {
        assert!(
            samples.len() % self.channels == 0,
            "appended {} values, not a multiple of {} channels",
            samples.len(),
            self.channels
        );
        self.samples.extend(samples.iter().copied());
    }

    /// Number of samples-per-channel currently held.
    pub fn available(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Remove and return exactly `n` samples-per-channel from the head.
    ///
    /// Fails with [`BufferError::InsufficientData`] when `available() < n`;
    /// the buffer is left untouched in that case.
    pub fn consume(&mut self, n: usize) -> Result<Vec<i16>, BufferError> {
        let available = self.available();
        if available < n {
            return Err(BufferError::InsufficientData {
                requested: n,
                available,
            });
        }
        Ok(self.samples.drain(..n * self.channels).collect())
    }

    /// Remove and return everything currently held, in order.
    ///
    /// After this call `available() == 0`.
    pub fn drain(&mut self) -> Vec<i16> {
        self.samples.drain(..).collect()
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> u16 {
        self.channels as u16
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
