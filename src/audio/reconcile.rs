//! Fixed-length chunking between stages with different frame sizes.
//!
//! Decoders emit frames of whatever length their codec uses, the denoiser
//! needs exactly `N1` samples-per-channel per call and the encoder exactly
//! `N2`.  A [`FrameReconciler`] sits on each of those two boundaries: it
//! absorbs input of any length and hands out [`ReconciledChunk`]s of exactly
//! its configured length.
//!
//! ```text
//! decoder (160) ─▶ reconciler(256) ─▶ denoise ─▶ reconciler(1152) ─▶ encoder
//! ```
//!
//! At end of input [`flush_final`](FrameReconciler::flush_final) pads the
//! remainder with silence and records how many trailing samples are padding.
//!
//! # Example
//!
//! ```rust
//! use denoise_transcoder::audio::FrameReconciler;
//!
//! let mut rec = FrameReconciler::new("denoise", 256, 1);
//! rec.push(&vec![7; 100]);
//! assert!(rec.try_take_chunk().is_none()); // backpressure: need more input
//!
//! let last = rec.flush_final().unwrap();
//! assert_eq!(last.frames(), 256);
//! assert_eq!(last.padding, 156);
//! ```

use super::buffer::SampleBuffer;

// ---------------------------------------------------------------------------
// ReconciledChunk
// ---------------------------------------------------------------------------

/// Exactly one configured chunk length of interleaved canonical samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledChunk {
    /// Interleaved `i16` samples, `frames() * channels` values.
    pub samples: Vec<i16>,
    pub channels: u16,
    /// Position of the first sample-per-channel at this boundary.
    pub pts: u64,
    /// Trailing samples-per-channel that are silence padding, not source
    /// audio.  Zero for every chunk except those produced at end of stream.
    pub padding: usize,
}

impl ReconciledChunk {
    /// Samples-per-channel in the chunk.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Samples-per-channel that came from the source.
    pub fn real_frames(&self) -> usize {
        self.frames() - self.padding
    }
}

// ---------------------------------------------------------------------------
// FrameReconciler
// ---------------------------------------------------------------------------

/// Accumulates canonical samples and emits fixed-length chunks.
///
/// ## Padding accounting
///
/// A reconciler fed with [`push_chunk`](Self::push_chunk) remembers how many
/// trailing samples of its buffer are padding inherited from an upstream
/// flush.  Every chunk it emits reports the trailing padding it contains,
/// inherited and its own, so the encoder always knows how much of its last
/// input is real audio.
#[derive(Debug)]
pub struct FrameReconciler {
    label: &'static str,
    buffer: SampleBuffer,
    chunk_len: usize,
    /// Trailing samples-per-channel in `buffer` that are upstream padding.
    pending_padding: usize,
    next_pts: u64,
    flushed: bool,
}

impl FrameReconciler {
    /// Create a reconciler emitting chunks of `chunk_len` samples-per-channel.
    ///
    /// `label` names the boundary in log output.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_len == 0` or `channels == 0`.
    pub fn new(label: &'static str, chunk_len: usize, channels: u16) -> Self {
        assert!(chunk_len > 0, "FrameReconciler chunk length must be > 0");
        Self {
            label,
            buffer: SampleBuffer::new(channels),
            chunk_len,
            pending_padding: 0,
            next_pts: 0,
            flushed: false,
        }
    }

    /// Configured chunk length in samples-per-channel.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Samples-per-channel waiting for the next chunk.
    pub fn available(&self) -> usize {
        self.buffer.available()
    }

    /// Append interleaved source samples.
    ///
    /// Input after [`flush_final`](Self::flush_final) is dropped with a warning.
    pub fn push(&mut self, samples: &[i16]) {
        if self.flushed {
            log::warn!(
                "reconcile[{}]: {} values pushed after final flush, ignored",
                self.label,
                samples.len()
            );
            return;
        }
        if !samples.is_empty() {
            // New real audio lands after any padding already buffered.
            self.pending_padding = 0;
        }
        self.buffer.append(samples);
    }

    /// Append a chunk produced upstream, carrying its padding along.
    pub fn push_chunk(&mut self, chunk: &ReconciledChunk) {
        self.push(&chunk.samples);
        if !self.flushed && chunk.padding > 0 {
            self.pending_padding = chunk.padding.min(self.buffer.available());
        }
    }

    /// Take one chunk of exactly `chunk_len` when enough input is buffered.
    ///
    /// `None` is backpressure, not an error: the caller needs to push more.
    pub fn try_take_chunk(&mut self) -> Option<ReconciledChunk> {
        let samples = self.buffer.consume(self.chunk_len).ok()?;
        let remaining = self.buffer.available();
        let padding = self.pending_padding.saturating_sub(remaining);
        self.pending_padding = self.pending_padding.min(remaining);
        Some(self.emit(samples, padding))
    }

    /// Emit the final partial chunk, zero-padded to `chunk_len`.
    ///
    /// Call once, after input is exhausted and [`try_take_chunk`](Self::try_take_chunk)
    /// has returned `None`.  Returns `None` when nothing is buffered.  Any
    /// full chunks still buffered are not returned here; drain them first.
    pub fn flush_final(&mut self) -> Option<ReconciledChunk> {
        if self.flushed {
            log::warn!("reconcile[{}]: flush_final called twice", self.label);
            return None;
        }
        self.flushed = true;

        let available = self.buffer.available();
        if available == 0 {
            return None;
        }
        debug_assert!(
            available < self.chunk_len,
            "flush_final with a full chunk still buffered"
        );

        let own_padding = self.chunk_len.saturating_sub(available);
        let mut samples = self.buffer.drain();
        samples.resize(self.chunk_len * self.buffer.channels() as usize, 0);
        let padding = own_padding + self.pending_padding;
        self.pending_padding = 0;

        log::debug!(
            "reconcile[{}]: final chunk {} real + {} padding",
            self.label,
            self.chunk_len - padding,
            padding
        );
        Some(self.emit(samples, padding))
    }

    fn emit(&mut self, samples: Vec<i16>, padding: usize) -> ReconciledChunk {
        let chunk = ReconciledChunk {
            samples,
            channels: self.buffer.channels(),
            pts: self.next_pts,
            padding,
        };
        self.next_pts += self.chunk_len as u64;
        chunk
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: i16, len: usize) -> Vec<i16> {
        (0..len).map(|i| start.wrapping_add(i as i16)).collect()
    }

    // ---- Chunking ----------------------------------------------------------

    #[test]
    fn no_chunk_until_length_reached() {
        let mut rec = FrameReconciler::new("t", 4, 1);
        rec.push(&[1, 2, 3]);
        assert!(rec.try_take_chunk().is_none());
        rec.push(&[4]);
        let chunk = rec.try_take_chunk().unwrap();
        assert_eq!(chunk.samples, vec![1, 2, 3, 4]);
        assert_eq!(chunk.padding, 0);
        assert!(rec.try_take_chunk().is_none());
    }

    #[test]
    fn one_push_can_yield_several_chunks() {
        let mut rec = FrameReconciler::new("t", 3, 2);
        rec.push(&ramp(0, 2 * 7)); // 7 stereo frames
        let mut chunks = Vec::new();
        while let Some(chunk) = rec.try_take_chunk() {
            chunks.push(chunk);
        }
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.frames() == 3));
        assert_eq!(rec.available(), 1);
    }

    #[test]
    fn chunks_concatenate_back_to_input() {
        let input = ramp(-500, 1_000);
        let mut rec = FrameReconciler::new("t", 256, 1);
        let mut out = Vec::new();
        for piece in input.chunks(160) {
            rec.push(piece);
            while let Some(chunk) = rec.try_take_chunk() {
                assert_eq!(chunk.frames(), 256);
                out.extend(chunk.samples);
            }
        }
        let last = rec.flush_final().unwrap();
        out.extend(&last.samples[..last.real_frames()]);
        assert_eq!(out, input);
    }

    #[test]
    fn pts_advance_by_chunk_length() {
        let mut rec = FrameReconciler::new("t", 10, 1);
        rec.push(&vec![0; 25]);
        assert_eq!(rec.try_take_chunk().unwrap().pts, 0);
        assert_eq!(rec.try_take_chunk().unwrap().pts, 10);
        assert_eq!(rec.flush_final().unwrap().pts, 20);
    }

    // ---- Final flush -------------------------------------------------------

    #[test]
    fn flush_pads_remainder_and_reports_padding() {
        let mut rec = FrameReconciler::new("denoise", 256, 1);
        rec.push(&vec![5; 100]);
        let chunk = rec.flush_final().unwrap();
        assert_eq!(chunk.frames(), 256);
        assert_eq!(chunk.padding, 156);
        assert!(chunk.samples[..100].iter().all(|&s| s == 5));
        assert!(chunk.samples[100..].iter().all(|&s| s == 0));
    }

    #[test]
    fn flush_pads_every_channel() {
        let mut rec = FrameReconciler::new("t", 4, 2);
        rec.push(&[1, -1]);
        let chunk = rec.flush_final().unwrap();
        assert_eq!(chunk.samples, vec![1, -1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(chunk.padding, 3);
    }

    #[test]
    fn flush_on_empty_returns_none() {
        let mut rec = FrameReconciler::new("t", 8, 1);
        rec.push(&vec![1; 8]);
        assert!(rec.try_take_chunk().is_some());
        assert!(rec.flush_final().is_none());
    }

    #[test]
    fn second_flush_and_late_push_are_ignored() {
        let mut rec = FrameReconciler::new("t", 8, 1);
        rec.push(&[1, 2]);
        assert!(rec.flush_final().is_some());
        assert!(rec.flush_final().is_none());
        rec.push(&[3; 8]);
        assert_eq!(rec.available(), 0);
        assert!(rec.try_take_chunk().is_none());
    }

    // ---- Inherited padding -------------------------------------------------

    #[test]
    fn inherited_padding_adds_to_flush_padding() {
        // 94 denoise chunks of 256 cover 24 000 samples with 64 padding.
        let mut rec = FrameReconciler::new("encode", 1152, 1);
        let mut chunks = Vec::new();
        for i in 0..94u64 {
            let padding = if i == 93 { 64 } else { 0 };
            rec.push_chunk(&ReconciledChunk {
                samples: vec![1; 256],
                channels: 1,
                pts: i * 256,
                padding,
            });
            while let Some(chunk) = rec.try_take_chunk() {
                chunks.push(chunk);
            }
        }
        chunks.extend(rec.flush_final());

        assert_eq!(chunks.len(), 21);
        assert!(chunks[..20].iter().all(|c| c.padding == 0));
        assert_eq!(chunks[20].padding, 128 + 64);
        let real: usize = chunks.iter().map(|c| c.real_frames()).sum();
        assert_eq!(real, 24_000);
    }

    #[test]
    fn inherited_padding_split_across_two_chunks() {
        let mut rec = FrameReconciler::new("t", 8, 1);
        rec.push(&[1; 6]);
        // Upstream chunk: 1 real value, 3 padding.
        rec.push_chunk(&ReconciledChunk {
            samples: vec![2, 0, 0, 0],
            channels: 1,
            pts: 0,
            padding: 3,
        });
        let first = rec.try_take_chunk().unwrap();
        assert_eq!(first.samples, vec![1, 1, 1, 1, 1, 1, 2, 0]);
        assert_eq!(first.padding, 1);

        let last = rec.flush_final().unwrap();
        assert_eq!(last.padding, 8);
        assert_eq!(first.real_frames() + last.real_frames(), 7);
    }

    #[test]
    fn real_push_after_padding_clears_it() {
        let mut rec = FrameReconciler::new("t", 4, 1);
        rec.push_chunk(&ReconciledChunk {
            samples: vec![1, 0],
            channels: 1,
            pts: 0,
            padding: 1,
        });
        rec.push(&[3]);
        let last = rec.flush_final().unwrap();
        assert_eq!(last.padding, 1);
    }

    #[test]
    #[should_panic(expected = "chunk length must be > 0")]
    fn zero_chunk_len_panics() {
        let _ = FrameReconciler::new("t", 0, 1);
    }
}
