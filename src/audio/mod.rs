//! Sample-level processing: buffering, format adaptation, chunk reconciliation
//! and noise suppression.
//!
//! # Data flow
//!
//! ```text
//! DecodedFrame → FormatAdapter → FrameReconciler(N1) → Denoiser
//!              → FrameReconciler(N2) → encoder
//! ```
//!
//! Every stage works on interleaved `i16` samples at the output channel count
//! (the canonical representation).  Chunk lengths are in samples-per-channel.
//!
//! # Quick Start
//!
//! ```rust
//! use denoise_transcoder::audio::{DecodedFrame, FormatAdapter, FrameReconciler};
//!
//! let adapter = FormatAdapter::new(2);
//! let mut reconciler = FrameReconciler::new("demo", 4, 2);
//!
//! let frame = DecodedFrame::interleaved_s16(vec![1, 2, 3, 4, 5, 6], 1, 0);
//! reconciler.push(&adapter.adapt(&frame).unwrap());
//!
//! let chunk = reconciler.try_take_chunk().unwrap();
//! assert_eq!(chunk.samples, vec![1, 1, 2, 2, 3, 3, 4, 4]);
//!
//! let tail = reconciler.flush_final().unwrap();
//! assert_eq!(tail.padding, 2);
//! ```

pub mod buffer;
pub mod denoise;
pub mod format;
pub mod level;
pub mod reconcile;

pub use buffer::{BufferError, SampleBuffer};
pub use denoise::{DenoiseError, Denoiser};
pub use format::{AdaptError, DecodedFrame, FormatAdapter, SampleData, SampleLayout};
pub use level::LevelMeter;
pub use reconcile::{FrameReconciler, ReconciledChunk};
