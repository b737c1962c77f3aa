//! Pipeline controller for the denoising transcoder.
//!
//! Wires demux → decode → adapt → denoise → encode → mux, reconciling the
//! frame sizes between stages so that every stage sees exactly the chunk
//! length it asked for.
//!
//! # Architecture
//!
//! ```text
//! Demuxer ─▶ Decoder ─▶ FormatAdapter ─▶ FrameReconciler (N1)
//!                                              │
//!                                              ▼
//!                                          Denoiser
//!                                              │
//!                                              ▼
//!                       Muxer ◀─ Encoder ◀─ FrameReconciler (N2)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use denoise_transcoder::config::AppConfig;
//! use denoise_transcoder::pipeline::Pipeline;
//!
//! let config = AppConfig::default();
//! let pipeline = Pipeline::open_files("noisy.flac", "clean.mp3", &config).unwrap();
//!
//! // Any clone of the handle stops the run between packets.
//! let abort = pipeline.abort_handle();
//! # drop(abort);
//!
//! let report = pipeline.run().unwrap();
//! assert_eq!(report.final_state, denoise_transcoder::pipeline::PipelineState::Closed);
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{negotiate_denoise_len, AbortHandle, Pipeline, PipelineError, Stages};
pub use state::{PipelineState, TranscodeReport};
