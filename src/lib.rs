//! Streaming audio transcoder with spectral noise suppression.
//!
//! - [`audio`]: sample buffering, format adaptation, frame reconciliation,
//!   the denoise stage and level metering.
//! - [`media`]: demux/decode/encode/mux collaborators (symphonia in, MP3 or WAV out).
//! - [`pipeline`]: the controller that drives one file through every stage.
//! - [`config`]: `settings.toml` loading and validation.

pub mod audio;
pub mod config;
pub mod media;
pub mod pipeline;
