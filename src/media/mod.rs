//! Container and codec collaborators.
//!
//! The pipeline only talks to the four traits defined here.  Production
//! implementations live in [`input`] (symphonia demux + decode), [`wav`]
//! (hound encode + mux) and [`mp3`] (LAME encode, raw stream mux); test
//! doubles live in `mock` under `cfg(test)`.
//!
//! ```text
//! Demuxer ──CompressedPacket──▶ Decoder ──DecodedFrame──▶ (pipeline)
//! (pipeline) ──ReconciledChunk──▶ Encoder ──EncodedPacket──▶ Muxer
//! ```
//!
//! All traits are object-safe and `Send` so the boxed stages can move onto
//! the blocking thread that runs the pipeline.

pub mod input;
#[cfg(test)]
pub mod mock;
pub mod mp3;
pub mod wav;

use std::path::Path;

use thiserror::Error;

use crate::audio::{DecodedFrame, ReconciledChunk};

pub use input::{SymphoniaDecoder, SymphoniaDemuxer};
pub use mp3::{Mp3Encoder, Mp3Muxer};
pub use wav::{WavEncoder, WavMuxer};

// ---------------------------------------------------------------------------
// MediaError
// ---------------------------------------------------------------------------

/// Errors raised by the external collaborators.
///
/// Whether an error is fatal is decided by the pipeline, not here: a
/// `Decode` or `Encode` error skips one packet, everything else stops the
/// stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    /// Input missing, no audio stream, codec unavailable or output unwritable.
    #[error("open failed: {0}")]
    Open(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("write failed: {0}")]
    Write(String),
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Parameters of the selected input audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Identifier of the audio stream inside the container.
    pub stream_index: u32,
    /// Short codec name, e.g. `"mp3"` or `"pcm_s16le"`.
    pub codec: String,
    pub sample_rate: u32,
    /// Channel count, when the container declares one.
    pub channels: Option<u16>,
    /// Samples-per-channel in each decoded packet, when fixed.
    pub frames_per_packet: Option<u64>,
    /// Total samples-per-channel in the stream, when known.
    pub total_frames: Option<u64>,
}

/// One compressed packet read from the input container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPacket {
    pub stream_index: u32,
    /// Timestamp in the stream's time base.
    pub pts: u64,
    pub duration: u64,
    pub data: Vec<u8>,
}

/// One packet produced by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    /// Position of the first sample-per-channel in the output stream.
    pub pts: u64,
    /// Samples-per-channel of real audio carried by the packet.
    pub duration: u64,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Reads compressed packets from an input container.
pub trait Demuxer: Send {
    /// The audio stream selected when the input was opened.
    fn stream_info(&self) -> &StreamInfo;

    /// Next packet in container order, or `Ok(None)` at end of input.
    ///
    /// Packets of other streams are returned too; the caller filters on
    /// [`StreamInfo::stream_index`].
    fn read_packet(&mut self) -> Result<Option<CompressedPacket>, MediaError>;
}

/// Turns compressed packets into decoded frames.
pub trait Decoder: Send {
    /// Decode one packet into zero or more frames.
    fn decode(&mut self, packet: &CompressedPacket) -> Result<Vec<DecodedFrame>, MediaError>;

    /// Frames still buffered inside the decoder once input is exhausted.
    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError>;
}

/// Turns fixed-length canonical chunks into encoded packets.
pub trait Encoder: Send {
    /// Required chunk length in samples-per-channel.
    fn frame_len(&self) -> usize;

    /// Required interleaved channel count.
    fn channels(&self) -> u16;

    /// Encode one chunk of exactly [`frame_len`](Self::frame_len)
    /// samples-per-channel.  `chunk.padding` trailing samples are silence.
    fn encode(&mut self, chunk: &ReconciledChunk) -> Result<Vec<EncodedPacket>, MediaError>;

    /// Packets still buffered inside the encoder.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>, MediaError>;
}

/// Writes encoded packets into an output container.
pub trait Muxer: Send {
    fn write_header(&mut self) -> Result<(), MediaError>;

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<(), MediaError>;

    /// Finalize the container.  Must be called at most once.
    fn write_trailer(&mut self) -> Result<(), MediaError>;
}

// Compile-time assertion: every stage must be usable as a trait object.
const _: fn() = || {
    fn _assert_object_safe(
        _: Box<dyn Demuxer>,
        _: Box<dyn Decoder>,
        _: Box<dyn Encoder>,
        _: Box<dyn Muxer>,
    ) {
    }
};

// ---------------------------------------------------------------------------
// Helpers shared by the encoders and muxers
// ---------------------------------------------------------------------------

/// Real samples-per-channel in `chunk` once its padding is trimmed.
///
/// # Errors
///
/// [`MediaError::Encode`] when the chunk is not `frame_len` x `channels` or
/// claims more padding than it holds.
pub(crate) fn block_real_frames(
    chunk: &ReconciledChunk,
    frame_len: usize,
    channels: u16,
) -> Result<usize, MediaError> {
    if chunk.channels != channels || chunk.frames() != frame_len {
        return Err(MediaError::Encode(format!(
            "expected {} x {} channel(s), got {} x {}",
            frame_len,
            channels,
            chunk.frames(),
            chunk.channels
        )));
    }
    if chunk.padding > frame_len {
        return Err(MediaError::Encode(format!(
            "padding {} exceeds block length {}",
            chunk.padding, frame_len
        )));
    }
    Ok(chunk.real_frames())
}

/// Check that `path` could be created later without touching it now.
///
/// # Errors
///
/// [`MediaError::Open`] when the parent directory is missing or `path` is a
/// directory.
pub(crate) fn check_output_path(path: &Path) -> Result<(), MediaError> {
    if path.is_dir() {
        return Err(MediaError::Open(format!("{} is a directory", path.display())));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => Err(
            MediaError::Open(format!("{}: no such directory", parent.display())),
        ),
        _ => Ok(()),
    }
}
