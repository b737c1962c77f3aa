//! Test doubles for the four media traits.
//!
//! Each double records what the pipeline did to it into an
//! `Arc<Mutex<..>>` handle that the test keeps after boxing the stage.
//! Failures are injected by packet timestamp or call index.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    CompressedPacket, Decoder, Demuxer, EncodedPacket, Encoder, MediaError, Muxer, StreamInfo,
};
use crate::audio::{DecodedFrame, ReconciledChunk, SampleData, SampleLayout};

/// Stream index used for the audio stream in mock inputs.
pub const AUDIO_STREAM: u32 = 0;

/// Stream info for a mock audio stream.
pub fn stream_info(sample_rate: u32, channels: u16, frames_per_packet: Option<u64>) -> StreamInfo {
    StreamInfo {
        stream_index: AUDIO_STREAM,
        codec: "mock_s16le".into(),
        sample_rate,
        channels: Some(channels),
        frames_per_packet,
        total_frames: None,
    }
}

/// Split interleaved `samples` into packets of `frames_per_packet`
/// samples-per-channel, encoded as little-endian `i16`.  `pts` counts
/// samples-per-channel.
pub fn s16_packets(
    samples: &[i16],
    channels: u16,
    frames_per_packet: usize,
) -> Vec<CompressedPacket> {
    let step = frames_per_packet * channels as usize;
    samples
        .chunks(step)
        .enumerate()
        .map(|(i, chunk)| CompressedPacket {
            stream_index: AUDIO_STREAM,
            pts: (i * frames_per_packet) as u64,
            duration: (chunk.len() / channels as usize) as u64,
            data: chunk.iter().flat_map(|s| s.to_le_bytes()).collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MockDemuxer
// ---------------------------------------------------------------------------

/// Replays a scripted sequence of packets and read errors.
pub struct MockDemuxer {
    info: StreamInfo,
    script: VecDeque<Result<CompressedPacket, MediaError>>,
}

impl MockDemuxer {
    pub fn new(info: StreamInfo, packets: Vec<CompressedPacket>) -> Self {
        Self::scripted(info, packets.into_iter().map(Ok).collect())
    }

    pub fn scripted(info: StreamInfo, script: Vec<Result<CompressedPacket, MediaError>>) -> Self {
        Self {
            info,
            script: script.into(),
        }
    }
}

impl Demuxer for MockDemuxer {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<CompressedPacket>, MediaError> {
        self.script.pop_front().transpose()
    }
}

// ---------------------------------------------------------------------------
// MockDecoder
// ---------------------------------------------------------------------------

/// Sample format the mock decoder reports.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFormat {
    /// Interleaved `i16`, exactly as packed by [`s16_packets`].
    S16,
    /// Planar `f32` scaled by 1/32768.
    PlanarF32,
    /// A format with no conversion.
    Other(&'static str),
}

/// Decodes packets produced by [`s16_packets`].
pub struct MockDecoder {
    channels: u16,
    format: MockFormat,
    fail_on_pts: HashSet<u64>,
    /// Hold each frame back until the next packet (or flush).
    delayed: bool,
    held: Option<DecodedFrame>,
    calls: Arc<Mutex<usize>>,
}

impl MockDecoder {
    pub fn new(channels: u16) -> Self {
        Self {
            channels,
            format: MockFormat::S16,
            fail_on_pts: HashSet::new(),
            delayed: false,
            held: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_format(mut self, format: MockFormat) -> Self {
        self.format = format;
        self
    }

    /// Fail with [`MediaError::Decode`] on the packet with this `pts`.
    pub fn failing_on(mut self, pts: u64) -> Self {
        self.fail_on_pts.insert(pts);
        self
    }

    /// Emit every frame one packet late; the last one comes out of `flush`.
    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }

    fn frame_for(&self, packet: &CompressedPacket) -> DecodedFrame {
        let samples: Vec<i16> = packet
            .data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let channels = self.channels as usize;
        let frames = samples.len() / channels;

        let (data, layout) = match &self.format {
            MockFormat::S16 => (SampleData::S16(samples), SampleLayout::Interleaved),
            MockFormat::PlanarF32 => {
                let mut planes = Vec::with_capacity(samples.len());
                for c in 0..channels {
                    planes.extend(
                        samples
                            .iter()
                            .skip(c)
                            .step_by(channels)
                            .map(|&s| s as f32 / 32_768.0),
                    );
                }
                (SampleData::F32(planes), SampleLayout::Planar)
            }
            MockFormat::Other(name) => (SampleData::Other((*name).into()), SampleLayout::Planar),
        };

        DecodedFrame {
            data,
            layout,
            channels: self.channels,
            frames,
            pts: packet.pts,
        }
    }
}

impl Decoder for MockDecoder {
    fn decode(&mut self, packet: &CompressedPacket) -> Result<Vec<DecodedFrame>, MediaError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail_on_pts.contains(&packet.pts) {
            return Err(MediaError::Decode(format!("corrupt packet at {}", packet.pts)));
        }
        let frame = self.frame_for(packet);
        if self.delayed {
            Ok(self.held.replace(frame).into_iter().collect())
        } else {
            Ok(vec![frame])
        }
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
        Ok(self.held.take().into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// MockEncoder
// ---------------------------------------------------------------------------

/// Records every chunk it is given and emits one packet per chunk.
pub struct MockEncoder {
    frame_len: usize,
    channels: u16,
    fail_on_call: HashSet<usize>,
    chunks: Arc<Mutex<Vec<ReconciledChunk>>>,
    flushed: Arc<Mutex<bool>>,
}

impl MockEncoder {
    pub fn new(frame_len: usize, channels: u16) -> Self {
        Self {
            frame_len,
            channels,
            fail_on_call: HashSet::new(),
            chunks: Arc::new(Mutex::new(Vec::new())),
            flushed: Arc::new(Mutex::new(false)),
        }
    }

    /// Fail with [`MediaError::Encode`] on the `n`-th call (0-based).
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_call.insert(n);
        self
    }

    /// Every chunk passed to `encode`, failed calls included.
    pub fn chunks(&self) -> Arc<Mutex<Vec<ReconciledChunk>>> {
        Arc::clone(&self.chunks)
    }

    pub fn flushed(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.flushed)
    }
}

impl Encoder for MockEncoder {
    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, chunk: &ReconciledChunk) -> Result<Vec<EncodedPacket>, MediaError> {
        let mut chunks = self.chunks.lock().unwrap();
        let call = chunks.len();
        chunks.push(chunk.clone());
        if self.fail_on_call.contains(&call) {
            return Err(MediaError::Encode(format!("encoder rejected call {call}")));
        }
        Ok(vec![EncodedPacket {
            pts: chunk.pts,
            duration: chunk.real_frames() as u64,
            data: chunk.samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, MediaError> {
        *self.flushed.lock().unwrap() = true;
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// MockMuxer
// ---------------------------------------------------------------------------

/// Everything a [`MockMuxer`] was asked to do.
#[derive(Debug, Default, Clone)]
pub struct MuxLog {
    pub headers: usize,
    pub packets: Vec<EncodedPacket>,
    pub trailers: usize,
}

pub struct MockMuxer {
    log: Arc<Mutex<MuxLog>>,
    fail_header: bool,
    fail_on_packet: Option<usize>,
}

impl MockMuxer {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MuxLog::default())),
            fail_header: false,
            fail_on_packet: None,
        }
    }

    pub fn failing_header(mut self) -> Self {
        self.fail_header = true;
        self
    }

    /// Fail with [`MediaError::Write`] on the `n`-th packet (0-based).
    pub fn failing_on_packet(mut self, n: usize) -> Self {
        self.fail_on_packet = Some(n);
        self
    }

    pub fn log(&self) -> Arc<Mutex<MuxLog>> {
        Arc::clone(&self.log)
    }
}

impl Muxer for MockMuxer {
    fn write_header(&mut self) -> Result<(), MediaError> {
        if self.fail_header {
            return Err(MediaError::Write("header refused".into()));
        }
        self.log.lock().unwrap().headers += 1;
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<(), MediaError> {
        let mut log = self.log.lock().unwrap();
        if self.fail_on_packet == Some(log.packets.len()) {
            return Err(MediaError::Write("disk full".into()));
        }
        log.packets.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), MediaError> {
        self.log.lock().unwrap().trailers += 1;
        Ok(())
    }
}
