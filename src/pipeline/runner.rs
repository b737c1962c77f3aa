//! Pipeline controller: drives demux → decode → adapt → denoise → encode → mux.
//!
//! [`Pipeline`] owns every stage and both frame reconcilers and walks the
//! [`PipelineState`] machine exactly once per run.
//!
//! # Pipeline flow
//!
//! ```text
//! Opening   negotiate N1 / N2 / channels, create Denoiser, write header
//! Streaming for each audio packet:
//!             decode ─▶ FormatAdapter ─▶ reconciler#1 (N1)
//!               └─▶ Denoiser ─▶ reconciler#2 (N2) ─▶ encoder ─▶ muxer
//! Draining  decoder.flush ─▶ reconciler#1.flush_final ─▶ reconciler#2.flush_final
//!             ─▶ encoder.flush
//! Closed    write trailer, release stages in reverse acquisition order
//! ```
//!
//! Decode and encode failures skip one packet's contribution.  Adapter,
//! read and write failures are fatal: streaming stops, but draining and the
//! trailer still run and the first fatal error is returned afterwards.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::audio::{
    AdaptError, DecodedFrame, DenoiseError, Denoiser, FormatAdapter, FrameReconciler, LevelMeter,
    ReconciledChunk,
};
use crate::config::{AppConfig, DenoiseConfig, TargetCodec};
use crate::media::{
    Decoder, Demuxer, EncodedPacket, Encoder, MediaError, Mp3Encoder, Mp3Muxer, Muxer, StreamInfo,
    SymphoniaDecoder, SymphoniaDemuxer, WavEncoder, WavMuxer,
};

use super::state::{PipelineState, TranscodeReport};

/// Packet sizes accepted as the denoise chunk length when none is configured.
const NEGOTIABLE_FRAME_LENS: std::ops::RangeInclusive<u64> = 64..=8192;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that end a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// No audio stream, codec unavailable, output unwritable or header refused.
    #[error("open failed: {0}")]
    Open(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("unsupported channel layout: {input} channel(s) in, {output} channel(s) out")]
    UnsupportedChannelLayout { input: u16, output: u16 },

    /// A decoded frame whose storage disagrees with its declared shape.
    #[error("malformed decoded frame: {0}")]
    MalformedFrame(String),

    #[error("denoise failed: {0}")]
    Denoise(#[from] DenoiseError),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),
}

impl From<AdaptError> for PipelineError {
    fn from(err: AdaptError) -> Self {
        match err {
            AdaptError::UnsupportedSampleFormat(name) => Self::UnsupportedSampleFormat(name),
            AdaptError::UnsupportedChannelLayout { input, output } => {
                Self::UnsupportedChannelLayout { input, output }
            }
            malformed @ AdaptError::Malformed { .. } => Self::MalformedFrame(malformed.to_string()),
        }
    }
}

fn open_error(err: MediaError) -> PipelineError {
    PipelineError::Open(err.to_string())
}

// ---------------------------------------------------------------------------
// AbortHandle
// ---------------------------------------------------------------------------

/// Requests an early stop.  Cheap to clone; checked between packets.
///
/// An aborted run still drains and closes, so the output is a valid,
/// truncated file.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// The four external collaborators, already opened by the caller in
/// acquisition order: demuxer, decoder, muxer, encoder.
pub struct Stages {
    pub demuxer: Box<dyn Demuxer>,
    pub decoder: Box<dyn Decoder>,
    pub muxer: Box<dyn Muxer>,
    pub encoder: Box<dyn Encoder>,
}

/// Denoise chunk length: configured, else the decoder's packet size when it
/// is reasonable, else 20 ms at the input rate.
pub fn negotiate_denoise_len(info: &StreamInfo, config: &DenoiseConfig) -> usize {
    if let Some(len) = config.frame_len {
        return len;
    }
    match info.frames_per_packet {
        Some(len) if NEGOTIABLE_FRAME_LENS.contains(&len) => len as usize,
        _ => (info.sample_rate as usize / 50).max(1),
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One transcode run from an opened input to a finalized output.
///
/// ```rust,no_run
/// use denoise_transcoder::config::AppConfig;
/// use denoise_transcoder::pipeline::Pipeline;
///
/// let pipeline = Pipeline::open_files("in.flac", "out.mp3", &AppConfig::default()).unwrap();
/// let report = pipeline.run().unwrap();
/// println!("{} samples-per-channel written", report.samples_written);
/// ```
pub struct Pipeline {
    // Stage fields are declared in release order.
    denoiser: Denoiser,
    encoder: Box<dyn Encoder>,
    muxer: Box<dyn Muxer>,
    decoder: Box<dyn Decoder>,
    demuxer: Box<dyn Demuxer>,

    stream_index: u32,
    adapter: FormatAdapter,
    to_denoise: FrameReconciler,
    to_encoder: FrameReconciler,

    state: PipelineState,
    abort: AbortHandle,
    /// Set after the first muxer failure; later packets are dropped.
    sink_failed: bool,
    last_pts: Option<u64>,

    report: TranscodeReport,
    input_level: LevelMeter,
    output_level: LevelMeter,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("denoiser", &self.denoiser)
            .field("to_denoise", &self.to_denoise)
            .field("to_encoder", &self.to_encoder)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Open the symphonia input and the MP3 or WAV output described by
    /// `config`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Open`] for any stage that cannot be opened.  Stages
    /// acquired before the failure are released on return, and `output` is
    /// left as it was.
    pub fn open_files(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: &AppConfig,
    ) -> Result<Self, PipelineError> {
        let demuxer = SymphoniaDemuxer::open(input).map_err(open_error)?;
        let decoder = SymphoniaDecoder::open(demuxer.codec_params()).map_err(open_error)?;

        let transcode = &config.transcode;
        let channels = transcode.output_channels;
        let frame_len = transcode.encoder_frame_len;
        let sample_rate = demuxer.stream_info().sample_rate;
        let (muxer, encoder): (Box<dyn Muxer>, Box<dyn Encoder>) = match transcode.target_codec {
            TargetCodec::Mp3 => {
                let muxer = Mp3Muxer::open(output).map_err(open_error)?;
                let encoder =
                    Mp3Encoder::new(frame_len, sample_rate, channels, transcode.mp3_bitrate_kbps)
                        .map_err(open_error)?;
                (Box::new(muxer), Box::new(encoder))
            }
            codec @ (TargetCodec::Pcm16 | TargetCodec::Float32) => {
                let muxer =
                    WavMuxer::open(output, codec, sample_rate, channels).map_err(open_error)?;
                let encoder = WavEncoder::new(codec, frame_len, channels).map_err(open_error)?;
                (Box::new(muxer), Box::new(encoder))
            }
        };

        Self::open(
            Stages {
                demuxer: Box::new(demuxer),
                decoder: Box::new(decoder),
                muxer,
                encoder,
            },
            &config.denoise,
        )
    }

    /// Negotiate frame sizes, create the denoise stage and write the header.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Open`] when the stream has no sample rate, the
    /// negotiated parameters are unusable, or the header cannot be written.
    pub fn open(stages: Stages, denoise: &DenoiseConfig) -> Result<Self, PipelineError> {
        let Stages {
            demuxer,
            decoder,
            mut muxer,
            encoder,
        } = stages;
        let info = demuxer.stream_info().clone();
        log::debug!("pipeline: {}", PipelineState::Opening);

        if info.sample_rate == 0 {
            return Err(PipelineError::Open("input stream has no sample rate".into()));
        }
        let n1 = negotiate_denoise_len(&info, denoise);
        let n2 = encoder.frame_len();
        let channels = encoder.channels();
        if n2 == 0 || channels == 0 {
            return Err(PipelineError::Open(format!(
                "encoder reports frame_len={n2} channels={channels}"
            )));
        }

        let denoiser = Denoiser::new(n1, channels, info.sample_rate, denoise)
            .map_err(|e| PipelineError::Open(e.to_string()))?;
        let to_denoise = FrameReconciler::new("denoise", denoiser.frame_len(), channels);
        let to_encoder = FrameReconciler::new("encoder", n2, channels);
        muxer.write_header().map_err(open_error)?;

        let mode = if denoiser.is_enabled() {
            format!("gain floor {:.3}", denoiser.gain_floor())
        } else {
            "bypass".to_string()
        };
        log::info!(
            "pipeline: {} Hz, {:?} -> {} channel(s), denoise chunk {} ({}), encoder block {}",
            info.sample_rate,
            info.channels,
            channels,
            to_denoise.chunk_len(),
            mode,
            to_encoder.chunk_len()
        );

        let report = TranscodeReport {
            input_codec: info.codec.clone(),
            sample_rate: info.sample_rate,
            output_channels: channels,
            denoise_frame_len: to_denoise.chunk_len(),
            encoder_frame_len: to_encoder.chunk_len(),
            ..TranscodeReport::default()
        };

        Ok(Self {
            denoiser,
            encoder,
            muxer,
            decoder,
            demuxer,
            stream_index: info.stream_index,
            adapter: FormatAdapter::new(channels),
            to_denoise,
            to_encoder,
            state: PipelineState::Opening,
            abort: AbortHandle::new(),
            sink_failed: false,
            last_pts: None,
            report,
            input_level: LevelMeter::new(),
            output_level: LevelMeter::new(),
        })
    }

    /// Use `handle` for cancellation instead of the pipeline's own.
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    /// A clone of the handle that stops this run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stream, drain and close.
    ///
    /// # Errors
    ///
    /// The first fatal error, returned only after draining and closing have
    /// run.  An abort is not an error: the report has `aborted` set.
    pub fn run(mut self) -> Result<TranscodeReport, PipelineError> {
        let mut failure = None;

        self.enter(PipelineState::Streaming);
        if let Err(e) = self.stream() {
            log::error!("pipeline: streaming stopped: {e}");
            failure = Some(e);
        }

        self.enter(PipelineState::Draining);
        if let Err(e) = self.drain() {
            log::error!("pipeline: draining failed: {e}");
            failure.get_or_insert(e);
        }

        self.enter(PipelineState::Closed);
        let (report, closed) = self.close();
        if let Err(e) = closed {
            log::error!("pipeline: closing failed: {e}");
            failure.get_or_insert(e);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    // -----------------------------------------------------------------------
    // States
    // -----------------------------------------------------------------------

    fn enter(&mut self, next: PipelineState) {
        debug_assert_eq!(self.state.next(), Some(next), "illegal transition");
        log::debug!("pipeline: {} -> {}", self.state, next);
        self.state = next;
    }

    fn stream(&mut self) -> Result<(), PipelineError> {
        loop {
            if self.abort.is_aborted() {
                log::warn!("pipeline: abort requested, draining");
                self.report.aborted = true;
                return Ok(());
            }

            let packet = match self.demuxer.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => return Err(PipelineError::Read(e.to_string())),
            };
            if packet.stream_index != self.stream_index {
                self.report.packets_ignored += 1;
                continue;
            }
            self.report.packets_read += 1;

            match self.decoder.decode(&packet) {
                Ok(frames) => {
                    for frame in &frames {
                        self.process_frame(frame)?;
                    }
                }
                Err(e) => {
                    self.report.decode_failures += 1;
                    log::warn!("pipeline: skipping packet at pts {}: {e}", packet.pts);
                }
            }
        }
    }

    fn drain(&mut self) -> Result<(), PipelineError> {
        let mut failure = None;

        match self.decoder.flush() {
            Ok(frames) => {
                for frame in &frames {
                    if let Err(e) = self.process_frame(frame) {
                        failure.get_or_insert(e);
                        break;
                    }
                }
            }
            Err(e) => {
                self.report.decode_failures += 1;
                log::warn!("pipeline: decoder flush failed: {e}");
            }
        }

        if let Some(chunk) = self.to_denoise.flush_final() {
            self.report.denoise_padding = chunk.padding;
            if let Err(e) = self.denoise_chunk(chunk) {
                failure.get_or_insert(e);
            }
        }

        if let Some(chunk) = self.to_encoder.flush_final() {
            if let Err(e) = self.encode_chunk(&chunk) {
                failure.get_or_insert(e);
            }
        }

        match self.encoder.flush() {
            Ok(packets) => {
                for packet in &packets {
                    if let Err(e) = self.write(packet) {
                        failure.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                self.report.encode_failures += 1;
                log::warn!("pipeline: encoder flush failed: {e}");
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(self) -> (TranscodeReport, Result<(), PipelineError>) {
        let Pipeline {
            denoiser,
            encoder,
            mut muxer,
            decoder,
            demuxer,
            state,
            mut report,
            input_level,
            output_level,
            ..
        } = self;

        let trailer = muxer
            .write_trailer()
            .map_err(|e| PipelineError::Write(e.to_string()));

        report.final_state = state;
        report.input_rms_dbfs = input_level.rms_dbfs();
        report.input_peak_dbfs = input_level.peak_dbfs();
        report.output_rms_dbfs = output_level.rms_dbfs();
        report.output_peak_dbfs = output_level.peak_dbfs();
        report.clipped_input_samples = input_level.clipped();

        // Reverse acquisition order.
        denoiser.finish();
        drop(encoder);
        drop(muxer);
        drop(decoder);
        drop(demuxer);

        log::info!(
            "pipeline: {} packets in ({} skipped), {} samples-per-channel out, \
             {} encoded in {} chunks, padding {}+{}{}",
            report.packets_read,
            report.decode_failures,
            report.samples_written,
            report.samples_encoded(),
            report.encoder_chunks,
            report.denoise_padding,
            report.encoder_padding.saturating_sub(report.denoise_padding),
            if report.aborted { " (aborted)" } else { "" }
        );
        if report.clipped_input_samples > 0 {
            log::warn!(
                "pipeline: {:.2}% of input samples at full scale",
                input_level.clipped_pct()
            );
        }
        (report, trailer)
    }

    // -----------------------------------------------------------------------
    // Stage plumbing
    // -----------------------------------------------------------------------

    /// Adapt one decoded frame and push every chunk it completes downstream.
    fn process_frame(&mut self, frame: &DecodedFrame) -> Result<(), PipelineError> {
        let samples = self.adapter.adapt(frame)?;
        let channels = self.adapter.output_channels() as usize;

        self.report.frames_decoded += 1;
        self.report.samples_adapted += (samples.len() / channels) as u64;
        self.input_level.observe(&samples);
        self.to_denoise.push(&samples);

        let mut failure = None;
        while let Some(chunk) = self.to_denoise.try_take_chunk() {
            if let Err(e) = self.denoise_chunk(chunk) {
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn denoise_chunk(&mut self, mut chunk: ReconciledChunk) -> Result<(), PipelineError> {
        self.denoiser.process(&mut chunk)?;
        self.report.denoise_chunks += 1;

        let real = chunk.real_frames() * chunk.channels as usize;
        self.output_level.observe(&chunk.samples[..real]);
        self.to_encoder.push_chunk(&chunk);

        let mut failure = None;
        while let Some(block) = self.to_encoder.try_take_chunk() {
            if let Err(e) = self.encode_chunk(&block) {
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn encode_chunk(&mut self, chunk: &ReconciledChunk) -> Result<(), PipelineError> {
        self.report.encoder_chunks += 1;
        self.report.encoder_padding += chunk.padding;

        let packets = match self.encoder.encode(chunk) {
            Ok(packets) => packets,
            Err(e) => {
                self.report.encode_failures += 1;
                log::warn!("pipeline: skipping encoder block at {}: {e}", chunk.pts);
                return Ok(());
            }
        };

        let mut failure = None;
        for packet in &packets {
            if let Err(e) = self.write(packet) {
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write(&mut self, packet: &EncodedPacket) -> Result<(), PipelineError> {
        if self.sink_failed {
            return Ok(());
        }
        if self.last_pts.is_some_and(|last| packet.pts < last) {
            log::warn!(
                "pipeline: packet pts {} precedes {:?}",
                packet.pts,
                self.last_pts
            );
        }
        if let Err(e) = self.muxer.write_packet(packet) {
            self.sink_failed = true;
            return Err(PipelineError::Write(e.to_string()));
        }
        self.last_pts = Some(packet.pts);
        self.report.packets_written += 1;
        self.report.samples_written += packet.duration;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
