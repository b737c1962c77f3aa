//! Input side: container probing and decoding via `symphonia`.
//!
//! [`SymphoniaDemuxer`] probes any container symphonia understands and
//! selects the first audio track.  [`SymphoniaDecoder`] turns that track's
//! packets into planar [`DecodedFrame`]s.  u8, s16, s32, f32 and f64 keep the
//! decoder's native format; the remaining integer formats are widened to s32
//! with symphonia's own sample conversion.
//!
//! # Example
//!
//! ```rust,no_run
//! use denoise_transcoder::media::{Decoder, Demuxer, SymphoniaDecoder, SymphoniaDemuxer};
//!
//! let mut demuxer = SymphoniaDemuxer::open("input.mp3").unwrap();
//! let mut decoder = SymphoniaDecoder::open(demuxer.codec_params()).unwrap();
//! while let Some(packet) = demuxer.read_packet().unwrap() {
//!     for frame in decoder.decode(&packet).unwrap() {
//!         println!("{} frames @ {}", frame.frames, frame.pts);
//!     }
//! }
//! ```

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use super::{CompressedPacket, Decoder, Demuxer, MediaError, StreamInfo};
use crate::audio::{DecodedFrame, SampleData, SampleLayout};

// ---------------------------------------------------------------------------
// SymphoniaDemuxer
// ---------------------------------------------------------------------------

/// Reads packets from any container symphonia can probe.
pub struct SymphoniaDemuxer {
    format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    info: StreamInfo,
}

impl std::fmt::Debug for SymphoniaDemuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaDemuxer")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl SymphoniaDemuxer {
    /// Open `path` and select its first audio track.
    ///
    /// # Errors
    ///
    /// [`MediaError::Open`] when the file cannot be read, the container is
    /// not recognised, or no track has both a known codec and a sample rate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| MediaError::Open(format!("{}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| MediaError::Open(format!("{}: {e}", path.display())))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some()
            })
            .ok_or_else(|| {
                MediaError::Open(format!("{}: no audio stream found", path.display()))
            })?;

        let params = track.codec_params.clone();
        let info = StreamInfo {
            stream_index: track.id,
            codec: codec_name(&params),
            sample_rate: params.sample_rate.unwrap_or_default(),
            channels: params.channels.map(|ch| ch.count() as u16),
            frames_per_packet: params.max_frames_per_packet,
            total_frames: params.n_frames,
        };

        log::info!(
            "input: {} stream #{} codec={} rate={} channels={:?} frames={:?}",
            path.display(),
            info.stream_index,
            info.codec,
            info.sample_rate,
            info.channels,
            info.total_frames
        );

        Ok(Self {
            format,
            codec_params: params,
            info,
        })
    }

    /// Codec parameters of the selected track, for [`SymphoniaDecoder::open`].
    pub fn codec_params(&self) -> &CodecParameters {
        &self.codec_params
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<CompressedPacket>, MediaError> {
        match self.format.next_packet() {
            Ok(packet) => Ok(Some(CompressedPacket {
                stream_index: packet.track_id(),
                pts: packet.ts(),
                duration: packet.dur(),
                data: packet.buf().to_vec(),
            })),
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                Ok(None)
            }
            // Chained streams are not followed: the first one is the input.
            Err(SymphoniaError::ResetRequired) => Ok(None),
            Err(err) => Err(MediaError::Read(err.to_string())),
        }
    }
}

fn codec_name(params: &CodecParameters) -> String {
    symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|desc| desc.short_name.to_string())
        .unwrap_or_else(|| format!("{:?}", params.codec))
}

// ---------------------------------------------------------------------------
// SymphoniaDecoder
// ---------------------------------------------------------------------------

/// Decodes one symphonia track into planar frames.
pub struct SymphoniaDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
}

impl std::fmt::Debug for SymphoniaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaDecoder").finish_non_exhaustive()
    }
}

impl SymphoniaDecoder {
    /// # Errors
    ///
    /// [`MediaError::Open`] when no registered codec supports `params`.
    pub fn open(params: &CodecParameters) -> Result<Self, MediaError> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| MediaError::Open(format!("codec {}: {e}", codec_name(params))))?;
        Ok(Self { decoder })
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&mut self, packet: &CompressedPacket) -> Result<Vec<DecodedFrame>, MediaError> {
        let packet = Packet::new_from_slice(
            packet.stream_index,
            packet.pts,
            packet.duration,
            &packet.data,
        );
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| MediaError::Decode(e.to_string()))?;

        let frames = decoded.frames();
        if frames == 0 {
            return Ok(Vec::new());
        }
        let channels = decoded.spec().channels.count() as u16;

        let data = match &decoded {
            AudioBufferRef::U8(buf) => SampleData::U8(planes(buf)),
            AudioBufferRef::S16(buf) => SampleData::S16(planes(buf)),
            AudioBufferRef::S32(buf) => SampleData::S32(planes(buf)),
            AudioBufferRef::F32(buf) => SampleData::F32(planes(buf)),
            AudioBufferRef::F64(buf) => SampleData::F64(planes(buf)),
            // s8, u16, u24, s24, u32: widen to s32 at full scale.
            AudioBufferRef::S8(_)
            | AudioBufferRef::U16(_)
            | AudioBufferRef::S24(_)
            | AudioBufferRef::U24(_)
            | AudioBufferRef::U32(_) => {
                let mut wide = decoded.make_equivalent::<i32>();
                decoded.convert(&mut wide);
                SampleData::S32(planes(&wide))
            }
        };

        Ok(vec![DecodedFrame {
            data,
            layout: SampleLayout::Planar,
            channels,
            frames,
            pts: packet.ts(),
        }])
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
        let result = self.decoder.finalize();
        if result.verify_ok == Some(false) {
            log::warn!("input: decoder verification failed, output may differ from source");
        }
        Ok(Vec::new())
    }
}

/// Copy every channel plane of `buf` back to back.
fn planes<S: Sample>(buf: &AudioBuffer<S>) -> Vec<S> {
    let channels = buf.spec().channels.count();
    let mut out = Vec::with_capacity(buf.frames() * channels);
    for c in 0..channels {
        out.extend_from_slice(buf.chan(c));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
