//! Output side: MPEG Layer III encoding via LAME (`mp3lame-encoder`) and a
//! muxer that writes the bare frame stream to disk.
//!
//! LAME keeps its own sample FIFO, so a block may come back as zero bytes
//! and the tail only appears on flush.  Every block with real samples still
//! yields one packet whose `duration` counts those samples, which keeps the
//! pipeline's samples-per-channel accounting exact.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};

use super::{block_real_frames, check_output_path, EncodedPacket, Encoder, MediaError, Muxer};
use crate::audio::ReconciledChunk;

pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Constant bitrates accepted for MP3 output, in kbit/s.
pub const SUPPORTED_BITRATES: [u32; 8] = [64, 96, 128, 160, 192, 224, 256, 320];

fn bitrate(kbps: u32) -> Option<Bitrate> {
    match kbps {
        64 => Some(Bitrate::Kbps64),
        96 => Some(Bitrate::Kbps96),
        128 => Some(Bitrate::Kbps128),
        160 => Some(Bitrate::Kbps160),
        192 => Some(Bitrate::Kbps192),
        224 => Some(Bitrate::Kbps224),
        256 => Some(Bitrate::Kbps256),
        320 => Some(Bitrate::Kbps320),
        _ => None,
    }
}

fn lame_open_error(err: impl std::fmt::Debug) -> MediaError {
    MediaError::Open(format!("lame: {err:?}"))
}

// ---------------------------------------------------------------------------
// Mp3Encoder
// ---------------------------------------------------------------------------

/// Constant-bitrate LAME encoder fed fixed-length canonical blocks.
pub struct Mp3Encoder {
    lame: mp3lame_encoder::Encoder,
    frame_len: usize,
    channels: u16,
    bitrate_kbps: u32,
    frames_in: u64,
    bytes_out: u64,
}

impl std::fmt::Debug for Mp3Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp3Encoder")
            .field("frame_len", &self.frame_len)
            .field("channels", &self.channels)
            .field("bitrate_kbps", &self.bitrate_kbps)
            .field("frames_in", &self.frames_in)
            .finish_non_exhaustive()
    }
}

impl Mp3Encoder {
    /// # Errors
    ///
    /// [`MediaError::Open`] when `frame_len` is zero, `channels` is not 1 or
    /// 2, the bitrate is not in [`SUPPORTED_BITRATES`], or LAME rejects the
    /// parameters.
    pub fn new(
        frame_len: usize,
        sample_rate: u32,
        channels: u16,
        bitrate_kbps: u32,
    ) -> Result<Self, MediaError> {
        if frame_len == 0 {
            return Err(MediaError::Open("encoder frame length must be > 0".into()));
        }
        if !(1..=2).contains(&channels) {
            return Err(MediaError::Open(format!(
                "encoder supports 1 or 2 channels, got {channels}"
            )));
        }
        let brate = bitrate(bitrate_kbps).ok_or_else(|| {
            MediaError::Open(format!(
                "unsupported MP3 bitrate {bitrate_kbps} kbit/s, expected one of {:?}",
                SUPPORTED_BITRATES
            ))
        })?;

        let mut builder =
            Builder::new().ok_or_else(|| MediaError::Open("lame: cannot allocate encoder".into()))?;
        builder.set_num_channels(channels as u8).map_err(lame_open_error)?;
        builder.set_sample_rate(sample_rate).map_err(lame_open_error)?;
        builder.set_brate(brate).map_err(lame_open_error)?;
        builder.set_quality(Quality::Good).map_err(lame_open_error)?;
        let lame = builder.build().map_err(lame_open_error)?;

        log::info!("mp3: {sample_rate} Hz, {channels} channel(s), {bitrate_kbps} kbit/s CBR");
        Ok(Self {
            lame,
            frame_len,
            channels,
            bitrate_kbps,
            frames_in: 0,
            bytes_out: 0,
        })
    }
}

impl Encoder for Mp3Encoder {
    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, chunk: &ReconciledChunk) -> Result<Vec<EncodedPacket>, MediaError> {
        let real = block_real_frames(chunk, self.frame_len, self.channels)?;
        if real == 0 {
            return Ok(Vec::new());
        }
        let samples = &chunk.samples[..real * self.channels as usize];

        let mut data = Vec::new();
        let encoded = match self.channels {
            1 => self.lame.encode_to_vec(MonoPcm(samples), &mut data),
            _ => self.lame.encode_to_vec(InterleavedPcm(samples), &mut data),
        };
        encoded.map_err(|e| MediaError::Encode(format!("lame: {e:?}")))?;

        self.frames_in += real as u64;
        self.bytes_out += data.len() as u64;
        Ok(vec![EncodedPacket {
            pts: chunk.pts,
            duration: real as u64,
            data,
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, MediaError> {
        let mut data = Vec::new();
        self.lame
            .flush_to_vec::<FlushNoGap>(&mut data)
            .map_err(|e| MediaError::Encode(format!("lame flush: {e:?}")))?;
        self.bytes_out += data.len() as u64;
        log::debug!(
            "mp3: encoder flushed, {} samples-per-channel in, {} bytes out",
            self.frames_in,
            self.bytes_out
        );
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![EncodedPacket {
            pts: self.frames_in,
            duration: 0,
            data,
        }])
    }
}

// ---------------------------------------------------------------------------
// Mp3Muxer
// ---------------------------------------------------------------------------

/// Appends encoded MP3 frames to a file with no further framing.
///
/// Like [`WavMuxer`](super::WavMuxer), the file is only created by
/// [`write_header`](Muxer::write_header).
pub struct Mp3Muxer {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    header_written: bool,
    bytes_written: u64,
}

impl std::fmt::Debug for Mp3Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp3Muxer")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl Mp3Muxer {
    /// # Errors
    ///
    /// [`MediaError::Open`] when the parent directory does not exist or
    /// `path` is a directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref().to_path_buf();
        check_output_path(&path)?;
        log::info!("mp3: output {}", path.display());
        Ok(Self {
            path,
            writer: None,
            header_written: false,
            bytes_written: 0,
        })
    }

    fn write_error(&self, err: std::io::Error) -> MediaError {
        MediaError::Write(format!("{}: {err}", self.path.display()))
    }
}

impl Muxer for Mp3Muxer {
    fn write_header(&mut self) -> Result<(), MediaError> {
        if self.header_written {
            return Err(MediaError::Write("header already written".into()));
        }
        self.header_written = true;
        let file = File::create(&self.path)
            .map_err(|e| MediaError::Open(format!("{}: {e}", self.path.display())))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<(), MediaError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(MediaError::Write("packet written before header".into()));
        };
        if let Err(e) = writer.write_all(&packet.data) {
            return Err(self.write_error(e));
        }
        self.bytes_written += packet.data.len() as u64;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), MediaError> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| MediaError::Write("trailer without header".into()))?;
        writer.flush().map_err(|e| self.write_error(e))?;
        log::debug!(
            "mp3: finalized {} ({} bytes)",
            self.path.display(),
            self.bytes_written
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Decoder, Demuxer, SymphoniaDecoder, SymphoniaDemuxer};
    use tempfile::tempdir;

    const RATE: u32 = 44_100;

    fn chunk(samples: Vec<i16>, channels: u16, pts: u64, padding: usize) -> ReconciledChunk {
        ReconciledChunk {
            samples,
            channels,
            pts,
            padding,
        }
    }

    /// Interleaved stereo 440 Hz tone, left and right in opposite phase.
    fn tone(frames: usize) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let s = ((i as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin()
                    * 12_000.0) as i16;
                [s, -s]
            })
            .collect()
    }

    /// Encode `samples` in 1152-frame blocks, padding the last one.
    fn encode_file(path: &Path, samples: &[i16], channels: u16) -> u64 {
        let frame_len = 1152;
        let mut enc = Mp3Encoder::new(frame_len, RATE, channels, 192).unwrap();
        let mut mux = Mp3Muxer::open(path).unwrap();
        mux.write_header().unwrap();

        let mut written = 0;
        let block = frame_len * channels as usize;
        for (i, part) in samples.chunks(block).enumerate() {
            let padding = (block - part.len()) / channels as usize;
            let mut padded = part.to_vec();
            padded.resize(block, 0);
            let pts = (i * frame_len) as u64;
            for p in enc.encode(&chunk(padded, channels, pts, padding)).unwrap() {
                written += p.duration;
                mux.write_packet(&p).unwrap();
            }
        }
        for p in enc.flush().unwrap() {
            written += p.duration;
            mux.write_packet(&p).unwrap();
        }
        mux.write_trailer().unwrap();
        written
    }

    #[test]
    fn encoder_rejects_invalid_configuration() {
        assert!(Mp3Encoder::new(0, RATE, 2, 192).is_err());
        assert!(Mp3Encoder::new(1152, RATE, 3, 192).is_err());
        assert!(matches!(
            Mp3Encoder::new(1152, RATE, 2, 200),
            Err(MediaError::Open(_))
        ));
    }

    #[test]
    fn every_supported_bitrate_maps_to_lame() {
        for kbps in SUPPORTED_BITRATES {
            assert!(bitrate(kbps).is_some(), "{kbps}");
        }
        assert!(bitrate(DEFAULT_BITRATE_KBPS).is_some());
        assert!(bitrate(100).is_none());
    }

    #[test]
    fn blocks_carry_real_sample_counts() {
        let mut enc = Mp3Encoder::new(1152, RATE, 2, 128).unwrap();

        let full = enc.encode(&chunk(tone(1152), 2, 0, 0)).unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].pts, 0);
        assert_eq!(full[0].duration, 1152);

        let mut tail = tone(100);
        tail.resize(1152 * 2, 0);
        let last = enc.encode(&chunk(tail, 2, 1152, 1052)).unwrap();
        assert_eq!(last[0].duration, 100);

        assert!(enc.encode(&chunk(vec![0; 1152 * 2], 2, 2304, 1152)).unwrap().is_empty());

        let flushed = enc.flush().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].pts, 1252);
        assert_eq!(flushed[0].duration, 0);
        assert!(!flushed[0].data.is_empty());
    }

    #[test]
    fn encoder_rejects_wrong_block_shape() {
        let mut enc = Mp3Encoder::new(1152, RATE, 1, 128).unwrap();
        let err = enc.encode(&chunk(vec![0; 1152 * 2], 2, 0, 0)).unwrap_err();
        assert!(matches!(err, MediaError::Encode(_)), "{err}");
    }

    #[test]
    fn stereo_file_decodes_back_through_symphonia() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.mp3");
        let frames = RATE as usize;
        let written = encode_file(&path, &tone(frames), 2);
        assert_eq!(written, frames as u64);

        // 192 kbit/s for one second, far below the 176 kB of 16-bit PCM.
        let size = std::fs::metadata(&path).unwrap().len();
        assert!((10_000..60_000).contains(&size), "{size} bytes");

        let mut demuxer = SymphoniaDemuxer::open(&path).expect("reopen");
        let info = demuxer.stream_info().clone();
        assert_eq!(info.codec, "mp3");
        assert_eq!(info.sample_rate, RATE);

        let mut decoder = SymphoniaDecoder::open(demuxer.codec_params()).expect("decoder");
        let mut decoded = 0;
        let mut channels = 0;
        while let Some(packet) = demuxer.read_packet().expect("read") {
            for frame in decoder.decode(&packet).expect("decode") {
                decoded += frame.frames;
                channels = frame.channels;
            }
        }
        for frame in decoder.flush().expect("flush") {
            decoded += frame.frames;
        }
        assert_eq!(channels, 2);
        // Encoder delay and the final frame's padding only ever add samples.
        assert!(decoded >= frames, "{decoded} < {frames}");
        assert!(decoded <= frames + 4 * 1152, "{decoded}");
    }

    #[test]
    fn mono_stream_is_written() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("mono.mp3");
        let mono: Vec<i16> = tone(4_000).into_iter().step_by(2).collect();
        assert_eq!(encode_file(&path, &mono, 1), 4_000);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn file_is_created_by_the_header() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.mp3");
        std::fs::write(&path, b"previous take").unwrap();

        let mut mux = Mp3Muxer::open(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"previous take");
        let packet = EncodedPacket {
            pts: 0,
            duration: 0,
            data: vec![0xff, 0xfb],
        };
        assert!(matches!(mux.write_packet(&packet), Err(MediaError::Write(_))));

        mux.write_header().unwrap();
        mux.write_packet(&packet).unwrap();
        mux.write_trailer().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0xfb]);
    }

    #[test]
    fn missing_directory_is_open_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("no-such-dir").join("out.mp3");
        assert!(matches!(Mp3Muxer::open(&path), Err(MediaError::Open(_))));
    }
}
