//! Output side: PCM encoding and RIFF/WAV muxing via `hound`.
//!
//! [`WavEncoder`] packs fixed-length canonical chunks into little-endian
//! payloads of the target sample format.  [`WavMuxer`] writes those payloads
//! into a WAV file.  Padding reported by a chunk is trimmed here, so the
//! output holds exactly the source's samples-per-channel.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::{block_real_frames, check_output_path, EncodedPacket, Encoder, MediaError, Muxer};
use crate::audio::ReconciledChunk;
use crate::config::TargetCodec;

/// Block length used when none is configured: one MPEG-1 Layer III frame.
pub const DEFAULT_FRAME_LEN: usize = 1152;

/// WAV sample layout for `codec`.
///
/// # Errors
///
/// [`MediaError::Open`] for a codec WAV cannot carry.
fn wav_spec(
    codec: TargetCodec,
    sample_rate: u32,
    channels: u16,
) -> Result<hound::WavSpec, MediaError> {
    let (bits_per_sample, sample_format) = match codec {
        TargetCodec::Pcm16 => (16, hound::SampleFormat::Int),
        TargetCodec::Float32 => (32, hound::SampleFormat::Float),
        TargetCodec::Mp3 => {
            return Err(MediaError::Open(format!("{codec:?} cannot be stored in WAV")));
        }
    };
    Ok(hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    })
}

// ---------------------------------------------------------------------------
// WavEncoder
// ---------------------------------------------------------------------------

/// Fixed-block PCM encoder.
#[derive(Debug, Clone)]
pub struct WavEncoder {
    frame_len: usize,
    channels: u16,
    sample_format: hound::SampleFormat,
    packets: u64,
}

impl WavEncoder {
    /// # Errors
    ///
    /// [`MediaError::Open`] when `frame_len` is zero, `channels` is not
    /// 1 or 2, or `codec` is not a PCM codec.
    pub fn new(codec: TargetCodec, frame_len: usize, channels: u16) -> Result<Self, MediaError> {
        if frame_len == 0 {
            return Err(MediaError::Open("encoder frame length must be > 0".into()));
        }
        if !(1..=2).contains(&channels) {
            return Err(MediaError::Open(format!(
                "encoder supports 1 or 2 channels, got {channels}"
            )));
        }
        let spec = wav_spec(codec, 0, channels)?;
        Ok(Self {
            frame_len,
            channels,
            sample_format: spec.sample_format,
            packets: 0,
        })
    }
}

impl Encoder for WavEncoder {
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

        let data = match self.sample_format {
            hound::SampleFormat::Int => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            hound::SampleFormat::Float => samples
                .iter()
                .flat_map(|&s| (s as f32 / 32_768.0).to_le_bytes())
                .collect(),
        };

        self.packets += 1;
        Ok(vec![EncodedPacket {
            pts: chunk.pts,
            duration: real as u64,
            data,
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, MediaError> {
        log::debug!("wav: encoder flushed after {} packets", self.packets);
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// WavMuxer
// ---------------------------------------------------------------------------

/// Writes PCM packets into a RIFF/WAV file.
///
/// [`open`](Self::open) only validates the destination.  The file is
/// created, and any existing one replaced, by
/// [`write_header`](Muxer::write_header); the chunk sizes are fixed up by
/// [`write_trailer`](Muxer::write_trailer).
pub struct WavMuxer {
    path: PathBuf,
    spec: hound::WavSpec,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    header_written: bool,
    samples_written: u64,
}

impl std::fmt::Debug for WavMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavMuxer")
            .field("path", &self.path)
            .field("spec", &self.spec)
            .field("samples_written", &self.samples_written)
            .finish_non_exhaustive()
    }
}

impl WavMuxer {
    /// Prepare to write `path`.  Nothing on disk changes until the header.
    ///
    /// # Errors
    ///
    /// [`MediaError::Open`] when the parent directory does not exist, `path`
    /// is a directory, or `codec` cannot be stored in WAV.
    pub fn open(
        path: impl AsRef<Path>,
        codec: TargetCodec,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, MediaError> {
        let path = path.as_ref().to_path_buf();
        check_output_path(&path)?;
        let spec = wav_spec(codec, sample_rate, channels)?;
        log::info!(
            "wav: output {} ({:?}, {} Hz, {} channel(s))",
            path.display(),
            codec,
            sample_rate,
            channels
        );
        Ok(Self {
            path,
            spec,
            writer: None,
            header_written: false,
            samples_written: 0,
        })
    }

    fn write_samples(&mut self, data: &[u8]) -> Result<(), hound::Error> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(hound::Error::Unsupported);
        };
        match self.spec.sample_format {
            hound::SampleFormat::Int => {
                for bytes in data.chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
                    self.samples_written += 1;
                }
            }
            hound::SampleFormat::Float => {
                for bytes in data.chunks_exact(4) {
                    let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    writer.write_sample(value)?;
                    self.samples_written += 1;
                }
            }
        }
        Ok(())
    }
}

impl Muxer for WavMuxer {
    fn write_header(&mut self) -> Result<(), MediaError> {
        if self.header_written {
            return Err(MediaError::Write("header already written".into()));
        }
        self.header_written = true;
        let file = File::create(&self.path)
            .map_err(|e| MediaError::Open(format!("{}: {e}", self.path.display())))?;
        let writer = hound::WavWriter::new(BufWriter::new(file), self.spec)
            .map_err(|e| MediaError::Write(format!("{}: {e}", self.path.display())))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<(), MediaError> {
        if self.writer.is_none() {
            return Err(MediaError::Write("packet written before header".into()));
        }
        let width = self.spec.bits_per_sample as usize / 8;
        if packet.data.len() % (width * self.spec.channels as usize) != 0 {
            return Err(MediaError::Write(format!(
                "payload of {} bytes is not a whole number of sample frames",
                packet.data.len()
            )));
        }
        self.write_samples(&packet.data)
            .map_err(|e| MediaError::Write(format!("{}: {e}", self.path.display())))
    }

    fn write_trailer(&mut self) -> Result<(), MediaError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| MediaError::Write("trailer without header".into()))?;
        writer
            .finalize()
            .map_err(|e| MediaError::Write(format!("{}: {e}", self.path.display())))?;
        log::debug!(
            "wav: finalized {} ({} samples-per-channel)",
            self.path.display(),
            self.samples_written / self.spec.channels.max(1) as u64
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
    use tempfile::tempdir;

    fn chunk(samples: Vec<i16>, channels: u16, pts: u64, padding: usize) -> ReconciledChunk {
        ReconciledChunk {
            samples,
            channels,
            pts,
            padding,
        }
    }

    // ---- WavEncoder --------------------------------------------------------

    #[test]
    fn encoder_rejects_invalid_configuration() {
        assert!(WavEncoder::new(TargetCodec::Pcm16, 0, 2).is_err());
        assert!(WavEncoder::new(TargetCodec::Pcm16, 1152, 3).is_err());
        assert!(WavEncoder::new(TargetCodec::Pcm16, 1152, 0).is_err());
    }

    #[test]
    fn encoder_rejects_wrong_block_length() {
        let mut enc = WavEncoder::new(TargetCodec::Pcm16, 4, 1).unwrap();
        let err = enc.encode(&chunk(vec![0; 3], 1, 0, 0)).unwrap_err();
        assert!(matches!(err, MediaError::Encode(_)), "{err}");
    }

    #[test]
    fn encoder_packs_pcm16_little_endian() {
        let mut enc = WavEncoder::new(TargetCodec::Pcm16, 2, 2).unwrap();
        let packets = enc.encode(&chunk(vec![1, -1, 256, 0], 2, 8, 0)).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pts, 8);
        assert_eq!(packets[0].duration, 2);
        assert_eq!(packets[0].data, vec![1, 0, 0xff, 0xff, 0, 1, 0, 0]);
    }

    #[test]
    fn encoder_trims_padding() {
        let mut enc = WavEncoder::new(TargetCodec::Pcm16, 4, 1).unwrap();
        let packets = enc.encode(&chunk(vec![5, 6, 0, 0], 1, 4, 2)).unwrap();
        assert_eq!(packets[0].duration, 2);
        assert_eq!(packets[0].data.len(), 4);
    }

    #[test]
    fn all_padding_chunk_produces_no_packet() {
        let mut enc = WavEncoder::new(TargetCodec::Pcm16, 4, 1).unwrap();
        assert!(enc.encode(&chunk(vec![0; 4], 1, 0, 4)).unwrap().is_empty());
        assert!(enc.flush().unwrap().is_empty());
    }

    #[test]
    fn encoder_scales_float32() {
        let mut enc = WavEncoder::new(TargetCodec::Float32, 1, 1).unwrap();
        let packets = enc.encode(&chunk(vec![-16_384], 1, 0, 0)).unwrap();
        assert_eq!(packets[0].data, (-0.5f32).to_le_bytes().to_vec());
    }

    // ---- WavMuxer ----------------------------------------------------------

    #[test]
    fn muxer_writes_readable_wav() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");

        let mut enc = WavEncoder::new(TargetCodec::Pcm16, 4, 2).unwrap();
        let mut mux = WavMuxer::open(&path, TargetCodec::Pcm16, 22_050, 2).unwrap();
        mux.write_header().unwrap();
        for p in enc.encode(&chunk(vec![1, 2, 3, 4, 5, 6, 7, 8], 2, 0, 0)).unwrap() {
            mux.write_packet(&p).unwrap();
        }
        for p in enc.encode(&chunk(vec![9, 10, 0, 0, 0, 0, 0, 0], 2, 4, 3)).unwrap() {
            mux.write_packet(&p).unwrap();
        }
        mux.write_trailer().unwrap();

        let mut reader = hound::WavReader::open(&path).expect("reopen");
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 5);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn muxer_writes_float_wav() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");

        let mut enc = WavEncoder::new(TargetCodec::Float32, 2, 1).unwrap();
        let mut mux = WavMuxer::open(&path, TargetCodec::Float32, 8_000, 1).unwrap();
        mux.write_header().unwrap();
        for p in enc.encode(&chunk(vec![16_384, -32_768], 1, 0, 0)).unwrap() {
            mux.write_packet(&p).unwrap();
        }
        mux.write_trailer().unwrap();

        let mut reader = hound::WavReader::open(&path).expect("reopen");
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.5, -1.0]);
    }

    #[test]
    fn unwritable_path_is_open_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("no-such-dir").join("out.wav");
        let err = WavMuxer::open(&path, TargetCodec::Pcm16, 8_000, 2).unwrap_err();
        assert!(matches!(err, MediaError::Open(_)), "{err}");
    }

    #[test]
    fn packet_before_header_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        let mut mux = WavMuxer::open(&path, TargetCodec::Pcm16, 8_000, 1).unwrap();
        let packet = EncodedPacket {
            pts: 0,
            duration: 1,
            data: vec![0, 0],
        };
        assert!(matches!(mux.write_packet(&packet), Err(MediaError::Write(_))));
        assert!(mux.write_trailer().is_err());
    }

    #[test]
    fn partial_sample_frame_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        let mut mux = WavMuxer::open(&path, TargetCodec::Pcm16, 8_000, 2).unwrap();
        mux.write_header().unwrap();
        let packet = EncodedPacket {
            pts: 0,
            duration: 1,
            data: vec![0, 0],
        };
        assert!(mux.write_packet(&packet).is_err());
        mux.write_trailer().unwrap();

        let reader = hound::WavReader::open(&path).expect("reopen");
        assert_eq!(reader.duration(), 0);
    }

    #[test]
    fn existing_file_is_untouched_until_the_header() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        std::fs::write(&path, b"previous take").unwrap();

        let untouched = WavMuxer::open(&path, TargetCodec::Pcm16, 8_000, 1).unwrap();
        drop(untouched);
        assert_eq!(std::fs::read(&path).unwrap(), b"previous take");

        let fresh = dir.path().join("fresh.wav");
        let mut mux = WavMuxer::open(&fresh, TargetCodec::Pcm16, 8_000, 1).unwrap();
        assert!(!fresh.exists());
        mux.write_header().unwrap();
        assert!(fresh.exists());
        assert!(matches!(mux.write_header(), Err(MediaError::Write(_))));
        mux.write_trailer().unwrap();
    }

    #[test]
    fn mp3_is_not_a_wav_codec() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        assert!(matches!(
            WavMuxer::open(&path, TargetCodec::Mp3, 8_000, 1),
            Err(MediaError::Open(_))
        ));
        assert!(matches!(
            WavEncoder::new(TargetCodec::Mp3, 1152, 1),
            Err(MediaError::Open(_))
        ));
    }

    #[test]
    fn directory_as_output_is_open_error() {
        let dir = tempdir().expect("temp dir");
        let err = WavMuxer::open(dir.path(), TargetCodec::Pcm16, 8_000, 2).unwrap_err();
        assert!(matches!(err, MediaError::Open(_)), "{err}");
    }
}
