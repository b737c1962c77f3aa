//! Decoded-frame model and conversion to the canonical sample format.
//!
//! Decoders hand the pipeline a [`DecodedFrame`] in whatever representation
//! they produce natively.  [`FormatAdapter`] turns it into canonical samples:
//! **interleaved `i16` at a fixed channel count**.
//!
//! ## Conversion rules
//!
//! | Input        | Rule                                                  |
//! |--------------|-------------------------------------------------------|
//! | `u8`         | re-centre on 0, shift up 8 bits                       |
//! | `i16`        | as-is                                                 |
//! | `i32`        | shift down 16 bits                                    |
//! | `f32`/`f64`  | scale by 32 768, round, **saturate** to `i16` range   |
//!
//! | Channels in → out | Rule                          |
//! |-------------------|-------------------------------|
//! | N → N             | passthrough                   |
//! | 1 → 2             | duplicate (`V` → `V, V`)      |
//! | 2 → 1             | average of both channels      |
//! | anything else     | [`AdaptError::UnsupportedChannelLayout`] |

use thiserror::Error;

// ---------------------------------------------------------------------------
// AdaptError
// ---------------------------------------------------------------------------

/// Structural format mismatches.  All variants are fatal to the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdaptError {
    /// The decoder produced a sample format the adapter cannot convert.
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// No conversion exists between the two channel counts.
    #[error("unsupported channel layout: {input} channel(s) in, {output} channel(s) out")]
    UnsupportedChannelLayout { input: u16, output: u16 },

    /// The frame's sample storage disagrees with its declared shape.
    #[error("malformed frame: expected {expected} values, got {actual}")]
    Malformed { expected: usize, actual: usize },
}

// ---------------------------------------------------------------------------
// DecodedFrame
// ---------------------------------------------------------------------------

/// How channels are arranged inside [`SampleData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// `L R L R …`: one sample frame after another.
    Interleaved,
    /// `L L … R R …`: one contiguous plane per channel.
    Planar,
}

/// Sample storage in the decoder's native format.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    /// Unsigned 8-bit, silence at 128.
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// A format reported by the decoder that has no conversion here.  No
    /// samples are carried.
    Other(String),
}

impl SampleData {
    /// Short format name, e.g. `"s16"`.
    pub fn format_name(&self) -> &str {
        match self {
            SampleData::U8(_) => "u8",
            SampleData::S16(_) => "s16",
            SampleData::S32(_) => "s32",
            SampleData::F32(_) => "f32",
            SampleData::F64(_) => "f64",
            SampleData::Other(name) => name,
        }
    }
}

/// A batch of decoded samples plus its presentation timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub data: SampleData,
    pub layout: SampleLayout,
    /// Channel count as reported by the decoder.
    pub channels: u16,
    /// Samples-per-channel in this frame.
    pub frames: usize,
    /// Timestamp in the input stream's time base.
    pub pts: u64,
}

impl DecodedFrame {
    /// Build an interleaved `i16` frame, the canonical representation.
    pub fn interleaved_s16(samples: Vec<i16>, channels: u16, pts: u64) -> Self {
        let frames = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };
        Self {
            data: SampleData::S16(samples),
            layout: SampleLayout::Interleaved,
            channels,
            frames,
            pts,
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalSample
// ---------------------------------------------------------------------------

/// Conversion of one native sample to the canonical `i16` depth.
trait CanonicalSample: Copy {
    fn to_canonical(self) -> i16;
}

impl CanonicalSample for u8 {
    fn to_canonical(self) -> i16 {
        (self as i16 - 128) << 8
    }
}

impl CanonicalSample for i16 {
    fn to_canonical(self) -> i16 {
        self
    }
}

impl CanonicalSample for i32 {
    fn to_canonical(self) -> i16 {
        (self >> 16) as i16
    }
}

impl CanonicalSample for f32 {
    fn to_canonical(self) -> i16 {
        (self as f64).to_canonical()
    }
}

impl CanonicalSample for f64 {
    fn to_canonical(self) -> i16 {
        if self.is_nan() {
            return 0;
        }
        // Saturate, never wrap.
        (self * 32_768.0)
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

// ---------------------------------------------------------------------------
// FormatAdapter
// ---------------------------------------------------------------------------

/// Converts [`DecodedFrame`]s into interleaved `i16` at `output_channels`.
///
/// ```rust
/// use denoise_transcoder::audio::{DecodedFrame, FormatAdapter};
///
/// let adapter = FormatAdapter::new(2);
/// let mono = DecodedFrame::interleaved_s16(vec![100, -200], 1, 0);
/// assert_eq!(adapter.adapt(&mono).unwrap(), vec![100, 100, -200, -200]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FormatAdapter {
    output_channels: u16,
}

impl FormatAdapter {
    /// Create an adapter producing `output_channels` interleaved channels.
    pub fn new(output_channels: u16) -> Self {
        Self { output_channels }
    }

    /// Canonical channel count.
    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    /// Convert one frame to canonical interleaved samples.
    ///
    /// The result always holds `frame.frames * output_channels` values.
    pub fn adapt(&self, frame: &DecodedFrame) -> Result<Vec<i16>, AdaptError> {
        self.check_channels(frame.channels)?;

        match &frame.data {
            SampleData::S16(data)
                if frame.layout == SampleLayout::Interleaved
                    && frame.channels == self.output_channels =>
            {
                check_len(data.len(), frame)?;
                Ok(data.clone())
            }
            SampleData::U8(data) => self.convert(data, frame),
            SampleData::S16(data) => self.convert(data, frame),
            SampleData::S32(data) => self.convert(data, frame),
            SampleData::F32(data) => self.convert(data, frame),
            SampleData::F64(data) => self.convert(data, frame),
            SampleData::Other(name) => Err(AdaptError::UnsupportedSampleFormat(name.clone())),
        }
    }

    fn check_channels(&self, input: u16) -> Result<(), AdaptError> {
        let ok = match (input, self.output_channels) {
            (0, _) | (_, 0) => false,
            (a, b) if a == b => true,
            (1, 2) | (2, 1) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(AdaptError::UnsupportedChannelLayout {
                input,
                output: self.output_channels,
            })
        }
    }

    fn convert<T: CanonicalSample>(
        &self,
        data: &[T],
        frame: &DecodedFrame,
    ) -> Result<Vec<i16>, AdaptError> {
        check_len(data.len(), frame)?;

        let c_in = frame.channels as usize;
        let c_out = self.output_channels as usize;
        let frames = frame.frames;
        let at = |f: usize, c: usize| -> i16 {
            match frame.layout {
                SampleLayout::Interleaved => data[f * c_in + c],
                SampleLayout::Planar => data[c * frames + f],
            }
            .to_canonical()
        };

        let mut out = Vec::with_capacity(frames * c_out);
        match (c_in, c_out) {
            (1, 2) => {
                for f in 0..frames {
                    let v = at(f, 0);
                    out.push(v);
                    out.push(v);
                }
            }
            (2, 1) => {
                for f in 0..frames {
                    let sum = at(f, 0) as i32 + at(f, 1) as i32;
                    out.push((sum / 2) as i16);
                }
            }
            _ => {
                for f in 0..frames {
                    for c in 0..c_in {
                        out.push(at(f, c));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn check_len(actual: usize, frame: &DecodedFrame) -> Result<(), AdaptError> {
    let expected = frame.frames * frame.channels as usize;
    if actual != expected {
        return Err(AdaptError::Malformed { expected, actual });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
