//! Spectral noise suppression on fixed-length canonical chunks.
//!
//! [`Denoiser`] processes one [`ReconciledChunk`] at a time, in place, and
//! never changes its length.  Each channel keeps its own adaptive state: a
//! per-bin noise power estimate and the previous gain curve.  That state
//! lives exactly as long as the `Denoiser` value, which the pipeline creates
//! when a stream opens and consumes with [`Denoiser::finish`] when it closes.
//!
//! ## Algorithm
//!
//! For a chunk length `N`, every channel is analysed over a `2N` frame made
//! of the previous chunk followed by the current one:
//!
//! 1. Hann-windowed FFT → power spectrum, smoothed over time.
//! 2. Noise estimate: running mean over the first ~200 ms, then minimum
//!    tracking (fast fall, slow rise).
//! 3. Wiener gain `ξ / (1 + ξ)` with `ξ = max(P/N − 1, 0)`, smoothed over
//!    time and clamped to `[10^(suppression_db / 20), 1]`.
//! 4. The gain is applied to the unwindowed spectrum of the frame; the second
//!    half of the inverse transform replaces the chunk.  No latency is added.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

use super::reconcile::ReconciledChunk;
use crate::config::DenoiseConfig;

/// Seconds of audio used to learn the initial noise floor.
const NOISE_LEARN_SECS: f32 = 0.2;
/// Minimum-tracking fall rate (closer to 1 = slower).
const NOISE_FALL: f32 = 0.85;
/// Per-chunk multiplicative rise of the noise estimate.
const NOISE_RISE: f32 = 1.02;
/// Periodogram time smoothing.
const POWER_SMOOTHING: f32 = 0.6;
/// Gain time smoothing.
const GAIN_SMOOTHING: f32 = 0.5;
const POWER_EPS: f32 = 1e-12;

// ---------------------------------------------------------------------------
// DenoiseError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DenoiseError {
    /// A chunk did not have the configured length.
    #[error("denoise frame length mismatch: expected {expected} samples-per-channel, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    /// The chunk's channel count differs from the one the state was built for.
    #[error("denoise channel mismatch: expected {expected}, got {actual}")]
    Channels { expected: u16, actual: u16 },

    #[error("invalid denoise parameters: {0}")]
    InvalidParams(String),
}

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ChannelState {
    /// Previous chunk's input, scaled to `[-1, 1)`.
    history: Vec<f32>,
    smoothed_power: Vec<f32>,
    noise: Vec<f32>,
    gain: Vec<f32>,
}

impl ChannelState {
    fn new(frame_len: usize) -> Self {
        let bins = 2 * frame_len;
        Self {
            history: vec![0.0; frame_len],
            smoothed_power: vec![0.0; bins],
            noise: vec![0.0; bins],
            gain: vec![1.0; bins],
        }
    }
}

// ---------------------------------------------------------------------------
// Denoiser
// ---------------------------------------------------------------------------

/// Per-stream noise suppressor.
///
/// # Example
///
/// ```rust
/// use denoise_transcoder::audio::{Denoiser, ReconciledChunk};
/// use denoise_transcoder::config::DenoiseConfig;
///
/// let mut denoiser = Denoiser::new(256, 2, 16_000, &DenoiseConfig::default()).unwrap();
/// let mut chunk = ReconciledChunk { samples: vec![0; 512], channels: 2, pts: 0, padding: 0 };
/// denoiser.process(&mut chunk).unwrap();
/// assert_eq!(chunk.samples.len(), 512);
/// ```
pub struct Denoiser {
    frame_len: usize,
    channels: u16,
    enabled: bool,
    gain_floor: f32,
    learn_chunks: u64,
    chunks_processed: u64,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    states: Vec<ChannelState>,
    scratch: Vec<Complex<f32>>,
    windowed: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Denoiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Denoiser")
            .field("frame_len", &self.frame_len)
            .field("channels", &self.channels)
            .field("enabled", &self.enabled)
            .field("gain_floor", &self.gain_floor)
            .field("chunks_processed", &self.chunks_processed)
            .finish_non_exhaustive()
    }
}

impl Denoiser {
    /// Build the suppressor for one stream.
    ///
    /// # Errors
    ///
    /// [`DenoiseError::InvalidParams`] when `frame_len`, `channels` or
    /// `sample_rate` is zero, or `suppression_db` is positive.
    pub fn new(
        frame_len: usize,
        channels: u16,
        sample_rate: u32,
        config: &DenoiseConfig,
    ) -> Result<Self, DenoiseError> {
        if frame_len == 0 || channels == 0 || sample_rate == 0 {
            return Err(DenoiseError::InvalidParams(format!(
                "frame_len={frame_len} channels={channels} sample_rate={sample_rate}"
            )));
        }
        if config.suppression_db > 0 {
            return Err(DenoiseError::InvalidParams(format!(
                "suppression_db must be <= 0, got {}",
                config.suppression_db
            )));
        }

        let fft_len = 2 * frame_len;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let window = (0..fft_len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_len as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();

        let learn_chunks =
            ((NOISE_LEARN_SECS * sample_rate as f32) / frame_len as f32).ceil().max(1.0) as u64;

        log::debug!(
            "denoise: frame_len={frame_len} channels={channels} rate={sample_rate} \
             suppression={}dB enabled={} learn_chunks={learn_chunks}",
            config.suppression_db,
            config.enabled
        );

        Ok(Self {
            frame_len,
            channels,
            enabled: config.enabled,
            gain_floor: 10f32.powf(config.suppression_db as f32 / 20.0),
            learn_chunks,
            chunks_processed: 0,
            forward,
            inverse,
            window,
            states: (0..channels).map(|_| ChannelState::new(frame_len)).collect(),
            scratch: vec![Complex::default(); fft_len],
            windowed: vec![Complex::default(); fft_len],
        })
    }

    /// Configured chunk length in samples-per-channel.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Whether suppression is applied (otherwise chunks pass through).
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Linear gain floor derived from `suppression_db`.
    pub fn gain_floor(&self) -> f32 {
        self.gain_floor
    }

    /// Number of chunks processed so far.
    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed
    }

    /// Suppress noise in `chunk`, in place.
    ///
    /// # Errors
    ///
    /// [`DenoiseError::FrameLength`] / [`DenoiseError::Channels`] when the
    /// chunk does not match the configured shape; the chunk is untouched.
    pub fn process(&mut self, chunk: &mut ReconciledChunk) -> Result<(), DenoiseError> {
        if chunk.channels != self.channels {
            return Err(DenoiseError::Channels {
                expected: self.channels,
                actual: chunk.channels,
            });
        }
        if chunk.frames() != self.frame_len
            || chunk.samples.len() != self.frame_len * self.channels as usize
        {
            return Err(DenoiseError::FrameLength {
                expected: self.frame_len,
                actual: chunk.frames(),
            });
        }

        self.chunks_processed += 1;
        if !self.enabled {
            return Ok(());
        }

        let channels = self.channels as usize;
        for c in 0..channels {
            let input: Vec<f32> = chunk
                .samples
                .iter()
                .skip(c)
                .step_by(channels)
                .map(|&s| s as f32 / 32_768.0)
                .collect();

            let output = self.process_channel(c, &input);

            for (slot, y) in chunk.samples.iter_mut().skip(c).step_by(channels).zip(output) {
                *slot = (y * 32_768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            }
        }
        Ok(())
    }

    fn process_channel(&mut self, channel: usize, input: &[f32]) -> Vec<f32> {
        let n = self.frame_len;
        let fft_len = 2 * n;
        let learning = self.chunks_processed <= self.learn_chunks;
        let learned = (self.chunks_processed - 1) as f32;
        let gain_floor = self.gain_floor;
        let state = &mut self.states[channel];

        // Unwindowed frame for synthesis, windowed copy for analysis.
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let x = if i < n { state.history[i] } else { input[i - n] };
            *slot = Complex::new(x, 0.0);
        }
        for ((w, x), win) in self.windowed.iter_mut().zip(&self.scratch).zip(&self.window) {
            *w = *x * *win;
        }
        self.forward.process(&mut self.windowed);
        self.forward.process(&mut self.scratch);

        for k in 0..fft_len {
            let power = self.windowed[k].norm_sqr();
            let smoothed = &mut state.smoothed_power[k];
            *smoothed = if learning && learned == 0.0 {
                power
            } else {
                POWER_SMOOTHING * *smoothed + (1.0 - POWER_SMOOTHING) * power
            };

            let noise = &mut state.noise[k];
            if learning {
                *noise = (*noise * learned + *smoothed) / (learned + 1.0);
            } else if *smoothed < *noise {
                *noise = NOISE_FALL * *noise + (1.0 - NOISE_FALL) * *smoothed;
            } else {
                *noise = (*noise * NOISE_RISE).max(POWER_EPS).min(*smoothed);
            }

            let posterior = power / noise.max(POWER_EPS);
            let prior = (posterior - 1.0).max(0.0);
            let wiener = prior / (1.0 + prior);
            let gain = (GAIN_SMOOTHING * state.gain[k] + (1.0 - GAIN_SMOOTHING) * wiener)
                .clamp(gain_floor, 1.0);
            state.gain[k] = gain;
            self.scratch[k] *= gain;
        }

        self.inverse.process(&mut self.scratch);
        state.history.copy_from_slice(input);

        let scale = 1.0 / fft_len as f32;
        self.scratch[n..].iter().map(|c| c.re * scale).collect()
    }

    /// Tear down the per-stream state, returning the processed chunk count.
    pub fn finish(self) -> u64 {
        log::debug!(
            "denoise: closing after {} chunks of {}",
            self.chunks_processed,
            self.frame_len
        );
        self.chunks_processed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
