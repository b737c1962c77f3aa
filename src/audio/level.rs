//! Running signal-level statistics for canonical `i16` audio.
//!
//! [`LevelMeter`] accumulates peak, RMS and clipping counts over everything
//! fed to it.  The pipeline keeps one meter on the adapted input and one on
//! the denoised output and copies the results into the transcode report.
//!
//! # Example
//!
//! ```rust
//! use denoise_transcoder::audio::LevelMeter;
//!
//! let mut meter = LevelMeter::new();
//! meter.observe(&[16_384, -16_384]);
//! assert!((meter.peak_dbfs() - (-6.02)).abs() < 0.01);
//! ```

/// Magnitude at or above which a sample counts as clipped.
const CLIP_LEVEL: u16 = i16::MAX as u16;

/// dBFS reported for a signal with no energy.
pub const SILENCE_DBFS: f32 = -120.0;

/// Accumulates level statistics over a stream of samples.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    peak: u16,
    sum_squares: f64,
    count: u64,
    clipped: u64,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `samples` (interleaved, any channel count) into the statistics.
    pub fn observe(&mut self, samples: &[i16]) {
        for &s in samples {
            let magnitude = s.unsigned_abs();
            self.peak = self.peak.max(magnitude);
            if magnitude >= CLIP_LEVEL {
                self.clipped += 1;
            }
            let x = s as f64 / 32_768.0;
            self.sum_squares += x * x;
        }
        self.count += samples.len() as u64;
    }

    /// Number of samples at full scale.
    pub fn clipped(&self) -> u64 {
        self.clipped
    }

    /// Percentage of observed samples at full scale.
    pub fn clipped_pct(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.clipped as f32 / self.count as f32 * 100.0
    }

    /// Peak level in dBFS, [`SILENCE_DBFS`] when nothing non-zero was seen.
    pub fn peak_dbfs(&self) -> f32 {
        to_dbfs(self.peak as f64 / 32_768.0)
    }

    /// RMS level in dBFS, [`SILENCE_DBFS`] for silence or no input.
    pub fn rms_dbfs(&self) -> f32 {
        if self.count == 0 {
            return SILENCE_DBFS;
        }
        to_dbfs((self.sum_squares / self.count as f64).sqrt())
    }
}

fn to_dbfs(linear: f64) -> f32 {
    if linear <= 0.0 {
        return SILENCE_DBFS;
    }
    ((20.0 * linear.log10()) as f32).max(SILENCE_DBFS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
