//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every section is `#[serde(default)]`, so a `settings.toml` only needs the
//! keys it changes.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// TargetCodec
// ---------------------------------------------------------------------------

/// Output encoding.  The container follows from the codec.
///
/// | Variant   | Output                           |
/// |-----------|----------------------------------|
/// | `Mp3`     | MPEG Layer III elementary stream |
/// | `Pcm16`   | WAV, 16-bit signed integer       |
/// | `Float32` | WAV, 32-bit IEEE float           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCodec {
    Mp3,
    Pcm16,
    Float32,
}

impl Default for TargetCodec {
    fn default() -> Self {
        Self::Mp3
    }
}

impl TargetCodec {
    /// File extension the output is expected to carry.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Pcm16 | Self::Float32 => "wav",
        }
    }

    /// `configured` unless the output extension names the other container:
    /// `.mp3` selects MP3, `.wav` selects 16-bit PCM when MP3 was configured.
    pub fn for_output(path: &Path, configured: Self) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match (ext.as_deref(), configured) {
            (Some("mp3"), _) => Self::Mp3,
            (Some("wav"), Self::Mp3) => Self::Pcm16,
            _ => configured,
        }
    }
}

impl FromStr for TargetCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "pcm16" | "s16" => Ok(Self::Pcm16),
            "float32" | "f32" => Ok(Self::Float32),
            other => Err(format!("unknown codec {other:?} (expected mp3, pcm16 or float32)")),
        }
    }
}

// ---------------------------------------------------------------------------
// TranscodeConfig
// ---------------------------------------------------------------------------

/// Output format settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub target_codec: TargetCodec,
    /// Encoder block length in samples-per-channel.
    pub encoder_frame_len: usize,
    /// Output channel count: 1 (mono) or 2 (stereo).
    pub output_channels: u16,
    /// Constant bitrate of MP3 output in kbit/s.
    pub mp3_bitrate_kbps: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            target_codec: TargetCodec::default(),
            encoder_frame_len: crate::media::wav::DEFAULT_FRAME_LEN,
            output_channels: 2,
            mp3_bitrate_kbps: crate::media::mp3::DEFAULT_BITRATE_KBPS,
        }
    }
}

// ---------------------------------------------------------------------------
// DenoiseConfig
// ---------------------------------------------------------------------------

/// Noise suppression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// When `false`, chunks pass through the denoise stage untouched.
    pub enabled: bool,
    /// Maximum attenuation of the noise floor in dB (must be ≤ 0).
    pub suppression_db: i32,
    /// Chunk length in samples-per-channel.  `None` negotiates it from the
    /// decoder's packet size or 20 ms at the input rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_len: Option<usize>,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suppression_db: -10,
            frame_len: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use denoise_transcoder::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transcode: TranscodeConfig,
    pub denoise: DenoiseConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.transcode.encoder_frame_len == 0 {
            bail!("transcode.encoder_frame_len must be > 0");
        }
        if !(1..=2).contains(&self.transcode.output_channels) {
            bail!(
                "transcode.output_channels must be 1 or 2, got {}",
                self.transcode.output_channels
            );
        }
        if !crate::media::mp3::SUPPORTED_BITRATES.contains(&self.transcode.mp3_bitrate_kbps) {
            bail!(
                "transcode.mp3_bitrate_kbps must be one of {:?}, got {}",
                crate::media::mp3::SUPPORTED_BITRATES,
                self.transcode.mp3_bitrate_kbps
            );
        }
        if self.denoise.suppression_db > 0 {
            bail!(
                "denoise.suppression_db must be <= 0, got {}",
                self.denoise.suppression_db
            );
        }
        if self.denoise.frame_len == Some(0) {
            bail!("denoise.frame_len must be > 0");
        }
        if log::LevelFilter::from_str(&self.logging.level).is_err() {
            bail!("logging.level {:?} is not a log level", self.logging.level);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
