//! Application entry point: `denoise-transcoder <input> <output>`.
//!
//! # Startup sequence
//!
//! 1. Parse arguments.
//! 2. Load [`AppConfig`] (explicit `--config` or the platform default),
//!    apply command-line overrides and pick the codec from the output
//!    extension unless `--codec` was given.
//! 3. Initialise logging.
//! 4. Open the pipeline, then run it on a blocking task while a
//!    current-thread [`tokio`] runtime waits for Ctrl-C.
//! 5. Print the summary and optionally write the JSON report.
//!
//! Exit status: 0 on success, 1 on any error, 130 when interrupted.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use denoise_transcoder::{
    config::{AppConfig, TargetCodec},
    pipeline::{Pipeline, TranscodeReport},
};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "denoise-transcoder",
    about = "Transcode an audio file to MP3 or WAV with spectral noise suppression",
    version
)]
struct Cli {
    /// Input media file (any container and codec symphonia can read)
    input: PathBuf,

    /// Output file; `.mp3` or `.wav` selects the container
    output: PathBuf,

    /// Settings file to use instead of the platform default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output encoding: mp3, pcm16 or float32
    #[arg(long)]
    codec: Option<TargetCodec>,

    /// MP3 bitrate in kbit/s
    #[arg(long)]
    bitrate: Option<u32>,

    /// Output channel count (1 or 2)
    #[arg(long)]
    channels: Option<u16>,

    /// Maximum noise attenuation in dB, e.g. -15
    #[arg(long, allow_hyphen_values = true)]
    suppression_db: Option<i32>,

    /// Pass audio through without noise suppression
    #[arg(long)]
    no_denoise: bool,

    /// Denoise chunk length in samples per channel
    #[arg(long)]
    frame_len: Option<usize>,

    /// Write the transcode report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Store the effective settings (to --config, else the default location)
    #[arg(long)]
    save_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        config.transcode.target_codec = match self.codec {
            Some(codec) => codec,
            None => TargetCodec::for_output(&self.output, config.transcode.target_codec),
        };
        if let Some(kbps) = self.bitrate {
            config.transcode.mp3_bitrate_kbps = kbps;
        }
        if let Some(channels) = self.channels {
            config.transcode.output_channels = channels;
        }
        if let Some(db) = self.suppression_db {
            config.denoise.suppression_db = db;
        }
        if self.no_denoise {
            config.denoise.enabled = false;
        }
        if let Some(len) = self.frame_len {
            config.denoise.frame_len = Some(len);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Configuration (read before logging so its level applies)
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    cli.apply_overrides(&mut config);

    // 2. Logging
    let default_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    if let Some(e) = load_error {
        log::warn!("Failed to load config ({e}); using defaults");
    }

    // 3. Run
    match run(&cli, config) {
        Ok(report) if report.aborted => {
            print_summary(&cli, &report);
            eprintln!("interrupted: output truncated");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Ok(report) => {
            print_summary(&cli, &report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: AppConfig) -> Result<TranscodeReport> {
    config.validate().context("invalid configuration")?;

    if cli.save_config {
        match &cli.config {
            Some(path) => config.save_to(path),
            None => config.save(),
        }
        .context("cannot save settings")?;
        log::info!("settings saved");
    }

    let codec = config.transcode.target_codec;
    let ext_matches = cli
        .output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(codec.extension()));
    if !ext_matches {
        log::warn!(
            "{} does not end in .{}; writing {:?} anyway",
            cli.output.display(),
            codec.extension(),
            codec
        );
    }

    let pipeline = Pipeline::open_files(&cli.input, &cli.output, &config)
        .with_context(|| format!("cannot open {}", cli.input.display()))?;
    let abort = pipeline.abort_handle();

    // The pipeline blocks; the runtime only exists to wait for Ctrl-C.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let outcome = rt.block_on(async move {
        let mut task = tokio::task::spawn_blocking(move || pipeline.run());
        tokio::select! {
            joined = &mut task => joined,
            Ok(()) = tokio::signal::ctrl_c() => {
                log::warn!("Ctrl-C received; finishing output");
                abort.abort();
                task.await
            }
        }
    });
    let report = outcome
        .context("pipeline task panicked")?
        .context("transcode failed")?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("cannot write report {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }

    Ok(report)
}

fn print_summary(cli: &Cli, report: &TranscodeReport) {
    println!(
        "{} -> {}: {:.2} s, {} Hz, {} channel(s)",
        cli.input.display(),
        cli.output.display(),
        report.output_secs(),
        report.sample_rate,
        report.output_channels
    );
    if report.decode_failures + report.encode_failures > 0 {
        println!(
            "  skipped {} undecodable packet(s), {} unencodable block(s)",
            report.decode_failures, report.encode_failures
        );
    }
    println!(
        "  level {:.1} dBFS in, {:.1} dBFS out",
        report.input_rms_dbfs, report.output_rms_dbfs
    );
}
