//! tts-bridge command-line interface.
//!
//! Reads one `{"text": ...}` request from stdin and writes one JSON response
//! line to stdout. Diagnostics go to stderr.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use runtime::logging::init_from_config;
use runtime::synthesizer::{prefixed, MSG_MISSING_BACKEND_PREFIX, MSG_PROCESSING_PREFIX};
use runtime::{check_backend, Bridge, HubModelLoader, EXIT_FAILURE};
use tracing::{error, info};
use tts_core::{BridgeConfig, DevicePreference, WavFormat};

/// Text-to-speech bridge: JSON request on stdin, JSON response on stdout
#[derive(Debug, Parser)]
#[command(name = "tts-bridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hub repository id or local checkpoint directory
    #[arg(long, value_name = "ID|DIR")]
    model: Option<String>,

    /// Hub revision (branch, tag or commit)
    #[arg(long)]
    revision: Option<String>,

    /// Compute device
    #[arg(long, value_enum)]
    device: Option<DeviceArg>,

    /// Hub download cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Random seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Sample encoding inside the WAV payload
    #[arg(long, value_enum)]
    wav_format: Option<WavFormatArg>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (json or text)
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceArg {
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl From<DeviceArg> for DevicePreference {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Cpu => DevicePreference::Cpu,
            DeviceArg::Cuda => DevicePreference::Cuda,
            DeviceArg::Metal => DevicePreference::Metal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WavFormatArg {
    Float32,
    Pcm16,
}

impl From<WavFormatArg> for WavFormat {
    fn from(arg: WavFormatArg) -> Self {
        match arg {
            WavFormatArg::Float32 => WavFormat::Float32,
            WavFormatArg::Pcm16 => WavFormat::Pcm16,
        }
    }
}

/// Defaults, then the config file, then `TTS_*` variables, then flags.
fn load_config<F>(cli: &Cli, env: F) -> Result<BridgeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config
        .apply_env_with(env)
        .context("reading TTS_* environment variables")?;

    if let Some(model) = &cli.model {
        config.model.id = model.clone();
    }
    if let Some(revision) = &cli.revision {
        config.model.revision = Some(revision.clone());
    }
    if let Some(device) = cli.device {
        config.model.device = device.into();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.model.cache_dir = Some(cache_dir.clone());
    }
    if let Some(seed) = cli.seed {
        config.inference.seed = Some(seed);
    }
    if let Some(format) = cli.wav_format {
        config.audio.wav_format = format.into();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = match format {
            LogFormatArg::Json => "json".to_string(),
            LogFormatArg::Text => "text".to_string(),
        };
    }
    Ok(config)
}

/// Everything that must hold before stdin is read.
fn startup(cli: &Cli) -> Result<BridgeConfig> {
    let config = load_config(cli, |key| std::env::var(key).ok())?;
    init_from_config(&config.logging)?;

    check_backend(config.model.device)
        .with_context(|| format!("device {}", config.model.device))?;
    Ok(config)
}

/// Print a `{"error": ...}` line on stderr.
fn report_to_stderr(message: String) {
    eprintln!("{}", serde_json::json!({ "error": message }));
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match startup(&cli) {
        Ok(config) => config,
        Err(e) => {
            report_to_stderr(prefixed(MSG_MISSING_BACKEND_PREFIX, format!("{e:#}")));
            return ExitCode::from(EXIT_FAILURE as u8);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model.id,
        device = %config.model.device,
        "Starting tts-bridge"
    );

    let loader = HubModelLoader::new(config.model, config.inference);
    let bridge = Bridge::new(loader, config.audio.wav_format);

    match bridge.run(io::stdin().lock(), io::stdout().lock()) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("failed to write response: {e}");
            report_to_stderr(prefixed(MSG_PROCESSING_PREFIX, e));
            ExitCode::from(EXIT_FAILURE as u8)
        }
    }
}
