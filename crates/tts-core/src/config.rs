//! Configuration structures for the bridge.
//!
//! Values are layered: defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by the binary).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{TtsError, TtsResult};

/// Hub repository loaded when nothing else is configured.
pub const DEFAULT_MODEL_ID: &str = "facebook/mms-tts-nan";

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Which model to load and where to run it.
    pub model: ModelConfig,
    /// Overrides for the model's sampling parameters.
    pub inference: InferenceConfig,
    /// Output audio settings.
    pub audio: AudioConfig,
    /// Diagnostic logging settings.
    pub logging: LoggingConfig,
}

/// Model source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub repository id, or a local directory holding the same files.
    pub id: String,
    /// Hub revision (branch, tag or commit).
    pub revision: Option<String>,
    /// Download cache directory; the hub client default when unset.
    pub cache_dir: Option<PathBuf>,
    /// Compute device preference.
    pub device: DevicePreference,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            revision: None,
            cache_dir: None,
            device: DevicePreference::Auto,
        }
    }
}

/// Device preference for model loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Best available accelerator, falling back to CPU.
    #[default]
    Auto,
    /// Force CPU usage.
    Cpu,
    /// Force CUDA GPU (NVIDIA).
    Cuda,
    /// Force Metal GPU (Apple Silicon).
    Metal,
}

impl FromStr for DevicePreference {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" | "nvidia" => Ok(Self::Cuda),
            "metal" | "mps" | "apple" => Ok(Self::Metal),
            other => Err(TtsError::config(format!("unknown device: {other}"))),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
        }
    }
}

/// Sampling overrides. `None` keeps the checkpoint's own value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Scale of the prior noise.
    pub noise_scale: Option<f32>,
    /// Scale of the duration predictor noise.
    pub noise_scale_duration: Option<f32>,
    /// Speaking rate; durations are divided by it.
    pub speaking_rate: Option<f32>,
    /// Seed for reproducible noise.
    pub seed: Option<u64>,
}

/// Output audio configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample encoding inside the WAV container.
    pub wav_format: WavFormat,
}

/// Sample encoding inside the WAV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WavFormat {
    /// 32-bit IEEE float samples.
    #[default]
    Float32,
    /// 16-bit signed integer samples.
    Pcm16,
}

impl FromStr for WavFormat {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "float32" | "f32" | "float" => Ok(Self::Float32),
            "pcm16" | "i16" | "int16" => Ok(Self::Pcm16),
            other => Err(TtsError::config(format!("unknown wav format: {other}"))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json or text).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> TtsResult<Self> {
        toml::from_str(text).map_err(|e| TtsError::config(format!("invalid config: {e}")))
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> TtsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TtsError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `TTS_*` variables from `lookup` on top of the current values.
    ///
    /// The binary passes `std::env::var`; tests pass a fixed map.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> TtsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("TTS_MODEL").filter(|v| !v.is_empty()) {
            self.model.id = id;
        }
        if let Some(rev) = lookup("TTS_MODEL_REVISION").filter(|v| !v.is_empty()) {
            self.model.revision = Some(rev);
        }
        if let Some(dir) = lookup("TTS_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.model.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(device) = lookup("TTS_DEVICE") {
            self.model.device = device.parse()?;
        }
        if let Some(format) = lookup("TTS_WAV_FORMAT") {
            self.audio.wav_format = format.parse()?;
        }
        if let Some(seed) = lookup("TTS_SEED") {
            let seed = seed
                .trim()
                .parse::<u64>()
                .map_err(|e| TtsError::config(format!("invalid TTS_SEED {seed:?}: {e}")))?;
            self.inference.seed = Some(seed);
        }
        Ok(())
    }
}
