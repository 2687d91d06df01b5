//! # vits-model
//!
//! VITS text-to-waveform model (as published by the MMS project) implemented
//! on candle, inference only.
//!
//! # Architecture
//!
//! - Text encoder: token embedding and a post-norm transformer with windowed
//!   relative-position attention, projected to prior means and log-variances
//! - Duration predictor: flow-based (rational-quadratic splines) or
//!   convolutional, giving a frame count per token
//! - Prior flow: residual coupling layers over a WaveNet, run in reverse
//! - Decoder: HiFi-GAN upsampling generator
//!
//! Weight-normalized convolutions are folded at load time.
//!
//! # Example
//!
//! ```ignore
//! use candle_core::Device;
//! use tts_core::{InferenceConfig, SpeechModel, TokenSeq};
//! use vits_model::VitsModel;
//!
//! let model = VitsModel::load(
//!     "mms-tts-nan/config.json",
//!     "mms-tts-nan/model.safetensors",
//!     &Device::Cpu,
//!     &InferenceConfig::default(),
//! )?;
//! let waveform = model.generate(&TokenSeq::new(vec![0, 12, 0, 7, 0]))?;
//! ```

pub mod config;
pub mod duration;
pub mod flow;
pub mod hifigan;
pub mod layers;
pub mod model;
pub mod sampling;
pub mod spline;
pub mod text_encoder;

pub use config::VitsConfig;
pub use model::{InferenceParams, VitsModel};

/// Model configuration file inside a checkpoint.
pub const CONFIG_FILE: &str = "config.json";

/// Preferred weights file inside a checkpoint.
pub const SAFETENSORS_FILE: &str = "model.safetensors";

/// Fallback weights file for checkpoints without safetensors.
pub const PYTORCH_FILE: &str = "pytorch_model.bin";
