//! # tts-core
//!
//! Core types, traits, and error definitions for the TTS bridge.
//!
//! This crate provides the foundational abstractions used across all other crates
//! in the workspace, including:
//!
//! - Request/response types (`SynthesisRequest`, `SynthesisResponse`)
//! - Pipeline data (`TokenSeq`, `Waveform`)
//! - Trait definitions for the tokenizer, model and loader seams
//! - Unified error handling via `TtsError`
//! - Configuration structures

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{BridgeConfig, DevicePreference, InferenceConfig, ModelConfig, WavFormat};
pub use error::{TtsError, TtsResult};
pub use traits::{ComputeClass, LoadedModel, ModelLoader, SpeechModel, TextTokenizer};
pub use types::{SynthesisRequest, SynthesisResponse, TokenSeq, Waveform};
