//! # runtime
//!
//! Runtime orchestration for the tts-bridge engine.
//!
//! This crate provides:
//! - Device management (CPU/GPU selection, compute class)
//! - Checkpoint resolution (local directory or Hugging Face Hub)
//! - The load-once model slot
//! - The synthesizer (tokenize, infer, encode)
//! - The stdin/stdout command driver
//! - Structured logging to stderr

pub mod bridge;
pub mod device;
pub mod hub;
pub mod loader;
pub mod logging;
pub mod synthesizer;

pub use bridge::{exit_code, Bridge, DriverState, EXIT_FAILURE, EXIT_SUCCESS};
pub use device::{check_backend, select_device};
pub use hub::{resolve_model_files, ModelFiles};
pub use loader::{HubModelLoader, ModelSlot};
pub use logging::{init_from_config, init_logging, LogFormat};
pub use synthesizer::Synthesizer;
