//! Trait definitions at the seams of the synthesis pipeline.

use crate::error::TtsResult;
use crate::types::{TokenSeq, Waveform};

/// Text tokenization trait.
///
/// Implementations convert raw request text into the id sequence the
/// speech model was trained on.
pub trait TextTokenizer {
    /// Encode text into tokens.
    fn encode(&self, text: &str) -> TtsResult<TokenSeq>;

    /// Get the vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Get the PAD (blank) token ID.
    fn pad_token_id(&self) -> Option<u32>;
}

/// A pretrained speech model run in inference mode.
pub trait SpeechModel {
    /// Generate a waveform for the given tokens.
    ///
    /// The returned samples are already copied back to host memory.
    fn generate(&self, tokens: &TokenSeq) -> TtsResult<Waveform>;

    /// Sampling rate fixed by the model configuration.
    fn sampling_rate(&self) -> u32;
}

/// Compute class a model ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeClass {
    /// A GPU or other accelerator.
    Accelerated,
    /// Plain CPU computation.
    General,
}

impl std::fmt::Display for ComputeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeClass::Accelerated => write!(f, "accelerated"),
            ComputeClass::General => write!(f, "general"),
        }
    }
}

/// Everything a synthesis call needs, produced once by a [`ModelLoader`].
pub struct LoadedModel {
    /// Tokenizer matching the model vocabulary.
    pub tokenizer: Box<dyn TextTokenizer>,
    /// The speech model.
    pub model: Box<dyn SpeechModel>,
    /// Where the model runs.
    pub compute: ComputeClass,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("vocab_size", &self.tokenizer.vocab_size())
            .field("sampling_rate", &self.model.sampling_rate())
            .field("compute", &self.compute)
            .finish()
    }
}

/// Loads a tokenizer and model pair.
pub trait ModelLoader {
    /// Human-readable identifier of what gets loaded (repo id or path).
    fn model_id(&self) -> &str;

    /// Fetch and initialize the model. Called at most once per slot.
    fn load(&self) -> TtsResult<LoadedModel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_class_display() {
        assert_eq!(ComputeClass::Accelerated.to_string(), "accelerated");
        assert_eq!(ComputeClass::General.to_string(), "general");
    }
}
