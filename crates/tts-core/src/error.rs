//! Unified error types for the TTS bridge.

/// Main error type for TTS operations.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The request could not be used as synthesis input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tokenization failed.
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Fetching or initializing the pretrained model failed.
    #[error("model load failed for {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    /// The requested compute device is not usable.
    #[error("device error: {0}")]
    Device(String),

    /// Model inference error.
    #[error("inference error: {0}")]
    Inference(String),

    /// Audio encoding error.
    #[error("audio encode error: {0}")]
    AudioEncode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience type alias for Results with TtsError.
pub type TtsResult<T> = Result<T, TtsError>;

impl TtsError {
    /// Create an invalid input error with message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a tokenization error with message.
    pub fn tokenization(msg: impl Into<String>) -> Self {
        Self::Tokenization(msg.into())
    }

    /// Create a model load error for the given model identifier.
    pub fn model_load(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a device error with message.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create an inference error with message.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create an audio encode error with message.
    pub fn audio_encode(msg: impl Into<String>) -> Self {
        Self::AudioEncode(msg.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for TtsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TtsError::tokenization("empty token sequence");
        assert_eq!(err.to_string(), "tokenization failed: empty token sequence");

        let err = TtsError::model_load("facebook/mms-tts-nan", "connection refused");
        assert_eq!(
            err.to_string(),
            "model load failed for facebook/mms-tts-nan: connection refused"
        );
    }

    #[test]
    fn test_error_constructors() {
        let err = TtsError::inference("shape mismatch");
        assert!(matches!(err, TtsError::Inference(_)));

        let err = TtsError::device("cuda not compiled in");
        assert!(matches!(err, TtsError::Device(_)));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: TtsError = parse.unwrap_err().into();
        assert!(matches!(err, TtsError::Serialization(_)));
    }
}
