//! Core data types shared by the bridge components.

use serde::{Deserialize, Serialize};

/// Audio container format reported in successful responses.
pub const AUDIO_FORMAT_WAV: &str = "wav";

/// A synthesis request as read from standard input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to synthesize.
    pub text: String,
}

impl SynthesisRequest {
    /// Create a new synthesis request.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Payload of a successful synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSuccess {
    /// Always `true`; kept for callers that test `result.success`.
    pub success: bool,
    /// Base64 (standard alphabet, padded) encoding of the WAV bytes.
    pub audio_base64: String,
    /// Sampling rate of the encoded audio in Hz.
    pub sampling_rate: u32,
    /// Container format, always `"wav"`.
    pub format: String,
}

/// Payload of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description.
    pub error: String,
}

/// The single JSON document written to standard output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SynthesisResponse {
    Success(SynthesisSuccess),
    Error(ErrorResponse),
}

impl SynthesisResponse {
    /// Build a success response for an encoded WAV payload.
    pub fn success(audio_base64: impl Into<String>, sampling_rate: u32) -> Self {
        Self::Success(SynthesisSuccess {
            success: true,
            audio_base64: audio_base64.into(),
            sampling_rate,
            format: AUDIO_FORMAT_WAV.to_string(),
        })
    }

    /// Build an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            error: message.into(),
        })
    }

    /// Whether this response reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Serialize as a single line of JSON (no trailing newline).
    pub fn to_json_line(&self) -> String {
        // Both variants only hold strings, integers and booleans.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":"serialization error: {}"}}"#, e.to_string().replace('"', "'"))
        })
    }
}

/// Token sequence produced by a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenSeq {
    /// Token IDs.
    pub ids: Vec<u32>,
}

impl TokenSeq {
    /// Create a new token sequence.
    pub fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    /// Get the number of tokens.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Mono waveform in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
}

impl Waveform {
    /// Create a new waveform.
    pub fn new(samples: Vec<f32>, sampling_rate: u32) -> Self {
        Self {
            samples,
            sampling_rate,
        }
    }

    /// A waveform of zeros lasting `seconds`.
    pub fn silence(seconds: f32, sampling_rate: u32) -> Self {
        let len = (seconds.max(0.0) * sampling_rate as f32).round() as usize;
        Self::new(vec![0.0; len], sampling_rate)
    }

    /// Number of samples.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Check if the waveform holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f32 {
        if self.sampling_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 * 1000.0 / self.sampling_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_serialization_order() {
        let response = SynthesisResponse::success("UklGRg==", 16000);
        assert_eq!(
            response.to_json_line(),
            r#"{"success":true,"audio_base64":"UklGRg==","sampling_rate":16000,"format":"wav"}"#
        );
        assert!(!response.is_error());
    }

    #[test]
    fn test_error_serialization() {
        let response = SynthesisResponse::error("請提供文本");
        assert_eq!(response.to_json_line(), r#"{"error":"請提供文本"}"#);
        assert!(response.is_error());
    }

    #[test]
    fn test_response_deserialize_untagged() {
        let ok: SynthesisResponse = serde_json::from_str(
            r#"{"success":true,"audio_base64":"","sampling_rate":22050,"format":"wav"}"#,
        )
        .unwrap();
        assert!(matches!(ok, SynthesisResponse::Success(ref s) if s.sampling_rate == 22050));

        let err: SynthesisResponse = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(err, SynthesisResponse::error("boom"));
    }

    #[test]
    fn test_token_seq() {
        let seq = TokenSeq::new(vec![0, 7, 0]);
        assert_eq!(seq.len(), 3);
        assert!(!seq.is_empty());
        assert!(TokenSeq::default().is_empty());
    }

    #[test]
    fn test_waveform_silence() {
        let wave = Waveform::silence(1.0, 16000);
        assert_eq!(wave.num_samples(), 16000);
        assert!(wave.samples.iter().all(|&s| s == 0.0));
        assert_eq!(wave.duration_ms(), 1000.0);
    }
}
