//! Text to base64 WAV, folded into the wire response.

use tracing::{error, info, instrument};
use tts_core::{LoadedModel, ModelLoader, SynthesisResponse, TtsResult, WavFormat};

use crate::loader::ModelSlot;

/// Error value when the request has no usable text.
pub const MSG_EMPTY_TEXT: &str = "請提供文本";
/// Error value when standard input is not valid JSON.
pub const MSG_INVALID_JSON: &str = "無效的 JSON 輸入";
/// Error value when the model cannot be loaded.
pub const MSG_MODEL_LOAD: &str = "模型載入失敗";
/// Prefix for tokenization, inference and encoding failures.
pub const MSG_SYNTHESIS_PREFIX: &str = "語音合成失敗";
/// Prefix for any other processing failure.
pub const MSG_PROCESSING_PREFIX: &str = "處理失敗";
/// Prefix of the startup backend check written to stderr.
pub const MSG_MISSING_BACKEND_PREFIX: &str = "缺少必要的套件";

/// Format a prefixed error message.
pub fn prefixed(prefix: &str, detail: impl std::fmt::Display) -> String {
    format!("{prefix}: {detail}")
}

/// Encoded audio ready for the success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub audio_base64: String,
    pub sampling_rate: u32,
}

/// Runs tokenizer, model and encoder against a model slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer {
    wav_format: WavFormat,
}

impl Synthesizer {
    pub fn new(wav_format: WavFormat) -> Self {
        Self { wav_format }
    }

    /// Synthesize `text`, loading the model first if needed.
    ///
    /// Never fails: every error becomes an error response.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub fn synthesize<L: ModelLoader>(&self, slot: &ModelSlot<L>, text: &str) -> SynthesisResponse {
        let loaded = match slot.get_or_load() {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("載入模型失敗: {e}");
                return SynthesisResponse::error(MSG_MODEL_LOAD);
            }
        };

        match self.encode(loaded, text) {
            Ok(audio) => {
                info!(sampling_rate = audio.sampling_rate, "synthesis succeeded");
                SynthesisResponse::success(audio.audio_base64, audio.sampling_rate)
            }
            Err(e) => {
                error!("synthesis failed: {e}");
                SynthesisResponse::error(prefixed(MSG_SYNTHESIS_PREFIX, e))
            }
        }
    }

    fn encode(&self, loaded: &LoadedModel, text: &str) -> TtsResult<EncodedAudio> {
        let tokens = loaded.tokenizer.encode(text)?;
        let waveform = loaded.model.generate(&tokens)?;
        let audio_base64 = audio_codec::wav_base64(&waveform, self.wav_format)?;
        Ok(EncodedAudio {
            audio_base64,
            sampling_rate: waveform.sampling_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use text_tokenizer::MockTokenizer;
    use tts_core::{ComputeClass, SpeechModel, TokenSeq, TtsError, Waveform};

    struct FailingModel;

    impl SpeechModel for FailingModel {
        fn generate(&self, _tokens: &TokenSeq) -> TtsResult<Waveform> {
            Err(TtsError::inference("out of memory"))
        }

        fn sampling_rate(&self) -> u32 {
            16000
        }
    }

    struct FailingModelLoader;

    impl ModelLoader for FailingModelLoader {
        fn model_id(&self) -> &str {
            "failing-model"
        }

        fn load(&self) -> TtsResult<LoadedModel> {
            Ok(LoadedModel {
                tokenizer: Box::new(MockTokenizer::new(32)),
                model: Box::new(FailingModel),
                compute: ComputeClass::General,
            })
        }
    }

    struct BrokenLoader;

    impl ModelLoader for BrokenLoader {
        fn model_id(&self) -> &str {
            "broken"
        }

        fn load(&self) -> TtsResult<LoadedModel> {
            Err(TtsError::model_load("broken", "connection refused"))
        }
    }

    #[test]
    fn test_load_failure_message() {
        let slot = ModelSlot::new(BrokenLoader);
        let response = Synthesizer::default().synthesize(&slot, "Lí hó");
        assert_eq!(response, SynthesisResponse::error(MSG_MODEL_LOAD));
    }

    #[test]
    fn test_inference_failure_message() {
        let slot = ModelSlot::new(FailingModelLoader);
        let response = Synthesizer::default().synthesize(&slot, "Lí hó");
        match response {
            SynthesisResponse::Error(e) => {
                assert!(e.error.starts_with("語音合成失敗: "), "{}", e.error);
                assert!(e.error.contains("out of memory"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed(MSG_PROCESSING_PREFIX, "boom"), "處理失敗: boom");
    }
}
