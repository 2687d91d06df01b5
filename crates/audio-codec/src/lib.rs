//! # audio-codec
//!
//! Turns synthesized waveforms into the payload returned to callers:
//! a WAV file built in memory, then base64-encoded (standard alphabet,
//! padded).

pub mod wav;

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;
use tts_core::{TtsError, TtsResult, WavFormat, Waveform};

pub use wav::{decode_wav, encode_wav, read_wav_header, WavHeader};

/// Base64-encode arbitrary bytes.
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 text.
pub fn decode_base64(text: &str) -> TtsResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(text)
        .map_err(|e| TtsError::serialization(format!("invalid base64: {e}")))
}

/// Encode a waveform as WAV and return the base64 text of the file.
pub fn wav_base64(waveform: &Waveform, format: WavFormat) -> TtsResult<String> {
    let bytes = encode_wav(waveform, format)?;
    debug!(wav_bytes = bytes.len(), "encoded wav");
    Ok(encode_base64(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_known_value() {
        assert_eq!(encode_base64(b"RIFF"), "UklGRg==");
        assert_eq!(decode_base64("UklGRg==").unwrap(), b"RIFF");
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_wav_base64_starts_with_riff() {
        let payload = wav_base64(&Waveform::silence(0.1, 16000), WavFormat::Float32).unwrap();
        assert!(payload.starts_with("UklGR"));
    }
}
