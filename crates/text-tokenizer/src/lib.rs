//! # text-tokenizer
//!
//! Text tokenization for VITS checkpoints published by the MMS project.
//!
//! These checkpoints use a character vocabulary (`vocab.json`) plus a few
//! switches in `tokenizer_config.json`:
//! - `normalize`: keep vocabulary tokens verbatim, lowercase everything else
//! - `add_blank`: interleave the id-0 token around every character
//! - `phonemize`: requires an external phonemizer (not supported here)
//!
//! # Example
//!
//! ```ignore
//! use text_tokenizer::VitsTokenizer;
//! use tts_core::TextTokenizer;
//!
//! let tokenizer = VitsTokenizer::from_dir("models/mms-tts-nan")?;
//! let tokens = tokenizer.encode("Lí hó")?;
//! println!("Token IDs: {:?}", tokens.ids);
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{instrument, warn};
use tts_core::{TextTokenizer, TokenSeq, TtsError, TtsResult};

/// File holding the character vocabulary.
pub const VOCAB_FILE: &str = "vocab.json";

/// File holding the tokenizer switches.
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Id of the blank token interleaved by `add_blank`.
pub const BLANK_TOKEN_ID: u32 = 0;

/// Switches read from `tokenizer_config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenizerSettings {
    /// Interleave the blank token between characters.
    pub add_blank: bool,
    /// Lowercase characters that are not vocabulary tokens.
    pub normalize: bool,
    /// Text must be converted to phonemes first.
    pub phonemize: bool,
    /// The vocabulary expects romanized input.
    pub is_uroman: bool,
    /// ISO 639-3 language code of the checkpoint.
    pub language: Option<String>,
}

impl Default for TokenizerSettings {
    fn default() -> Self {
        Self {
            add_blank: true,
            normalize: true,
            phonemize: false,
            is_uroman: false,
            language: None,
        }
    }
}

/// Tokenizer for VITS character vocabularies.
#[derive(Debug, Clone)]
pub struct VitsTokenizer {
    encoder: HashMap<String, u32>,
    /// Vocabulary entries in id order; normalization tries them in this order.
    ordered_tokens: Vec<String>,
    settings: TokenizerSettings,
}

impl VitsTokenizer {
    /// Load `vocab.json` and (if present) `tokenizer_config.json` from a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> TtsResult<Self> {
        let dir = dir.as_ref();
        let config_path = dir.join(TOKENIZER_CONFIG_FILE);
        let config_path = config_path.exists().then_some(config_path);
        Self::from_files(dir.join(VOCAB_FILE), config_path.as_deref())
    }

    /// Load a tokenizer from a vocabulary file and optional config file.
    pub fn from_files(vocab_path: impl AsRef<Path>, config_path: Option<&Path>) -> TtsResult<Self> {
        let vocab_path = vocab_path.as_ref();
        let vocab_json = read_file(vocab_path)?;
        let config_json = config_path.map(read_file).transpose()?;
        Self::from_json(&vocab_json, config_json.as_deref())
    }

    /// Create a tokenizer from JSON strings.
    pub fn from_json(vocab_json: &str, config_json: Option<&str>) -> TtsResult<Self> {
        let encoder: HashMap<String, u32> = serde_json::from_str(vocab_json)
            .map_err(|e| TtsError::config(format!("invalid vocabulary JSON: {e}")))?;
        let settings = match config_json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| TtsError::config(format!("invalid tokenizer config JSON: {e}")))?,
            None => TokenizerSettings::default(),
        };
        Self::new(encoder, settings)
    }

    /// Create a tokenizer from an in-memory vocabulary.
    pub fn new(encoder: HashMap<String, u32>, settings: TokenizerSettings) -> TtsResult<Self> {
        if encoder.is_empty() {
            return Err(TtsError::config("vocabulary is empty"));
        }
        if settings.phonemize {
            return Err(TtsError::config(
                "phonemized vocabularies need an external phonemizer and are not supported",
            ));
        }

        let mut ordered: Vec<(&String, &u32)> =
            encoder.iter().filter(|(t, _)| !t.is_empty()).collect();
        ordered.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        let ordered_tokens = ordered.into_iter().map(|(t, _)| t.clone()).collect();

        Ok(Self {
            encoder,
            ordered_tokens,
            settings,
        })
    }

    /// Tokenizer switches in effect.
    pub fn settings(&self) -> &TokenizerSettings {
        &self.settings
    }

    /// Look up the id of a single token.
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.encoder.get(token).copied()
    }

    /// Keep vocabulary tokens verbatim and lowercase every other character.
    pub fn normalize_text(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(first) = rest.chars().next() {
            match self.ordered_tokens.iter().find(|t| rest.starts_with(t.as_str())) {
                Some(token) => {
                    out.push_str(token);
                    rest = &rest[token.len()..];
                }
                None => {
                    out.extend(first.to_lowercase());
                    rest = &rest[first.len_utf8()..];
                }
            }
        }
        out
    }

    /// Apply normalization and drop characters outside the vocabulary.
    pub fn prepare_text(&self, text: &str) -> String {
        let normalized = if self.settings.normalize {
            self.normalize_text(text)
        } else {
            text.to_string()
        };

        let normalized = match self.settings.language.as_deref() {
            // Romanian checkpoints were trained on the cedilla form.
            Some("ron") => normalized.replace('ț', "ţ"),
            _ => normalized,
        };

        if self.settings.is_uroman && !normalized.is_ascii() {
            warn!("checkpoint expects romanized text; non-ASCII characters may be dropped");
        }

        let mut dropped = 0usize;
        let kept: String = normalized
            .chars()
            .filter(|c| {
                let mut buf = [0u8; 4];
                let known = self.token_to_id(c.encode_utf8(&mut buf)).is_some();
                if !known {
                    dropped += 1;
                }
                known
            })
            .collect();

        if dropped > 0 {
            warn!(dropped, "dropped characters missing from the vocabulary");
        }
        kept.trim().to_string()
    }
}

impl TextTokenizer for VitsTokenizer {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    fn encode(&self, text: &str) -> TtsResult<TokenSeq> {
        let prepared = self.prepare_text(text);
        if prepared.is_empty() {
            return Err(TtsError::tokenization(
                "text has no characters from the model vocabulary",
            ));
        }

        let mut ids = Vec::with_capacity(prepared.chars().count() * 2 + 1);
        let mut buf = [0u8; 4];
        for c in prepared.chars() {
            let id = self
                .token_to_id(c.encode_utf8(&mut buf))
                .ok_or_else(|| TtsError::tokenization(format!("unknown character {c:?}")))?;
            if self.settings.add_blank {
                ids.push(BLANK_TOKEN_ID);
            }
            ids.push(id);
        }
        if self.settings.add_blank {
            ids.push(BLANK_TOKEN_ID);
        }

        Ok(TokenSeq::new(ids))
    }

    fn vocab_size(&self) -> usize {
        self.encoder.len()
    }

    fn pad_token_id(&self) -> Option<u32> {
        Some(BLANK_TOKEN_ID)
    }
}

fn read_file(path: &Path) -> TtsResult<String> {
    std::fs::read_to_string(path).map_err(|e| TtsError::model_load(path.display().to_string(), e))
}

/// A mock tokenizer for testing without model files.
#[derive(Debug, Default)]
pub struct MockTokenizer {
    vocab_size: usize,
}

impl MockTokenizer {
    /// Create a new mock tokenizer.
    pub fn new(vocab_size: usize) -> Self {
        Self { vocab_size }
    }
}

impl TextTokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> TtsResult<TokenSeq> {
        if self.vocab_size == 0 {
            return Err(TtsError::tokenization("mock vocabulary is empty"));
        }
        // Simple character-based mock encoding
        let ids: Vec<u32> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| (c as u32) % self.vocab_size as u32)
            .collect();

        if ids.is_empty() {
            return Err(TtsError::tokenization("nothing to encode"));
        }
        Ok(TokenSeq::new(ids))
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn pad_token_id(&self) -> Option<u32> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_vocab() -> HashMap<String, u32> {
        ["_", "a", "h", "l", "o", " ", "A"]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect()
    }

    #[test]
    fn test_mock_tokenizer_encode() {
        let tokenizer = MockTokenizer::new(256);
        let tokens = tokenizer.encode("hello").unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokenizer.pad_token_id(), Some(0));
        assert!(tokenizer.encode("   ").is_err());
    }

    #[test]
    fn test_normalize_keeps_vocab_case() {
        let tokenizer = VitsTokenizer::new(tiny_vocab(), TokenizerSettings::default()).unwrap();
        // "A" is in the vocabulary, "H" is not.
        assert_eq!(tokenizer.normalize_text("AH"), "Ah");
    }

    #[test]
    fn test_add_blank_interleaves() {
        let tokenizer = VitsTokenizer::new(tiny_vocab(), TokenizerSettings::default()).unwrap();
        let tokens = tokenizer.encode("ha").unwrap();
        assert_eq!(tokens.ids, vec![0, 2, 0, 1, 0]);
    }

    #[test]
    fn test_without_blank() {
        let settings = TokenizerSettings {
            add_blank: false,
            ..Default::default()
        };
        let tokenizer = VitsTokenizer::new(tiny_vocab(), settings).unwrap();
        assert_eq!(tokenizer.encode("lo").unwrap().ids, vec![3, 4]);
    }

    #[test]
    fn test_romanian_comma_below_maps_to_cedilla() {
        let vocab: HashMap<String, u32> = [("_", 0), ("a", 1), ("ţ", 2), ("ă", 3)]
            .iter()
            .map(|(t, i)| (t.to_string(), *i))
            .collect();
        let settings = TokenizerSettings {
            add_blank: false,
            language: Some("ron".to_string()),
            ..Default::default()
        };
        let tokenizer = VitsTokenizer::new(vocab.clone(), settings).unwrap();
        assert_eq!(tokenizer.prepare_text("Țară"), "ţaă");
        assert_eq!(tokenizer.encode("ța").unwrap().ids, vec![2, 1]);

        // Other languages keep the comma-below form, which is then unknown.
        let tokenizer = VitsTokenizer::new(vocab, TokenizerSettings::default()).unwrap();
        assert_eq!(tokenizer.prepare_text("ța"), "a");
    }

    #[test]
    fn test_phonemize_rejected() {
        let settings = TokenizerSettings {
            phonemize: true,
            ..Default::default()
        };
        assert!(VitsTokenizer::new(tiny_vocab(), settings).is_err());
    }

    #[test]
    fn test_unknown_only_text_fails() {
        let tokenizer = VitsTokenizer::new(tiny_vocab(), TokenizerSettings::default()).unwrap();
        let err = tokenizer.encode("xyz").unwrap_err();
        assert!(matches!(err, TtsError::Tokenization(_)));
    }
}
