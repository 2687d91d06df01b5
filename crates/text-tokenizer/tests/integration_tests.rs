//! Integration tests for text-tokenizer crate.
//!
//! These tests load tokenizers from checkpoint-style directories.

use std::path::Path;

use text_tokenizer::{VitsTokenizer, BLANK_TOKEN_ID, TOKENIZER_CONFIG_FILE, VOCAB_FILE};
use tts_core::TextTokenizer;

const VOCAB: &str = r#"{"_": 0, "l": 1, "í": 2, " ": 3, "h": 4, "ó": 5, "-": 6, "a": 7}"#;

fn write_checkpoint(dir: &Path, config: Option<&str>) {
    std::fs::write(dir.join(VOCAB_FILE), VOCAB).unwrap();
    if let Some(config) = config {
        std::fs::write(dir.join(TOKENIZER_CONFIG_FILE), config).unwrap();
    }
}

#[test]
fn test_load_from_dir_with_config() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(
        dir.path(),
        Some(r#"{"add_blank": true, "normalize": true, "language": "nan", "pad_token": "_"}"#),
    );

    let tokenizer = VitsTokenizer::from_dir(dir.path()).expect("should load tokenizer");
    assert_eq!(tokenizer.vocab_size(), 8);
    assert_eq!(tokenizer.pad_token_id(), Some(BLANK_TOKEN_ID));
    assert_eq!(tokenizer.settings().language.as_deref(), Some("nan"));
}

#[test]
fn test_load_from_dir_without_config() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), None);

    let tokenizer = VitsTokenizer::from_dir(dir.path()).unwrap();
    assert!(tokenizer.settings().add_blank);
    assert!(tokenizer.settings().normalize);
}

#[test]
fn test_missing_vocab_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(VitsTokenizer::from_dir(dir.path()).is_err());
}

#[test]
fn test_encode_taiwanese_romanization() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), None);
    let tokenizer = VitsTokenizer::from_dir(dir.path()).unwrap();

    // Uppercase L is not in the vocabulary and gets lowercased.
    let tokens = tokenizer.encode("Lí hó").unwrap();
    assert_eq!(tokens.ids, vec![0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0]);
}

#[test]
fn test_unknown_characters_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), Some(r#"{"add_blank": false}"#));
    let tokenizer = VitsTokenizer::from_dir(dir.path()).unwrap();

    assert_eq!(tokenizer.prepare_text("hó!?"), "hó");
    assert_eq!(tokenizer.encode("  hó! ").unwrap().ids, vec![4, 5]);
}

#[test]
fn test_text_outside_vocabulary_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), None);
    let tokenizer = VitsTokenizer::from_dir(dir.path()).unwrap();

    assert!(tokenizer.encode("你好").is_err());
}

#[test]
fn test_invalid_config_json() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), Some("{not json"));
    assert!(VitsTokenizer::from_dir(dir.path()).is_err());
}
