//! Integration tests for the TTS runtime.
//!
//! These tests run the whole bridge against a tiny zero-initialised VITS
//! checkpoint written to a temporary directory, without network access.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use runtime::{Bridge, HubModelLoader, EXIT_FAILURE, EXIT_SUCCESS};
use tts_core::{
    DevicePreference, InferenceConfig, ModelConfig, SynthesisResponse, WavFormat,
};
use vits_model::{InferenceParams, VitsConfig, VitsModel};

fn tiny_config() -> VitsConfig {
    VitsConfig {
        vocab_size: 8,
        hidden_size: 8,
        num_hidden_layers: 1,
        num_attention_heads: 2,
        window_size: Some(2),
        ffn_dim: 16,
        flow_size: 4,
        upsample_initial_channel: 16,
        upsample_rates: vec![4, 2],
        upsample_kernel_sizes: vec![8, 4],
        resblock_kernel_sizes: vec![3],
        resblock_dilation_sizes: vec![vec![1, 3]],
        duration_predictor_num_flows: 2,
        duration_predictor_flow_bins: 4,
        prior_encoder_num_flows: 2,
        prior_encoder_num_wavenet_layers: 2,
        sampling_rate: 16000,
        ..Default::default()
    }
}

/// Write config.json, vocab.json and zeroed model.safetensors.
fn write_checkpoint(dir: &Path) {
    let config = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    VitsModel::from_vb(
        vb,
        config.clone(),
        InferenceParams::from_config(&config),
        &Device::Cpu,
    )
    .unwrap();
    varmap.save(dir.join("model.safetensors")).unwrap();

    std::fs::write(
        dir.join("config.json"),
        serde_json::to_string(&config).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("vocab.json"),
        r#"{"_": 0, "l": 1, "í": 2, " ": 3, "h": 4, "ó": 5}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("tokenizer_config.json"),
        r#"{"add_blank": true, "normalize": true, "language": "nan"}"#,
    )
    .unwrap();
}

fn local_bridge(dir: &Path, wav_format: WavFormat) -> Bridge<HubModelLoader> {
    let loader = HubModelLoader::new(
        ModelConfig {
            id: dir.display().to_string(),
            device: DevicePreference::Cpu,
            ..Default::default()
        },
        InferenceConfig {
            seed: Some(1234),
            ..Default::default()
        },
    );
    Bridge::new(loader, wav_format)
}

#[test]
fn test_local_checkpoint_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let bridge = local_bridge(dir.path(), WavFormat::Float32);

    let mut out = Vec::new();
    let code = bridge
        .run(r#"{"text": "Lí hó"}"#.as_bytes(), &mut out)
        .unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(out.ends_with(b"\n"));

    let response: SynthesisResponse = serde_json::from_slice(&out).unwrap();
    let SynthesisResponse::Success(success) = response else {
        panic!("expected success, got {}", String::from_utf8_lossy(&out));
    };
    assert!(success.success);
    assert_eq!(success.format, "wav");
    assert_eq!(success.sampling_rate, 16000);

    let wav = audio_codec::decode_base64(&success.audio_base64).unwrap();
    let header = audio_codec::read_wav_header(&wav).unwrap();
    assert_eq!(header.sample_rate, success.sampling_rate);
    assert!(header.is_float);
    assert!(header.num_samples > 0);
    assert_eq!(header.num_samples % 8, 0);
}

#[test]
fn test_local_checkpoint_pcm16() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let bridge = local_bridge(dir.path(), WavFormat::Pcm16);

    let response = bridge.respond(r#"{"text": "hó"}"#.as_bytes());
    let SynthesisResponse::Success(success) = response else {
        panic!("expected success");
    };
    let wav = audio_codec::decode_base64(&success.audio_base64).unwrap();
    assert_eq!(audio_codec::read_wav_header(&wav).unwrap().bits_per_sample, 16);
}

#[test]
fn test_text_outside_vocabulary_is_synthesis_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let bridge = local_bridge(dir.path(), WavFormat::Float32);

    let mut out = Vec::new();
    let code = bridge.run("{\"text\": \"你好\"}".as_bytes(), &mut out).unwrap();
    assert_eq!(code, EXIT_FAILURE);
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("{\"error\":\"語音合成失敗: "), "{out}");
    assert!(bridge.slot().is_loaded());
}

#[test]
fn test_missing_checkpoint_is_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = local_bridge(dir.path(), WavFormat::Float32);

    let mut out = Vec::new();
    let code = bridge.run(r#"{"text": "hó"}"#.as_bytes(), &mut out).unwrap();
    assert_eq!(code, EXIT_FAILURE);
    assert_eq!(out, "{\"error\":\"模型載入失敗\"}\n".as_bytes());
    assert!(!bridge.slot().is_loaded());
}

#[test]
fn test_zero_sized_config_is_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let config = VitsConfig {
        duration_predictor_flow_bins: 0,
        ..tiny_config()
    };
    std::fs::write(
        dir.path().join("config.json"),
        serde_json::to_string(&config).unwrap(),
    )
    .unwrap();
    let bridge = local_bridge(dir.path(), WavFormat::Float32);

    let mut out = Vec::new();
    let code = bridge.run(r#"{"text": "hó"}"#.as_bytes(), &mut out).unwrap();
    assert_eq!(code, EXIT_FAILURE);
    assert_eq!(out, "{\"error\":\"模型載入失敗\"}\n".as_bytes());
}
