//! Integration tests for the WAV/base64 payload.

use audio_codec::{decode_base64, decode_wav, read_wav_header, wav_base64};
use tts_core::{WavFormat, Waveform};

#[test]
fn test_payload_roundtrip_keeps_sample_rate() {
    let waveform = Waveform::silence(1.0, 16000);
    let payload = wav_base64(&waveform, WavFormat::Float32).unwrap();

    let bytes = decode_base64(&payload).unwrap();
    let header = read_wav_header(&bytes).unwrap();
    assert_eq!(header.sample_rate, 16000);
    assert_eq!(header.num_samples, 16000);
    assert_eq!(decode_wav(&bytes).unwrap(), waveform);
}

#[test]
fn test_pcm16_payload_is_smaller() {
    let waveform = Waveform::silence(0.5, 16000);
    let float = wav_base64(&waveform, WavFormat::Float32).unwrap();
    let pcm = wav_base64(&waveform, WavFormat::Pcm16).unwrap();
    assert!(pcm.len() < float.len());
}
