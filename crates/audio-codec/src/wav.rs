//! WAV encoding into memory.

use std::io::{self, Cursor};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tts_core::{TtsError, TtsResult, WavFormat, Waveform};

/// Header fields of an encoded WAV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub is_float: bool,
    /// Samples per channel.
    pub num_samples: u32,
}

fn spec_for(format: WavFormat, sample_rate: u32) -> WavSpec {
    match format {
        WavFormat::Float32 => WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
        WavFormat::Pcm16 => WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    }
}

/// Encode a mono waveform as a complete WAV file held in memory.
pub fn encode_wav(waveform: &Waveform, format: WavFormat) -> TtsResult<Vec<u8>> {
    if waveform.sampling_rate == 0 {
        return Err(TtsError::audio_encode("sampling rate must be positive"));
    }

    let spec = spec_for(format, waveform.sampling_rate);
    let mut buffer = Cursor::new(Vec::with_capacity(44 + waveform.num_samples() * 4));
    {
        let mut writer =
            WavWriter::new(&mut buffer, spec).map_err(|e| TtsError::audio_encode(e.to_string()))?;

        match format {
            WavFormat::Float32 => {
                for &sample in &waveform.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| TtsError::audio_encode(e.to_string()))?;
                }
            }
            WavFormat::Pcm16 => {
                for &sample in &waveform.samples {
                    let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer
                        .write_sample(sample_i16)
                        .map_err(|e| TtsError::audio_encode(e.to_string()))?;
                }
            }
        }

        writer
            .finalize()
            .map_err(|e| TtsError::audio_encode(e.to_string()))?;
    }

    Ok(buffer.into_inner())
}

/// Read the header of an in-memory WAV stream.
pub fn read_wav_header(bytes: &[u8]) -> TtsResult<WavHeader> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;
    let spec = reader.spec();
    Ok(WavHeader {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        is_float: spec.sample_format == SampleFormat::Float,
        num_samples: reader.duration(),
    })
}

/// Decode an in-memory mono WAV stream back into a waveform.
pub fn decode_wav(bytes: &[u8]) -> TtsResult<Waveform> {
    let mut reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect(),
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };
    let samples = samples.map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;
    Ok(Waveform::new(samples, spec.sample_rate))
}
