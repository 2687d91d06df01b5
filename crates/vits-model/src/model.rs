//! End-to-end VITS inference: token ids in, waveform out.

use std::path::Path;

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::VarBuilder;
use tracing::{debug, info, instrument};
use tts_core::{InferenceConfig, SpeechModel, TokenSeq, TtsError, TtsResult, Waveform};

use crate::config::VitsConfig;
use crate::duration::{frame_indices, DurationPredictor};
use crate::flow::ResidualCouplingBlock;
use crate::hifigan::HifiGan;
use crate::sampling::NoiseSource;
use crate::text_encoder::TextEncoder;

/// Sampling knobs applied at inference time.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    /// Scale of the prior noise.
    pub noise_scale: f32,
    /// Scale of the duration predictor noise.
    pub noise_scale_duration: f32,
    /// Durations are divided by this value.
    pub speaking_rate: f32,
    /// Seed for reproducible output; fresh entropy per call when `None`.
    pub seed: Option<u64>,
}

impl InferenceParams {
    /// The checkpoint's own sampling values.
    pub fn from_config(config: &VitsConfig) -> Self {
        Self {
            noise_scale: config.noise_scale,
            noise_scale_duration: config.noise_scale_duration,
            speaking_rate: config.speaking_rate,
            seed: None,
        }
    }

    /// Apply user overrides and validate the result.
    pub fn with_overrides(mut self, overrides: &InferenceConfig) -> TtsResult<Self> {
        if let Some(v) = overrides.noise_scale {
            self.noise_scale = v;
        }
        if let Some(v) = overrides.noise_scale_duration {
            self.noise_scale_duration = v;
        }
        if let Some(v) = overrides.speaking_rate {
            self.speaking_rate = v;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }

        if !(self.speaking_rate.is_finite() && self.speaking_rate > 0.0) {
            return Err(TtsError::config(format!(
                "speaking_rate must be positive, got {}",
                self.speaking_rate
            )));
        }
        if !(self.noise_scale >= 0.0 && self.noise_scale_duration >= 0.0) {
            return Err(TtsError::config("noise scales must be non-negative"));
        }
        Ok(self)
    }
}

/// A loaded VITS checkpoint.
#[derive(Debug)]
pub struct VitsModel {
    text_encoder: TextEncoder,
    duration_predictor: DurationPredictor,
    flow: ResidualCouplingBlock,
    decoder: HifiGan,
    config: VitsConfig,
    params: InferenceParams,
    device: Device,
}

impl VitsModel {
    /// Load a checkpoint from its `config.json` and weights file.
    ///
    /// Weights ending in `.safetensors` are read as safetensors, anything
    /// else as a PyTorch pickle.
    #[instrument(skip_all, fields(weights = %weights_path.as_ref().display()))]
    pub fn load(
        config_path: impl AsRef<Path>,
        weights_path: impl AsRef<Path>,
        device: &Device,
        overrides: &InferenceConfig,
    ) -> TtsResult<Self> {
        let weights_path = weights_path.as_ref();
        let label = weights_path.display().to_string();
        let config = VitsConfig::from_file(config_path)?;
        let params = InferenceParams::from_config(&config).with_overrides(overrides)?;

        info!("Loading VITS weights from {}", weights_path.display());
        let is_safetensors = weights_path
            .extension()
            .is_some_and(|ext| ext == "safetensors");
        let vb = if is_safetensors {
            let tensors = candle_core::safetensors::load(weights_path, device)
                .map_err(|e| TtsError::model_load(&label, e))?;
            VarBuilder::from_tensors(tensors, DType::F32, device)
        } else {
            VarBuilder::from_pth(weights_path, DType::F32, device)
                .map_err(|e| TtsError::model_load(&label, e))?
        };

        Self::from_vb(vb, config, params, device).map_err(|e| TtsError::model_load(&label, e))
    }

    /// Build the model from a `VarBuilder` (for testing or custom loading).
    pub fn from_vb(
        vb: VarBuilder,
        config: VitsConfig,
        params: InferenceParams,
        device: &Device,
    ) -> Result<Self> {
        let text_encoder = TextEncoder::new(&config, vb.pp("text_encoder"))?;
        let duration_predictor = DurationPredictor::new(&config, vb.pp("duration_predictor"))?;
        let flow = ResidualCouplingBlock::new(&config, vb.pp("flow"))?;
        let decoder = HifiGan::new(&config, vb.pp("decoder"))?;

        info!(
            "VITS loaded: {} encoder layers, {} hidden, {} Hz",
            config.num_hidden_layers, config.hidden_size, config.sampling_rate
        );

        Ok(Self {
            text_encoder,
            duration_predictor,
            flow,
            decoder,
            config,
            params,
            device: device.clone(),
        })
    }

    /// Get the model configuration.
    pub fn config(&self) -> &VitsConfig {
        &self.config
    }

    /// Get the sampling parameters in effect.
    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    /// Get the device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run the full network on one sequence of token ids.
    pub fn synthesize(&self, ids: &[u32]) -> Result<Vec<f32>> {
        let mut noise = NoiseSource::new(self.params.seed);
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;

        let encoded = self.text_encoder.forward(&input_ids)?;
        let log_durations = self.duration_predictor.log_durations(
            &encoded.hidden,
            self.params.noise_scale_duration,
            &mut noise,
        )?;

        let frames = frame_indices(&log_durations, 1.0 / self.params.speaking_rate);
        let (means, log_variances) = if frames.is_empty() {
            // A zero total duration still yields one frame, with an empty alignment.
            let zeros = Tensor::zeros((1, self.config.flow_size, 1), DType::F32, &self.device)?;
            (zeros.clone(), zeros)
        } else {
            let index = Tensor::new(frames.as_slice(), &self.device)?;
            (
                encoded.prior_means.index_select(&index, 2)?,
                encoded.prior_log_variances.index_select(&index, 2)?,
            )
        };
        let num_frames = means.dim(2)?;
        debug!(tokens = ids.len(), frames = num_frames, "expanded durations");

        let eps = noise.normal(
            (1, self.config.flow_size, num_frames),
            self.params.noise_scale,
            &self.device,
        )?;
        let prior = (means + (eps * log_variances.exp()?)?)?;
        let latents = self.flow.reverse(&prior)?;
        let waveform = self.decoder.forward(&latents)?;

        waveform.flatten_all()?.to_vec1()
    }
}

impl SpeechModel for VitsModel {
    #[instrument(skip(self, tokens), fields(tokens = tokens.len()))]
    fn generate(&self, tokens: &TokenSeq) -> TtsResult<Waveform> {
        if tokens.is_empty() {
            return Err(TtsError::invalid_input("no tokens to synthesize"));
        }
        if let Some(&id) = tokens.ids.iter().find(|&&id| id as usize >= self.config.vocab_size) {
            return Err(TtsError::invalid_input(format!(
                "token id {id} is outside the vocabulary of {}",
                self.config.vocab_size
            )));
        }

        let samples = self
            .synthesize(&tokens.ids)
            .map_err(|e| TtsError::inference(e.to_string()))?;
        let waveform = Waveform::new(samples, self.config.sampling_rate);
        info!(
            samples = waveform.num_samples(),
            duration_ms = waveform.duration_ms(),
            "synthesis finished"
        );
        Ok(waveform)
    }

    fn sampling_rate(&self) -> u32 {
        self.config.sampling_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tiny_config() -> VitsConfig {
        VitsConfig {
            vocab_size: 10,
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
            ..Default::default()
        }
    }

    fn tiny_model(seed: Option<u64>) -> VitsModel {
        let config = tiny_config();
        let params = InferenceParams {
            seed,
            ..InferenceParams::from_config(&config)
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        VitsModel::from_vb(vb, config, params, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_zero_model_generates_whole_frames() {
        let model = tiny_model(Some(11));
        let tokens = TokenSeq::new(vec![0, 3, 0, 5, 0]);
        let waveform = model.generate(&tokens).unwrap();

        assert_eq!(waveform.sampling_rate, 16000);
        assert!(!waveform.is_empty());
        assert_eq!(waveform.num_samples() % model.config().upsample_factor(), 0);
        assert!(waveform.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let model = tiny_model(Some(5));
        let tokens = TokenSeq::new(vec![0, 1, 0, 2, 0, 3, 0]);
        let a = model.generate(&tokens).unwrap();
        let b = model.generate(&tokens).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_total_duration_yields_one_frame() {
        let config = VitsConfig {
            use_stochastic_duration_prediction: false,
            ..tiny_config()
        };
        let varmap = VarMap::new();
        // exp(-200) underflows, so every token gets zero frames.
        varmap
            .get(
                1,
                "duration_predictor.proj.bias",
                candle_nn::Init::Const(-200.0),
                DType::F32,
                &Device::Cpu,
            )
            .unwrap();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let params = InferenceParams {
            seed: Some(2),
            ..InferenceParams::from_config(&config)
        };
        let model = VitsModel::from_vb(vb, config, params, &Device::Cpu).unwrap();

        let waveform = model.generate(&TokenSeq::new(vec![0, 3, 0, 5, 0])).unwrap();
        assert_eq!(waveform.num_samples(), model.config().upsample_factor());
        assert!(waveform.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_rejects_empty_and_out_of_vocab_tokens() {
        let model = tiny_model(None);
        assert!(matches!(
            model.generate(&TokenSeq::default()),
            Err(TtsError::InvalidInput(_))
        ));
        assert!(matches!(
            model.generate(&TokenSeq::new(vec![0, 10])),
            Err(TtsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_params_overrides() {
        let config = VitsConfig::default();
        let overrides = InferenceConfig {
            noise_scale: Some(0.0),
            speaking_rate: Some(1.5),
            seed: Some(9),
            ..Default::default()
        };
        let params = InferenceParams::from_config(&config)
            .with_overrides(&overrides)
            .unwrap();
        assert_eq!(params.noise_scale, 0.0);
        assert_eq!(params.noise_scale_duration, 0.8);
        assert_eq!(params.speaking_rate, 1.5);
        assert_eq!(params.seed, Some(9));

        let bad = InferenceConfig {
            speaking_rate: Some(0.0),
            ..Default::default()
        };
        assert!(InferenceParams::from_config(&config)
            .with_overrides(&bad)
            .is_err());
    }

    #[test]
    fn test_load_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = VitsModel::load(
            dir.path().join("config.json"),
            dir.path().join("model.safetensors"),
            &Device::Cpu,
            &InferenceConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad { .. }));
    }
}
