//! VITS model configuration, read from the checkpoint's `config.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tts_core::{TtsError, TtsResult};

/// Architecture and sampling settings of a VITS checkpoint.
///
/// Field names follow the checkpoint's `config.json`; missing fields take
/// the values of the published MMS checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitsConfig {
    /// Number of character tokens.
    pub vocab_size: usize,
    /// Text encoder width.
    pub hidden_size: usize,
    /// Number of text encoder layers.
    pub num_hidden_layers: usize,
    /// Attention heads per encoder layer.
    pub num_attention_heads: usize,
    /// Relative attention window; `None` disables relative positions.
    pub window_size: Option<usize>,
    /// Whether the attention projections carry a bias.
    pub use_bias: bool,
    /// Feed-forward width.
    pub ffn_dim: usize,
    /// Feed-forward convolution kernel size.
    pub ffn_kernel_size: usize,
    /// Channels of the latent fed to the decoder.
    pub flow_size: usize,
    /// Activation of the encoder feed-forward block.
    pub hidden_act: String,
    /// Layer norm epsilon.
    pub layer_norm_eps: f64,
    /// Use the flow-based duration predictor.
    pub use_stochastic_duration_prediction: bool,
    /// Number of speakers; only single-speaker checkpoints are supported.
    pub num_speakers: usize,
    /// Speaker embedding width, zero for single-speaker checkpoints.
    pub speaker_embedding_size: usize,
    /// Decoder channels before the first upsampling stage.
    pub upsample_initial_channel: usize,
    /// Stride of each decoder upsampling stage.
    pub upsample_rates: Vec<usize>,
    /// Kernel size of each decoder upsampling stage.
    pub upsample_kernel_sizes: Vec<usize>,
    /// Kernel sizes of the decoder residual blocks.
    pub resblock_kernel_sizes: Vec<usize>,
    /// Dilations of the decoder residual blocks.
    pub resblock_dilation_sizes: Vec<Vec<usize>>,
    /// Negative slope of the decoder leaky ReLUs.
    pub leaky_relu_slope: f64,
    /// Channels of the duration predictor latent.
    pub depth_separable_channels: usize,
    /// Layers in each dilated depth-separable stack.
    pub depth_separable_num_layers: usize,
    /// Spline bins of the duration flows.
    pub duration_predictor_flow_bins: usize,
    /// Spline tail bound of the duration flows.
    pub duration_predictor_tail_bound: f32,
    /// Kernel size of the duration predictor convolutions.
    pub duration_predictor_kernel_size: usize,
    /// Number of spline flows in the duration predictor.
    pub duration_predictor_num_flows: usize,
    /// Width of the deterministic duration predictor.
    pub duration_predictor_filter_channels: usize,
    /// Number of coupling layers in the prior flow.
    pub prior_encoder_num_flows: usize,
    /// WaveNet layers per coupling layer.
    pub prior_encoder_num_wavenet_layers: usize,
    /// WaveNet kernel size.
    pub wavenet_kernel_size: usize,
    /// WaveNet dilation growth per layer.
    pub wavenet_dilation_rate: usize,
    /// Durations are divided by this value.
    pub speaking_rate: f32,
    /// Scale of the prior noise.
    pub noise_scale: f32,
    /// Scale of the duration predictor noise.
    pub noise_scale_duration: f32,
    /// Output sampling rate in Hz.
    pub sampling_rate: u32,
}

impl Default for VitsConfig {
    fn default() -> Self {
        Self {
            vocab_size: 38,
            hidden_size: 192,
            num_hidden_layers: 6,
            num_attention_heads: 2,
            window_size: Some(4),
            use_bias: true,
            ffn_dim: 768,
            ffn_kernel_size: 3,
            flow_size: 192,
            hidden_act: "relu".to_string(),
            layer_norm_eps: 1e-5,
            use_stochastic_duration_prediction: true,
            num_speakers: 1,
            speaker_embedding_size: 0,
            upsample_initial_channel: 512,
            upsample_rates: vec![8, 8, 2, 2],
            upsample_kernel_sizes: vec![16, 16, 4, 4],
            resblock_kernel_sizes: vec![3, 7, 11],
            resblock_dilation_sizes: vec![vec![1, 3, 5], vec![1, 3, 5], vec![1, 3, 5]],
            leaky_relu_slope: 0.1,
            depth_separable_channels: 2,
            depth_separable_num_layers: 3,
            duration_predictor_flow_bins: 10,
            duration_predictor_tail_bound: 5.0,
            duration_predictor_kernel_size: 3,
            duration_predictor_num_flows: 4,
            duration_predictor_filter_channels: 256,
            prior_encoder_num_flows: 4,
            prior_encoder_num_wavenet_layers: 4,
            wavenet_kernel_size: 5,
            wavenet_dilation_rate: 1,
            speaking_rate: 1.0,
            noise_scale: 0.667,
            noise_scale_duration: 0.8,
            sampling_rate: 16000,
        }
    }
}

impl VitsConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(json: &str) -> TtsResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TtsError::config(format!("invalid model config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a `config.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> TtsResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TtsError::model_load(path.display().to_string(), e))?;
        Self::from_json(&json)
    }

    /// Samples produced per latent frame.
    pub fn upsample_factor(&self) -> usize {
        self.upsample_rates.iter().product()
    }

    /// Per-head width of the text encoder attention.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Reject checkpoints this implementation cannot run.
    pub fn validate(&self) -> TtsResult<()> {
        if self.num_speakers > 1 || self.speaker_embedding_size != 0 {
            return Err(TtsError::config(format!(
                "multi-speaker checkpoints are not supported ({} speakers)",
                self.num_speakers
            )));
        }
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(TtsError::config(format!(
                "hidden_size {} is not divisible by {} heads",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.upsample_rates.is_empty()
            || self.upsample_rates.len() != self.upsample_kernel_sizes.len()
        {
            return Err(TtsError::config(
                "upsample_rates and upsample_kernel_sizes must be non-empty and of equal length",
            ));
        }
        if self.resblock_kernel_sizes.is_empty()
            || self.resblock_kernel_sizes.len() != self.resblock_dilation_sizes.len()
        {
            return Err(TtsError::config(
                "resblock_kernel_sizes and resblock_dilation_sizes must be non-empty and of equal length",
            ));
        }
        if self.upsample_initial_channel >> self.upsample_rates.len() == 0 {
            return Err(TtsError::config("upsample_initial_channel is too small"));
        }
        if self.flow_size % 2 != 0 || self.depth_separable_channels % 2 != 0 {
            return Err(TtsError::config("flow channels must be even"));
        }
        if !matches!(self.hidden_act.as_str(), "relu" | "gelu") {
            return Err(TtsError::config(format!(
                "unsupported activation {:?}",
                self.hidden_act
            )));
        }
        if self.sampling_rate == 0 {
            return Err(TtsError::config("sampling_rate must be positive"));
        }
        if let Some(name) = self.first_zero_field() {
            return Err(TtsError::config(format!("{name} must be positive")));
        }
        Ok(())
    }

    /// Name of the first size, count or kernel field that is zero.
    fn first_zero_field(&self) -> Option<&'static str> {
        let scalars = [
            ("vocab_size", self.vocab_size),
            ("hidden_size", self.hidden_size),
            ("num_hidden_layers", self.num_hidden_layers),
            ("ffn_dim", self.ffn_dim),
            ("ffn_kernel_size", self.ffn_kernel_size),
            ("flow_size", self.flow_size),
            ("depth_separable_channels", self.depth_separable_channels),
            ("duration_predictor_flow_bins", self.duration_predictor_flow_bins),
            ("duration_predictor_kernel_size", self.duration_predictor_kernel_size),
            ("duration_predictor_num_flows", self.duration_predictor_num_flows),
            (
                "duration_predictor_filter_channels",
                self.duration_predictor_filter_channels,
            ),
            ("prior_encoder_num_flows", self.prior_encoder_num_flows),
            (
                "prior_encoder_num_wavenet_layers",
                self.prior_encoder_num_wavenet_layers,
            ),
            ("wavenet_kernel_size", self.wavenet_kernel_size),
            ("wavenet_dilation_rate", self.wavenet_dilation_rate),
        ];
        if let Some(&(name, _)) = scalars.iter().find(|(_, v)| *v == 0) {
            return Some(name);
        }

        let lists: [(&'static str, &[usize]); 3] = [
            ("upsample_rates", &self.upsample_rates),
            ("upsample_kernel_sizes", &self.upsample_kernel_sizes),
            ("resblock_kernel_sizes", &self.resblock_kernel_sizes),
        ];
        if let Some(&(name, _)) = lists.iter().find(|(_, v)| v.contains(&0)) {
            return Some(name);
        }
        self.resblock_dilation_sizes
            .iter()
            .any(|d| d.is_empty() || d.contains(&0))
            .then_some("resblock_dilation_sizes")
    }
}
