//! Duration predictors: how many latent frames each token spans.

use candle_core::{Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, LayerNorm, Module, VarBuilder};

use crate::config::VitsConfig;
use crate::layers::{
    channel_norm, conv1d, flip_channels, layer_norm, pointwise, same_padding, split_channels,
};
use crate::sampling::NoiseSource;
use crate::spline::{unconstrained_rational_quadratic, Direction};

/// Stack of dilated depthwise + pointwise convolutions with residuals.
#[derive(Debug, Clone)]
struct DilatedDepthSeparableConv {
    convs_dilated: Vec<Conv1d>,
    convs_pointwise: Vec<Conv1d>,
    norms_1: Vec<LayerNorm>,
    norms_2: Vec<LayerNorm>,
}

impl DilatedDepthSeparableConv {
    fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let channels = config.hidden_size;
        let kernel_size = config.duration_predictor_kernel_size;
        let num_layers = config.depth_separable_num_layers;

        let mut convs_dilated = Vec::with_capacity(num_layers);
        let mut convs_pointwise = Vec::with_capacity(num_layers);
        let mut norms_1 = Vec::with_capacity(num_layers);
        let mut norms_2 = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let dilation = kernel_size.pow(i as u32);
            let cfg = Conv1dConfig {
                groups: channels,
                ..same_padding(kernel_size, dilation)
            };
            let name = i.to_string();
            convs_dilated.push(conv1d(
                channels,
                channels,
                kernel_size,
                cfg,
                true,
                vb.pp("convs_dilated").pp(&name),
            )?);
            convs_pointwise.push(pointwise(channels, channels, vb.pp("convs_pointwise").pp(&name))?);
            norms_1.push(layer_norm(channels, 1e-5, vb.pp("norms_1").pp(&name))?);
            norms_2.push(layer_norm(channels, 1e-5, vb.pp("norms_2").pp(&name))?);
        }

        Ok(Self {
            convs_dilated,
            convs_pointwise,
            norms_1,
            norms_2,
        })
    }

    fn forward(&self, x: &Tensor, conditioning: Option<&Tensor>) -> Result<Tensor> {
        let mut x = match conditioning {
            Some(cond) => (x + cond)?,
            None => x.clone(),
        };
        for i in 0..self.convs_dilated.len() {
            let h = self.convs_dilated[i].forward(&x)?;
            let h = channel_norm(&self.norms_1[i], &h)?.gelu_erf()?;
            let h = self.convs_pointwise[i].forward(&h)?;
            let h = channel_norm(&self.norms_2[i], &h)?.gelu_erf()?;
            x = (x + h)?;
        }
        Ok(x)
    }
}

/// Affine flow on the two latent channels.
#[derive(Debug, Clone)]
struct ElementwiseAffine {
    translate: Tensor,
    log_scale: Tensor,
}

impl ElementwiseAffine {
    fn new(channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            translate: vb.get((channels, 1), "translate")?,
            log_scale: vb.get((channels, 1), "log_scale")?,
        })
    }

    fn reverse(&self, x: &Tensor) -> Result<Tensor> {
        x.broadcast_sub(&self.translate)?
            .broadcast_mul(&self.log_scale.neg()?.exp()?)
    }
}

/// Coupling flow whose second half goes through a rational-quadratic spline.
#[derive(Debug, Clone)]
struct ConvFlow {
    conv_pre: Conv1d,
    conv_dds: DilatedDepthSeparableConv,
    conv_proj: Conv1d,
    half_channels: usize,
    num_bins: usize,
    tail_bound: f32,
    filter_channels: usize,
}

impl ConvFlow {
    fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let filter_channels = config.hidden_size;
        let half_channels = config.depth_separable_channels / 2;
        let num_bins = config.duration_predictor_flow_bins;
        Ok(Self {
            conv_pre: pointwise(half_channels, filter_channels, vb.pp("conv_pre"))?,
            conv_dds: DilatedDepthSeparableConv::new(config, vb.pp("conv_dds"))?,
            conv_proj: pointwise(
                filter_channels,
                half_channels * (3 * num_bins - 1),
                vb.pp("conv_proj"),
            )?,
            half_channels,
            num_bins,
            tail_bound: config.duration_predictor_tail_bound,
            filter_channels,
        })
    }

    fn reverse(&self, x: &Tensor, conditioning: &Tensor) -> Result<Tensor> {
        let (first, second) = split_channels(x, self.half_channels)?;
        let (batch, _, len) = first.dims3()?;
        let params_per_step = 3 * self.num_bins - 1;

        let h = self.conv_pre.forward(&first)?;
        let h = self.conv_dds.forward(&h, Some(conditioning))?;
        let h = self.conv_proj.forward(&h)?;
        let params: Vec<f32> = h
            .reshape((batch, self.half_channels, params_per_step, len))?
            .permute((0, 1, 3, 2))?
            .contiguous()?
            .flatten_all()?
            .to_vec1()?;
        let inputs: Vec<f32> = second.contiguous()?.flatten_all()?.to_vec1()?;

        let scale = (self.filter_channels as f32).sqrt();
        let outputs: Vec<f32> = inputs
            .iter()
            .zip(params.chunks_exact(params_per_step))
            .map(|(&value, p)| {
                let widths: Vec<f32> = p[..self.num_bins].iter().map(|w| w / scale).collect();
                let heights: Vec<f32> = p[self.num_bins..2 * self.num_bins]
                    .iter()
                    .map(|h| h / scale)
                    .collect();
                unconstrained_rational_quadratic(
                    value,
                    &widths,
                    &heights,
                    &p[2 * self.num_bins..],
                    self.tail_bound,
                    Direction::Inverse,
                )
            })
            .collect();

        let second = Tensor::from_vec(outputs, second.shape(), second.device())?;
        Tensor::cat(&[&first, &second], 1)
    }
}

/// Flow-based duration predictor, run from noise to log-durations.
#[derive(Debug, Clone)]
pub struct StochasticDurationPredictor {
    conv_pre: Conv1d,
    conv_dds: DilatedDepthSeparableConv,
    conv_proj: Conv1d,
    affine: ElementwiseAffine,
    /// `flows.1..=flows.N` in checkpoint order.
    conv_flows: Vec<ConvFlow>,
    channels: usize,
}

impl StochasticDurationPredictor {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let channels = config.depth_separable_channels;
        let vb_flows = vb.pp("flows");

        let mut conv_flows = Vec::with_capacity(config.duration_predictor_num_flows);
        for i in 1..=config.duration_predictor_num_flows {
            conv_flows.push(ConvFlow::new(config, vb_flows.pp(i.to_string()))?);
        }

        Ok(Self {
            conv_pre: pointwise(hidden, hidden, vb.pp("conv_pre"))?,
            conv_dds: DilatedDepthSeparableConv::new(config, vb.pp("conv_dds"))?,
            conv_proj: pointwise(hidden, hidden, vb.pp("conv_proj"))?,
            affine: ElementwiseAffine::new(channels, vb_flows.pp("0"))?,
            conv_flows,
            channels,
        })
    }

    /// Sample log-durations for `(1, hidden, tokens)` encoder features.
    pub fn log_durations(
        &self,
        hidden: &Tensor,
        noise_scale: f32,
        noise: &mut NoiseSource,
    ) -> Result<Vec<f32>> {
        let (batch, _, len) = hidden.dims3()?;
        let cond = self.conv_pre.forward(hidden)?;
        let cond = self.conv_dds.forward(&cond, None)?;
        let cond = self.conv_proj.forward(&cond)?;

        let mut latents = noise.normal((batch, self.channels, len), noise_scale, hidden.device())?;
        // The first conv flow only matters when training; it is skipped here.
        for flow in self.conv_flows.iter().skip(1).rev() {
            latents = flow.reverse(&flip_channels(&latents)?, &cond)?;
        }
        latents = self.affine.reverse(&flip_channels(&latents)?)?;

        latents.narrow(1, 0, 1)?.flatten_all()?.to_vec1()
    }
}

/// Convolutional duration predictor regressing log-durations directly.
#[derive(Debug, Clone)]
pub struct DeterministicDurationPredictor {
    conv_1: Conv1d,
    norm_1: LayerNorm,
    conv_2: Conv1d,
    norm_2: LayerNorm,
    proj: Conv1d,
}

impl DeterministicDurationPredictor {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let k = config.duration_predictor_kernel_size;
        let filter = config.duration_predictor_filter_channels;
        let eps = config.layer_norm_eps;
        let cfg = Conv1dConfig {
            padding: k / 2,
            ..Default::default()
        };
        Ok(Self {
            conv_1: conv1d(config.hidden_size, filter, k, cfg, true, vb.pp("conv_1"))?,
            norm_1: layer_norm(filter, eps, vb.pp("norm_1"))?,
            conv_2: conv1d(filter, filter, k, cfg, true, vb.pp("conv_2"))?,
            norm_2: layer_norm(filter, eps, vb.pp("norm_2"))?,
            proj: pointwise(filter, 1, vb.pp("proj"))?,
        })
    }

    pub fn log_durations(&self, hidden: &Tensor) -> Result<Vec<f32>> {
        let x = self.conv_1.forward(hidden)?.relu()?;
        let x = channel_norm(&self.norm_1, &x)?;
        let x = self.conv_2.forward(&x)?.relu()?;
        let x = channel_norm(&self.norm_2, &x)?;
        self.proj.forward(&x)?.flatten_all()?.to_vec1()
    }
}

/// Either duration predictor, chosen by the checkpoint configuration.
#[derive(Debug, Clone)]
pub enum DurationPredictor {
    Stochastic(StochasticDurationPredictor),
    Deterministic(DeterministicDurationPredictor),
}

impl DurationPredictor {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        if config.use_stochastic_duration_prediction {
            Ok(Self::Stochastic(StochasticDurationPredictor::new(config, vb)?))
        } else {
            Ok(Self::Deterministic(DeterministicDurationPredictor::new(config, vb)?))
        }
    }

    /// One log-duration per token.
    pub fn log_durations(
        &self,
        hidden: &Tensor,
        noise_scale: f32,
        noise: &mut NoiseSource,
    ) -> Result<Vec<f32>> {
        match self {
            Self::Stochastic(p) => p.log_durations(hidden, noise_scale, noise),
            Self::Deterministic(p) => p.log_durations(hidden),
        }
    }
}

/// Expand log-durations into the token index of every latent frame.
///
/// Each token lasts `ceil(exp(log_duration) * length_scale)` frames;
/// non-finite durations count as zero frames.
pub fn frame_indices(log_durations: &[f32], length_scale: f32) -> Vec<u32> {
    let mut indices = Vec::new();
    for (token, &log_duration) in log_durations.iter().enumerate() {
        let frames = (log_duration.exp() * length_scale).ceil();
        if !frames.is_finite() || frames <= 0.0 {
            continue;
        }
        indices.extend(std::iter::repeat(token as u32).take(frames as usize));
    }
    indices
}
