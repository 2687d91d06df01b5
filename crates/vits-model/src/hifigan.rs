//! HiFi-GAN vocoder turning latent frames into a waveform.

use candle_core::{Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig, Module, VarBuilder};

use crate::config::VitsConfig;
use crate::layers::{conv1d, conv_transpose1d, leaky_relu, same_padding};

/// Slope of the activation before the output convolution.
const FINAL_LEAKY_SLOPE: f64 = 0.01;

/// Multi-receptive-field residual block.
#[derive(Debug, Clone)]
struct ResidualBlock {
    convs1: Vec<Conv1d>,
    convs2: Vec<Conv1d>,
    slope: f64,
}

impl ResidualBlock {
    fn new(
        channels: usize,
        kernel_size: usize,
        dilations: &[usize],
        slope: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut convs1 = Vec::with_capacity(dilations.len());
        let mut convs2 = Vec::with_capacity(dilations.len());
        for (i, &dilation) in dilations.iter().enumerate() {
            convs1.push(conv1d(
                channels,
                channels,
                kernel_size,
                same_padding(kernel_size, dilation),
                true,
                vb.pp("convs1").pp(i.to_string()),
            )?);
            convs2.push(conv1d(
                channels,
                channels,
                kernel_size,
                same_padding(kernel_size, 1),
                true,
                vb.pp("convs2").pp(i.to_string()),
            )?);
        }
        Ok(Self {
            convs1,
            convs2,
            slope,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        for (conv1, conv2) in self.convs1.iter().zip(&self.convs2) {
            let h = conv1.forward(&leaky_relu(&x, self.slope)?)?;
            let h = conv2.forward(&leaky_relu(&h, self.slope)?)?;
            x = (x + h)?;
        }
        Ok(x)
    }
}

/// Upsampling generator.
#[derive(Debug, Clone)]
pub struct HifiGan {
    conv_pre: Conv1d,
    upsampler: Vec<ConvTranspose1d>,
    resblocks: Vec<ResidualBlock>,
    conv_post: Conv1d,
    num_kernels: usize,
    slope: f64,
}

impl HifiGan {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let initial = config.upsample_initial_channel;
        let conv7 = Conv1dConfig {
            padding: 3,
            ..Default::default()
        };
        let conv_pre = conv1d(config.flow_size, initial, 7, conv7, true, vb.pp("conv_pre"))?;

        let mut upsampler = Vec::with_capacity(config.upsample_rates.len());
        let mut resblocks = Vec::new();
        let mut channels = initial;
        for (i, (&rate, &kernel)) in config
            .upsample_rates
            .iter()
            .zip(&config.upsample_kernel_sizes)
            .enumerate()
        {
            let out_channels = initial >> (i + 1);
            let cfg = ConvTranspose1dConfig {
                padding: kernel.saturating_sub(rate) / 2,
                stride: rate,
                ..Default::default()
            };
            upsampler.push(conv_transpose1d(
                channels,
                out_channels,
                kernel,
                cfg,
                vb.pp("upsampler").pp(i.to_string()),
            )?);
            channels = out_channels;

            for (j, (&k, dilations)) in config
                .resblock_kernel_sizes
                .iter()
                .zip(&config.resblock_dilation_sizes)
                .enumerate()
            {
                let index = i * config.resblock_kernel_sizes.len() + j;
                resblocks.push(ResidualBlock::new(
                    channels,
                    k,
                    dilations,
                    config.leaky_relu_slope,
                    vb.pp("resblocks").pp(index.to_string()),
                )?);
            }
        }

        let conv_post = conv1d(channels, 1, 7, conv7, false, vb.pp("conv_post"))?;

        Ok(Self {
            conv_pre,
            upsampler,
            resblocks,
            conv_post,
            num_kernels: config.resblock_kernel_sizes.len(),
            slope: config.leaky_relu_slope,
        })
    }

    /// `(1, flow_size, frames)` latents to a `(1, 1, frames * upsample_factor)` waveform.
    pub fn forward(&self, latents: &Tensor) -> Result<Tensor> {
        let mut x = self.conv_pre.forward(latents)?;
        for (i, upsample) in self.upsampler.iter().enumerate() {
            x = upsample.forward(&leaky_relu(&x, self.slope)?)?;
            let blocks = &self.resblocks[i * self.num_kernels..(i + 1) * self.num_kernels];
            let mut sum = blocks[0].forward(&x)?;
            for block in &blocks[1..] {
                sum = (sum + block.forward(&x)?)?;
            }
            x = (sum / self.num_kernels as f64)?;
        }
        let x = leaky_relu(&x, FINAL_LEAKY_SLOPE)?;
        self.conv_post.forward(&x)?.tanh()
    }
}
