//! Residual coupling flow mapping prior samples to decoder latents.

use candle_core::{Result, Tensor};
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::config::VitsConfig;
use crate::layers::{conv1d, flip_channels, pointwise, same_padding, split_channels};

/// Non-causal WaveNet with gated activations and skip connections.
#[derive(Debug, Clone)]
pub struct WaveNet {
    in_layers: Vec<Conv1d>,
    res_skip_layers: Vec<Conv1d>,
    hidden_size: usize,
}

impl WaveNet {
    pub fn new(config: &VitsConfig, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let kernel_size = config.wavenet_kernel_size;

        let mut in_layers = Vec::with_capacity(num_layers);
        let mut res_skip_layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let dilation = config.wavenet_dilation_rate.pow(i as u32);
            in_layers.push(conv1d(
                hidden,
                2 * hidden,
                kernel_size,
                same_padding(kernel_size, dilation),
                true,
                vb.pp("in_layers").pp(i.to_string()),
            )?);
            let res_skip_channels = if i + 1 < num_layers { 2 * hidden } else { hidden };
            res_skip_layers.push(pointwise(
                hidden,
                res_skip_channels,
                vb.pp("res_skip_layers").pp(i.to_string()),
            )?);
        }

        Ok(Self {
            in_layers,
            res_skip_layers,
            hidden_size: hidden,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        let mut output = x.zeros_like()?;
        let last = self.in_layers.len().saturating_sub(1);

        let layers = self.in_layers.iter().zip(&self.res_skip_layers);
        for (i, (in_layer, res_skip)) in layers.enumerate() {
            let h = in_layer.forward(&x)?;
            let (t, s) = split_channels(&h, self.hidden_size)?;
            let acts = (t.tanh()? * candle_nn::ops::sigmoid(&s)?)?;
            let res_skip_acts = res_skip.forward(&acts)?;

            if i < last {
                let (res, skip) = split_channels(&res_skip_acts, self.hidden_size)?;
                x = (x + res)?;
                output = (output + skip)?;
            } else {
                output = (output + res_skip_acts)?;
            }
        }
        Ok(output)
    }
}

/// Affine coupling layer with a mean-only transform.
#[derive(Debug, Clone)]
struct ResidualCouplingLayer {
    conv_pre: Conv1d,
    wavenet: WaveNet,
    conv_post: Conv1d,
    half_channels: usize,
}

impl ResidualCouplingLayer {
    fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let half_channels = config.flow_size / 2;
        Ok(Self {
            conv_pre: pointwise(half_channels, config.hidden_size, vb.pp("conv_pre"))?,
            wavenet: WaveNet::new(
                config,
                config.prior_encoder_num_wavenet_layers,
                vb.pp("wavenet"),
            )?,
            conv_post: pointwise(config.hidden_size, half_channels, vb.pp("conv_post"))?,
            half_channels,
        })
    }

    fn reverse(&self, x: &Tensor) -> Result<Tensor> {
        let (first, second) = split_channels(x, self.half_channels)?;
        let h = self.conv_pre.forward(&first)?;
        let h = self.wavenet.forward(&h)?;
        let mean = self.conv_post.forward(&h)?;
        let second = (second - mean)?;
        Tensor::cat(&[&first, &second], 1)
    }
}

/// Stack of coupling layers, each followed by a channel flip.
#[derive(Debug, Clone)]
pub struct ResidualCouplingBlock {
    flows: Vec<ResidualCouplingLayer>,
}

impl ResidualCouplingBlock {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("flows");
        let flows = (0..config.prior_encoder_num_flows)
            .map(|i| ResidualCouplingLayer::new(config, vb.pp(i.to_string())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { flows })
    }

    /// Run the flow backwards on `(1, flow_size, frames)` prior samples.
    pub fn reverse(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        for flow in self.flows.iter().rev() {
            x = flow.reverse(&flip_channels(&x)?)?;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_zero_flow_only_flips() {
        let config = VitsConfig {
            hidden_size: 8,
            flow_size: 4,
            prior_encoder_num_flows: 3,
            prior_encoder_num_wavenet_layers: 2,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = ResidualCouplingBlock::new(&config, vb).unwrap();

        let x = Tensor::new(&[[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]]], &Device::Cpu)
            .unwrap();
        let y = block.reverse(&x).unwrap();
        // Three flips of four channels leave them reversed.
        let y: Vec<Vec<f32>> = y.squeeze(0).unwrap().to_vec2().unwrap();
        assert_eq!(y, vec![vec![7.0, 8.0], vec![5.0, 6.0], vec![3.0, 4.0], vec![1.0, 2.0]]);
    }

    #[test]
    fn test_wavenet_keeps_shape() {
        let config = VitsConfig {
            hidden_size: 6,
            wavenet_kernel_size: 5,
            wavenet_dilation_rate: 2,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let wavenet = WaveNet::new(&config, 3, vb).unwrap();

        let x = Tensor::ones((1, 6, 11), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(wavenet.forward(&x).unwrap().dims(), &[1, 6, 11]);
    }
}
