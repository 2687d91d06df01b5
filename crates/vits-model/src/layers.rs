//! Building blocks shared by the VITS sub-networks.

use candle_core::{Result, Tensor, D};
use candle_nn::{
    Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig, LayerNorm, Linear, Module,
    VarBuilder,
};

/// Load a convolution weight, folding weight normalization if the checkpoint
/// stores it in either of the PyTorch layouts.
pub fn load_conv_weight(vb: &VarBuilder, shape: (usize, usize, usize)) -> Result<Tensor> {
    let (g_name, v_name) = if vb.contains_tensor("weight_g") {
        ("weight_g", "weight_v")
    } else if vb.contains_tensor("parametrizations.weight.original0") {
        (
            "parametrizations.weight.original0",
            "parametrizations.weight.original1",
        )
    } else {
        return vb.get(shape, "weight");
    };

    let g = vb.get((shape.0, 1, 1), g_name)?;
    let v = vb.get(shape, v_name)?;
    fold_weight_norm(&g, &v)
}

/// `g * v / ||v||`, with the norm taken over every dimension but the first.
pub fn fold_weight_norm(g: &Tensor, v: &Tensor) -> Result<Tensor> {
    let norm = v.sqr()?.sum_keepdim(2)?.sum_keepdim(1)?.sqrt()?;
    v.broadcast_mul(&g.broadcast_div(&norm)?)
}

/// 1D convolution loaded from `vb`.
pub fn conv1d(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    config: Conv1dConfig,
    bias: bool,
    vb: VarBuilder,
) -> Result<Conv1d> {
    let weight = load_conv_weight(
        &vb,
        (out_channels, in_channels / config.groups, kernel_size),
    )?;
    let bias = if bias {
        Some(vb.get(out_channels, "bias")?)
    } else {
        None
    };
    Ok(Conv1d::new(weight, bias, config))
}

/// Pointwise (kernel size 1) convolution with bias.
pub fn pointwise(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Conv1d> {
    conv1d(in_channels, out_channels, 1, Conv1dConfig::default(), true, vb)
}

/// Convolution config keeping the sequence length for odd kernels.
pub fn same_padding(kernel_size: usize, dilation: usize) -> Conv1dConfig {
    Conv1dConfig {
        padding: kernel_size.saturating_sub(1) * dilation / 2,
        dilation,
        ..Default::default()
    }
}

/// Transposed 1D convolution with bias.
pub fn conv_transpose1d(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    config: ConvTranspose1dConfig,
    vb: VarBuilder,
) -> Result<ConvTranspose1d> {
    let weight = load_conv_weight(&vb, (in_channels, out_channels, kernel_size))?;
    let bias = vb.get(out_channels, "bias")?;
    Ok(ConvTranspose1d::new(weight, Some(bias), config))
}

/// Linear projection, optionally without bias.
pub fn linear(in_dim: usize, out_dim: usize, bias: bool, vb: VarBuilder) -> Result<Linear> {
    let weight = vb.get((out_dim, in_dim), "weight")?;
    let bias = if bias {
        Some(vb.get(out_dim, "bias")?)
    } else {
        None
    };
    Ok(Linear::new(weight, bias))
}

/// Layer norm over the last dimension.
pub fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> Result<LayerNorm> {
    let weight = vb.get(size, "weight")?;
    let bias = vb.get(size, "bias")?;
    Ok(LayerNorm::new(weight, bias, eps))
}

/// Apply a layer norm to a `(batch, channels, time)` tensor.
pub fn channel_norm(norm: &LayerNorm, x: &Tensor) -> Result<Tensor> {
    norm.forward(&x.transpose(1, 2)?)?.transpose(1, 2)
}

/// Leaky ReLU with the given negative slope.
pub fn leaky_relu(x: &Tensor, slope: f64) -> Result<Tensor> {
    x.maximum(&(x * slope)?)
}

/// Reverse the order of the channel dimension of a `(batch, channels, time)` tensor.
pub fn flip_channels(x: &Tensor) -> Result<Tensor> {
    let channels = x.dim(1)?;
    let index: Vec<u32> = (0..channels as u32).rev().collect();
    let index = Tensor::new(index.as_slice(), x.device())?;
    x.index_select(&index, 1)
}

/// Split `(batch, channels, time)` into the first and second channel halves.
pub fn split_channels(x: &Tensor, first: usize) -> Result<(Tensor, Tensor)> {
    let channels = x.dim(1)?;
    Ok((x.narrow(1, 0, first)?, x.narrow(1, first, channels - first)?))
}

/// Pad the time axis on both sides.
pub fn pad_time(x: &Tensor, left: usize, right: usize) -> Result<Tensor> {
    if left == 0 && right == 0 {
        return Ok(x.clone());
    }
    x.pad_with_zeros(D::Minus1, left, right)
}
