//! Transformer text encoder with windowed relative-position attention.

use candle_core::{Result, Tensor, D};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, LayerNorm, Linear, Module, VarBuilder};
use tracing::debug;

use crate::config::VitsConfig;
use crate::layers::{conv1d, layer_norm, linear, pad_time, pointwise};

/// Multi-head self-attention with learned relative key/value embeddings.
#[derive(Debug, Clone)]
pub struct RelativeAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    emb_rel_k: Option<Tensor>,
    emb_rel_v: Option<Tensor>,
    num_heads: usize,
    head_dim: usize,
    window_size: Option<usize>,
    scaling: f64,
}

impl RelativeAttention {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim();
        let (emb_rel_k, emb_rel_v) = match config.window_size {
            Some(window) => (
                Some(vb.get((1, 2 * window + 1, head_dim), "emb_rel_k")?),
                Some(vb.get((1, 2 * window + 1, head_dim), "emb_rel_v")?),
            ),
            None => (None, None),
        };

        Ok(Self {
            q_proj: linear(hidden, hidden, config.use_bias, vb.pp("q_proj"))?,
            k_proj: linear(hidden, hidden, config.use_bias, vb.pp("k_proj"))?,
            v_proj: linear(hidden, hidden, config.use_bias, vb.pp("v_proj"))?,
            out_proj: linear(hidden, hidden, config.use_bias, vb.pp("out_proj"))?,
            emb_rel_k,
            emb_rel_v,
            num_heads: config.num_attention_heads,
            head_dim,
            window_size: config.window_size,
            scaling: (head_dim as f64).powf(-0.5),
        })
    }

    /// Attend over `(batch, time, hidden)` input.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, len, hidden) = x.dims3()?;
        let heads = batch * self.num_heads;

        let split_heads = |t: Tensor| -> Result<Tensor> {
            t.reshape((batch, len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?
                .reshape((heads, len, self.head_dim))
        };
        let query = split_heads((self.q_proj.forward(x)? * self.scaling)?)?;
        let key = split_heads(self.k_proj.forward(x)?)?;
        let value = split_heads(self.v_proj.forward(x)?)?;

        let mut scores = query.matmul(&key.t()?.contiguous()?)?;
        if let (Some(window), Some(emb_rel_k)) = (self.window_size, &self.emb_rel_k) {
            let rel_k = relative_embeddings(emb_rel_k, window, len)?;
            let rel_logits = query
                .reshape((heads * len, self.head_dim))?
                .matmul(&rel_k.t()?.contiguous()?)?
                .reshape((heads, len, 2 * len - 1))?;
            scores = (scores + relative_to_absolute(&rel_logits)?)?;
        }

        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let mut output = probs.matmul(&value)?;
        if let (Some(window), Some(emb_rel_v)) = (self.window_size, &self.emb_rel_v) {
            let rel_v = relative_embeddings(emb_rel_v, window, len)?;
            let rel_weights = absolute_to_relative(&probs)?;
            let rel_out = rel_weights
                .reshape((heads * len, 2 * len - 1))?
                .matmul(&rel_v)?
                .reshape((heads, len, self.head_dim))?;
            output = (output + rel_out)?;
        }

        let output = output
            .reshape((batch, self.num_heads, len, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, len, hidden))?;
        self.out_proj.forward(&output)
    }
}

/// Slice or zero-pad `(1, 2 * window + 1, dim)` embeddings to the
/// `2 * len - 1` relative offsets of a sequence, returned as `(2 * len - 1, dim)`.
pub fn relative_embeddings(embeddings: &Tensor, window: usize, len: usize) -> Result<Tensor> {
    let pad = len.saturating_sub(window + 1);
    let embeddings = if pad > 0 {
        embeddings.pad_with_zeros(1, pad, pad)?
    } else {
        embeddings.clone()
    };
    let start = (window + 1).saturating_sub(len);
    embeddings.narrow(1, start, 2 * len - 1)?.squeeze(0)?.contiguous()
}

/// Map `(heads, len, 2 * len - 1)` relative logits onto `(heads, len, len)`
/// absolute positions: `out[i][j] = x[i][j - i + len - 1]`.
pub fn relative_to_absolute(x: &Tensor) -> Result<Tensor> {
    let (heads, len, _) = x.dims3()?;
    let x = x.pad_with_zeros(D::Minus1, 0, 1)?;
    let x = x.reshape((heads, len * 2 * len))?;
    let x = pad_time(&x, 0, len - 1)?;
    let x = x.reshape((heads, len + 1, 2 * len - 1))?;
    x.narrow(1, 0, len)?.narrow(2, len - 1, len)?.contiguous()
}

/// Inverse layout of [`relative_to_absolute`]: `(heads, len, len)` absolute
/// weights to `(heads, len, 2 * len - 1)` relative offsets.
pub fn absolute_to_relative(x: &Tensor) -> Result<Tensor> {
    let (heads, len, _) = x.dims3()?;
    let x = pad_time(x, 0, len - 1)?;
    let x = x.reshape((heads, len * (2 * len - 1)))?;
    let x = pad_time(&x, len, 0)?;
    let x = x.reshape((heads, len, 2 * len))?;
    x.narrow(2, 1, 2 * len - 1)?.contiguous()
}

#[derive(Debug, Clone, Copy)]
enum Activation {
    Relu,
    Gelu,
}

/// Convolutional feed-forward block working on `(batch, time, hidden)`.
#[derive(Debug, Clone)]
struct FeedForward {
    conv_1: Conv1d,
    conv_2: Conv1d,
    activation: Activation,
    pad_left: usize,
    pad_right: usize,
}

impl FeedForward {
    fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let k = config.ffn_kernel_size;
        let cfg = Conv1dConfig::default();
        Ok(Self {
            conv_1: conv1d(config.hidden_size, config.ffn_dim, k, cfg, true, vb.pp("conv_1"))?,
            conv_2: conv1d(config.ffn_dim, config.hidden_size, k, cfg, true, vb.pp("conv_2"))?,
            activation: match config.hidden_act.as_str() {
                "gelu" => Activation::Gelu,
                _ => Activation::Relu,
            },
            pad_left: k.saturating_sub(1) / 2,
            pad_right: k / 2,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = x.transpose(1, 2)?.contiguous()?;
        let x = self.conv_1.forward(&pad_time(&x, self.pad_left, self.pad_right)?)?;
        let x = match self.activation {
            Activation::Relu => x.relu()?,
            Activation::Gelu => x.gelu_erf()?,
        };
        let x = self.conv_2.forward(&pad_time(&x, self.pad_left, self.pad_right)?)?;
        x.transpose(1, 2)
    }
}

/// Post-norm transformer layer.
#[derive(Debug, Clone)]
struct EncoderLayer {
    attention: RelativeAttention,
    layer_norm: LayerNorm,
    feed_forward: FeedForward,
    final_layer_norm: LayerNorm,
}

impl EncoderLayer {
    fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: RelativeAttention::new(config, vb.pp("attention"))?,
            layer_norm: layer_norm(config.hidden_size, eps, vb.pp("layer_norm"))?,
            feed_forward: FeedForward::new(config, vb.pp("feed_forward"))?,
            final_layer_norm: layer_norm(config.hidden_size, eps, vb.pp("final_layer_norm"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attn = self.attention.forward(x)?;
        let x = self.layer_norm.forward(&(x + attn)?)?;
        let ff = self.feed_forward.forward(&x)?;
        self.final_layer_norm.forward(&(x + ff)?)
    }
}

/// Output of the text encoder, all channel-first.
#[derive(Debug)]
pub struct EncodedText {
    /// Encoder features, `(1, hidden, tokens)`.
    pub hidden: Tensor,
    /// Prior means, `(1, flow_size, tokens)`.
    pub prior_means: Tensor,
    /// Prior log-variances, `(1, flow_size, tokens)`.
    pub prior_log_variances: Tensor,
}

/// Token embedding, transformer stack and prior projection.
#[derive(Debug, Clone)]
pub struct TextEncoder {
    embed_tokens: Embedding,
    layers: Vec<EncoderLayer>,
    project: Conv1d,
    hidden_size: usize,
    flow_size: usize,
}

impl TextEncoder {
    pub fn new(config: &VitsConfig, vb: VarBuilder) -> Result<Self> {
        let embeddings = vb
            .pp("embed_tokens")
            .get((config.vocab_size, config.hidden_size), "weight")?;
        let embed_tokens = Embedding::new(embeddings, config.hidden_size);

        let vb_layers = vb.pp("encoder").pp("layers");
        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            debug!("Loading encoder layer {}/{}", i + 1, config.num_hidden_layers);
            layers.push(EncoderLayer::new(config, vb_layers.pp(i.to_string()))?);
        }

        let project = pointwise(config.hidden_size, 2 * config.flow_size, vb.pp("project"))?;

        Ok(Self {
            embed_tokens,
            layers,
            project,
            hidden_size: config.hidden_size,
            flow_size: config.flow_size,
        })
    }

    /// Encode `(1, tokens)` ids.
    pub fn forward(&self, input_ids: &Tensor) -> Result<EncodedText> {
        let mut x = (self.embed_tokens.forward(input_ids)? * (self.hidden_size as f64).sqrt())?;
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }

        let hidden = x.transpose(1, 2)?.contiguous()?;
        let stats = self.project.forward(&hidden)?;
        Ok(EncodedText {
            prior_means: stats.narrow(1, 0, self.flow_size)?,
            prior_log_variances: stats.narrow(1, self.flow_size, self.flow_size)?,
            hidden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn grid(len: usize, width: usize) -> Tensor {
        let data: Vec<f32> = (0..len * width).map(|i| (i + 1) as f32).collect();
        Tensor::from_vec(data, (1, len, width), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_relative_to_absolute_layout() {
        let len = 3;
        let x = grid(len, 2 * len - 1);
        let out = relative_to_absolute(&x).unwrap();
        assert_eq!(out.dims(), &[1, len, len]);

        let x: Vec<Vec<f32>> = x.squeeze(0).unwrap().to_vec2().unwrap();
        let out: Vec<Vec<f32>> = out.squeeze(0).unwrap().to_vec2().unwrap();
        for i in 0..len {
            for j in 0..len {
                assert_eq!(out[i][j], x[i][j + len - 1 - i]);
            }
        }
    }

    #[test]
    fn test_absolute_to_relative_layout() {
        let len = 3;
        let x = grid(len, len);
        let out = absolute_to_relative(&x).unwrap();
        assert_eq!(out.dims(), &[1, len, 2 * len - 1]);

        let x: Vec<Vec<f32>> = x.squeeze(0).unwrap().to_vec2().unwrap();
        let out: Vec<Vec<f32>> = out.squeeze(0).unwrap().to_vec2().unwrap();
        for i in 0..len {
            for c in 0..2 * len - 1 {
                let j = (c + i) as isize - (len as isize - 1);
                let expected = if (0..len as isize).contains(&j) {
                    x[i][j as usize]
                } else {
                    0.0
                };
                assert_eq!(out[i][c], expected, "row {i} offset {c}");
            }
        }
    }

    #[test]
    fn test_relative_embeddings_short_and_long() {
        let window = 2;
        let emb = grid(2 * window + 1, 1);

        let short: Vec<f32> = relative_embeddings(&emb, window, 2)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(short, vec![2.0, 3.0, 4.0]);

        let long: Vec<f32> = relative_embeddings(&emb, window, 5)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(long, vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_text_encoder_shapes() {
        let config = VitsConfig {
            vocab_size: 10,
            hidden_size: 8,
            num_hidden_layers: 2,
            num_attention_heads: 2,
            window_size: Some(2),
            ffn_dim: 16,
            flow_size: 4,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = TextEncoder::new(&config, vb).unwrap();

        let ids = Tensor::new(&[[0u32, 3, 0, 5, 0]], &Device::Cpu).unwrap();
        let encoded = encoder.forward(&ids).unwrap();
        assert_eq!(encoded.hidden.dims(), &[1, 8, 5]);
        assert_eq!(encoded.prior_means.dims(), &[1, 4, 5]);
        assert_eq!(encoded.prior_log_variances.dims(), &[1, 4, 5]);
    }
}
