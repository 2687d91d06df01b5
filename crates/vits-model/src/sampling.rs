//! Gaussian noise for the stochastic parts of inference.

use candle_core::{Device, Result, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Seedable source of standard-normal noise tensors.
#[derive(Debug)]
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    /// Seeded source, or one seeded from the OS when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// `scale * N(0, 1)` samples with shape `(batch, channels, time)`.
    pub fn normal(
        &mut self,
        shape: (usize, usize, usize),
        scale: f32,
        device: &Device,
    ) -> Result<Tensor> {
        let count = shape.0 * shape.1 * shape.2;
        let data: Vec<f32> = (0..count)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal) * scale)
            .collect();
        Tensor::from_vec(data, shape, device)
    }
}
