//! Seeded randomness
//!
//! Candle's CPU device RNG cannot be seeded, so every stochastic ingredient
//! of a run (reparameterization noise, weight init) draws from an explicit
//! `StdRng` instead. One seed reproduces a whole training run.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::Result;

/// A seeded source of standard-normal tensors, injected into the sampling
/// step so tests can reproduce (or zero out) the noise.
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws a fresh (rows, cols) tensor of N(0, 1) samples.
    pub fn standard_normal(&mut self, shape: (usize, usize), device: &Device) -> Result<Tensor> {
        let (rows, cols) = shape;
        let data: Vec<f32> = (0..rows * cols)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect();
        Ok(Tensor::from_vec(data, shape, device)?)
    }
}

/// Re-draws every weight matrix in the varmap from a seeded uniform
/// distribution with the usual 1/sqrt(fan_in) bound; bias vectors are zeroed.
/// Vars are visited in name order so the draw sequence is stable.
pub fn seed_weights(varmap: &VarMap, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vars: Vec<_> = {
        let data = varmap.data().lock().unwrap();
        data.iter().map(|(n, v)| (n.clone(), v.clone())).collect()
    };
    vars.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, var) in &vars {
        let dims = var.as_tensor().dims().to_vec();
        let device = var.as_tensor().device().clone();
        match dims.as_slice() {
            [out, fan_in] => {
                let bound = 1.0 / (*fan_in as f64).sqrt();
                let data: Vec<f32> = (0..out * fan_in)
                    .map(|_| rng.gen_range(-bound..bound) as f32)
                    .collect();
                var.set(&Tensor::from_vec(data, (*out, *fan_in), &device)?)?;
            }
            _ => {
                var.set(&Tensor::zeros(dims.as_slice(), DType::F32, &device)?)?;
            }
        }
    }
    Ok(())
}
