//! Trace VAE
//!
//! Encoder: gated summarizer input_dim -> hidden_dim, then independent linear
//! heads for the posterior mean and log-variance. Decoder: linear
//! latent_dim -> hidden_dim, then a gated unit back to input_dim. The
//! original pipeline ran a length-1 LSTM step here; from a zero initial state
//! that recurrence collapses to a single gated transform of the input, which
//! is what `GatedUnit` computes.

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use crate::error::{Result, VaeError};
use crate::noise::NoiseSource;

/// One-step gated unit: h = (1 - sigmoid(Wz x + bz)) * tanh(Wc x + bc).
struct GatedUnit {
    update: Linear,
    candidate: Linear,
}

impl GatedUnit {
    fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            update: linear(in_dim, out_dim, vb.pp("update"))?,
            candidate: linear(in_dim, out_dim, vb.pp("candidate"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let z = candle_nn::ops::sigmoid(&self.update.forward(x)?)?;
        let c = self.candidate.forward(x)?.tanh()?;
        let keep = z.affine(-1.0, 1.0)?;
        Ok((keep * c)?)
    }
}

pub struct TraceVae {
    input_dim: usize,
    latent_dim: usize,
    encoder: GatedUnit,
    fc_mu: Linear,
    fc_logvar: Linear,
    decoder_fc: Linear,
    decoder_out: GatedUnit,
}

impl TraceVae {
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        latent_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let encoder = GatedUnit::new(input_dim, hidden_dim, vb.pp("encoder"))?;
        let fc_mu = linear(hidden_dim, latent_dim, vb.pp("fc_mu"))?;
        let fc_logvar = linear(hidden_dim, latent_dim, vb.pp("fc_logvar"))?;
        let decoder_fc = linear(latent_dim, hidden_dim, vb.pp("decoder_fc"))?;
        let decoder_out = GatedUnit::new(hidden_dim, input_dim, vb.pp("decoder_out"))?;

        Ok(Self {
            input_dim,
            latent_dim,
            encoder,
            fc_mu,
            fc_logvar,
            decoder_fc,
            decoder_out,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn check_width(&self, x: &Tensor, what: &'static str, expected: usize) -> Result<()> {
        let (_rows, cols) = x.dims2()?;
        if cols != expected {
            return Err(VaeError::ShapeMismatch {
                what,
                got: cols,
                expected,
            });
        }
        Ok(())
    }

    /// Maps a (batch, input_dim) tensor to the posterior parameters
    /// (mu, logvar), each of shape (batch, latent_dim).
    pub fn encode(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        self.check_width(x, "encoder input", self.input_dim)?;
        let h = self.encoder.forward(x)?;
        let mu = self.fc_mu.forward(&h)?;
        let logvar = self.fc_logvar.forward(&h)?;
        Ok((mu, logvar))
    }

    /// Reparameterized draw from the posterior. The only stochastic step in
    /// the forward pass; consumes one draw from the injected noise source.
    pub fn sample(&self, mu: &Tensor, logvar: &Tensor, noise: &mut NoiseSource) -> Result<Tensor> {
        let eps = noise.standard_normal(mu.dims2()?, mu.device())?;
        self.sample_with(mu, logvar, &eps)
    }

    /// z = mu + exp(0.5 * logvar) * eps, with caller-supplied noise.
    pub fn sample_with(&self, mu: &Tensor, logvar: &Tensor, eps: &Tensor) -> Result<Tensor> {
        let std = (logvar * 0.5)?.exp()?;
        Ok((mu + (std * eps)?)?)
    }

    /// Maps a (batch, latent_dim) code back to a (batch, input_dim) trace.
    pub fn decode(&self, z: &Tensor) -> Result<Tensor> {
        self.check_width(z, "decoder input", self.latent_dim)?;
        let h = self.decoder_fc.forward(z)?;
        self.decoder_out.forward(&h)
    }

    /// encode -> sample -> decode. Pure given the noise draw; no caching.
    pub fn forward(&self, x: &Tensor, noise: &mut NoiseSource) -> Result<(Tensor, Tensor, Tensor)> {
        let (mu, logvar) = self.encode(x)?;
        let z = self.sample(&mu, &logvar, noise)?;
        let xhat = self.decode(&z)?;
        Ok((xhat, mu, logvar))
    }

    /// Posterior mean only; the exported embedding of a batch of traces.
    pub fn embed(&self, x: &Tensor) -> Result<Tensor> {
        let (mu, _logvar) = self.encode(x)?;
        Ok(mu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::seed_weights;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn build(input_dim: usize, hidden_dim: usize, latent_dim: usize, seed: u64) -> TraceVae {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = TraceVae::new(input_dim, hidden_dim, latent_dim, vb).unwrap();
        seed_weights(&varmap, seed).unwrap();
        model
    }

    #[test]
    fn forward_preserves_input_shape() {
        let model = build(8, 6, 2, 7);
        let mut noise = NoiseSource::seeded(1);
        let x = noise.standard_normal((3, 8), &Device::Cpu).unwrap();

        let (xhat, mu, logvar) = model.forward(&x, &mut noise).unwrap();
        assert_eq!(xhat.dims2().unwrap(), (3, 8));
        assert_eq!(mu.dims2().unwrap(), (3, 2));
        assert_eq!(logvar.dims2().unwrap(), (3, 2));
    }

    #[test]
    fn encode_rejects_wrong_width() {
        let model = build(8, 6, 2, 7);
        let mut noise = NoiseSource::seeded(1);
        let x = noise.standard_normal((3, 5), &Device::Cpu).unwrap();

        match model.encode(&x) {
            Err(VaeError::ShapeMismatch { got, expected, .. }) => {
                assert_eq!(got, 5);
                assert_eq!(expected, 8);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_wrong_width() {
        let model = build(8, 6, 2, 7);
        let mut noise = NoiseSource::seeded(1);
        let z = noise.standard_normal((3, 3), &Device::Cpu).unwrap();
        assert!(matches!(
            model.decode(&z),
            Err(VaeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn zero_noise_returns_the_mean() {
        let model = build(8, 6, 2, 7);
        let mut noise = NoiseSource::seeded(1);
        let x = noise.standard_normal((4, 8), &Device::Cpu).unwrap();

        let (mu, logvar) = model.encode(&x).unwrap();
        let eps = mu.zeros_like().unwrap();
        let z = model.sample_with(&mu, &logvar, &eps).unwrap();
        assert_eq!(
            z.to_vec2::<f32>().unwrap(),
            mu.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn seeded_builds_are_reproducible() {
        let a = build(8, 6, 2, 7);
        let b = build(8, 6, 2, 7);
        let mut noise = NoiseSource::seeded(3);
        let x = noise.standard_normal((2, 8), &Device::Cpu).unwrap();

        let mu_a = a.embed(&x).unwrap().to_vec2::<f32>().unwrap();
        let mu_b = b.embed(&x).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(mu_a, mu_b);
    }
}
