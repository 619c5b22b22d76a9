use std::collections::HashMap;

use candle_core::{Result, Tensor, Var};
use candle_nn::VarMap;

#[derive(Debug, Clone)]
pub struct AdamConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    /// Cap on the global L2 norm of all gradients, applied before the update.
    pub max_grad_norm: Option<f64>,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 0.005,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-6,
            weight_decay: 0.0,
            max_grad_norm: Some(1.0),
        }
    }
}

pub struct Adam {
    config: AdamConfig,
    lr: f64,

    // State for each parameter
    state: HashMap<String, ParamState>,
}

struct ParamState {
    m: Tensor, // First moment
    v: Tensor, // Second moment
    step: usize,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        let lr = config.lr;
        Self {
            config,
            lr,
            state: HashMap::new(),
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Lets the trainer apply its learning-rate schedule.
    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Runs backward on `loss`, clips the global gradient norm, and applies
    /// one Adam update to every var in the map. Returns the pre-clip norm.
    pub fn backward_step(&mut self, loss: &Tensor, varmap: &VarMap) -> Result<f64> {
        let named: Vec<(String, Var)> = {
            let data = varmap.data().lock().unwrap();
            data.iter().map(|(n, v)| (n.clone(), v.clone())).collect()
        };

        let grads = loss.backward()?;

        let mut sq_sum = 0f64;
        for (_, var) in &named {
            if let Some(grad) = grads.get(var.as_tensor()) {
                sq_sum += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
            }
        }
        let total_norm = sq_sum.sqrt();
        let clip_scale = match self.config.max_grad_norm {
            Some(max) if total_norm > max => Some(max / (total_norm + 1e-6)),
            _ => None,
        };

        for (name, var) in &named {
            let Some(grad) = grads.get(var.as_tensor()) else {
                continue;
            };
            let grad = match clip_scale {
                Some(scale) => (grad * scale)?,
                None => grad.clone(),
            };
            let grad = if self.config.weight_decay > 0.0 {
                (&grad + (var.as_tensor() * self.config.weight_decay)?)?
            } else {
                grad
            };
            self.update_param(name, var, &grad)?;
        }

        Ok(total_norm)
    }

    fn update_param(&mut self, name: &str, var: &Var, grad: &Tensor) -> Result<()> {
        if !self.state.contains_key(name) {
            self.state.insert(
                name.to_string(),
                ParamState {
                    m: var.as_tensor().zeros_like()?,
                    v: var.as_tensor().zeros_like()?,
                    step: 0,
                },
            );
        }
        let state = self.state.get_mut(name).unwrap();
        state.step += 1;

        let b1 = self.config.beta1;
        let b2 = self.config.beta2;
        state.m = ((&state.m * b1)? + (grad * (1.0 - b1))?)?;
        state.v = ((&state.v * b2)? + (grad.sqr()? * (1.0 - b2))?)?;

        // Bias corrections
        let bias_correction1 = 1.0 - b1.powi(state.step as i32);
        let bias_correction2 = 1.0 - b2.powi(state.step as i32);
        let m_hat = (&state.m / bias_correction1)?;
        let v_hat = (&state.v / bias_correction2)?;

        let denom = (v_hat.sqrt()? + self.config.eps)?;
        let update = ((m_hat / denom)? * self.lr)?;
        var.set(&(var.as_tensor() - update)?)?;
        Ok(())
    }
}
