//! Training configuration
//!
//! Parsed once at startup, validated, then passed immutably into the trainer.
//! Defaults follow the reference command line for this pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaeError};

/// Form of the elementwise reconstruction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LossType {
    SquaredError,
    AbsoluteError,
}

impl std::str::FromStr for LossType {
    type Err = VaeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "squared-error" | "mse" => Ok(LossType::SquaredError),
            "absolute-error" | "mae" => Ok(LossType::AbsoluteError),
            other => Err(VaeError::Config(format!("unknown loss type {other:?}"))),
        }
    }
}

/// Time-based learning-rate decay policy, independent of the loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum LrSchedule {
    /// lr(epoch) = base * gamma^epoch
    Exponential { gamma: f64 },
    /// lr(epoch) = base * gamma^(epoch / step_size)
    Step { step_size: usize, gamma: f64 },
}

impl LrSchedule {
    pub fn lr_for_epoch(&self, base_lr: f64, epoch: usize) -> f64 {
        match self {
            LrSchedule::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),
            LrSchedule::Step { step_size, gamma } => {
                base_lr * gamma.powi((epoch / step_size) as i32)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let gamma = match self {
            LrSchedule::Exponential { gamma } => *gamma,
            LrSchedule::Step { step_size, gamma } => {
                if *step_size == 0 {
                    return Err(VaeError::Config("step_size must be positive".into()));
                }
                *gamma
            }
        };
        if gamma <= 0.0 || gamma > 1.0 {
            return Err(VaeError::Config(format!(
                "schedule gamma must be in (0, 1], got {gamma}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub latent_dim: usize,
    pub hidden_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Weight on the KL term; 0 disables the information bottleneck.
    pub beta_kl: f64,
    /// Single seed driving weight init, the train/val split, batch shuffling,
    /// and reparameterization noise.
    pub seed: u64,
    pub patience: usize,
    pub min_delta: f32,
    pub loss_type: LossType,
    /// Min-max normalize traces to [-0.5, 0.5] before training.
    pub normalize: bool,
    /// Train even if a checkpoint already exists in the output directory.
    pub retrain: bool,
    /// Global gradient-norm cap applied every optimizer step.
    pub max_grad_norm: f64,
    /// Fraction of rows held out for validation.
    pub val_fraction: f64,
    pub schedule: LrSchedule,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            latent_dim: 4,
            hidden_dim: 64,
            epochs: 200,
            batch_size: 32,
            learning_rate: 0.005,
            beta_kl: 1.0,
            seed: 0,
            patience: 10,
            min_delta: 0.001,
            loss_type: LossType::SquaredError,
            normalize: false,
            retrain: false,
            max_grad_norm: 1.0,
            val_fraction: 0.2,
            schedule: LrSchedule::Step {
                step_size: 10,
                gamma: 0.5,
            },
        }
    }
}

impl TrainConfig {
    /// Rejects invalid hyperparameters before any compute begins.
    pub fn validate(&self) -> Result<()> {
        if self.latent_dim == 0 {
            return Err(VaeError::Config("latent_dim must be positive".into()));
        }
        if self.hidden_dim == 0 {
            return Err(VaeError::Config("hidden_dim must be positive".into()));
        }
        if self.epochs == 0 {
            return Err(VaeError::Config("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(VaeError::Config("batch_size must be positive".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(VaeError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.beta_kl < 0.0 {
            return Err(VaeError::Config(format!(
                "beta_kl must be non-negative, got {}",
                self.beta_kl
            )));
        }
        if self.patience == 0 {
            return Err(VaeError::Config("patience must be positive".into()));
        }
        if self.min_delta < 0.0 {
            return Err(VaeError::Config(format!(
                "min_delta must be non-negative, got {}",
                self.min_delta
            )));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(VaeError::Config(format!(
                "max_grad_norm must be positive, got {}",
                self.max_grad_norm
            )));
        }
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(VaeError::Config(format!(
                "val_fraction must be in (0, 1), got {}",
                self.val_fraction
            )));
        }
        self.schedule.validate()
    }
}
