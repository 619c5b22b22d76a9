//! Training orchestration
//!
//! Epoch loop: shuffled mini-batches with clipped Adam steps, a full-batch
//! validation pass, time-based learning-rate decay, and early stopping on the
//! validation loss. Non-finite losses abort the run immediately; the last
//! improvement checkpoint (if any) stays on disk.

use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use candle_nn::VarMap;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use tracevae_core::{LossEvaluator, NoiseSource, TraceVae, TrainConfig, VaeError};
use tracevae_optimizer::Adam;

use crate::dataset::TraceMatrix;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub train_rec_loss: f32,
    pub train_kl_loss: f32,
    pub lr: f64,
}

/// Which terminal path ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EarlyStopped { epoch: usize },
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    /// Append-only loss curve, one entry per completed epoch.
    pub epochs: Vec<EpochMetrics>,
    pub stop: StopReason,
}

/// Outcome of feeding one validation loss to the early-stopping tracker.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub improved: bool,
    pub halt: bool,
}

/// Validation-loss tracker: improvement means dropping below the best seen
/// loss by more than `min_delta`; `patience` consecutive non-improvements
/// halt the run.
#[derive(Debug)]
pub struct EarlyStopping {
    best: f32,
    counter: usize,
    patience: usize,
    min_delta: f32,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            best: f32::INFINITY,
            counter: 0,
            patience,
            min_delta,
        }
    }

    pub fn observe(&mut self, val_loss: f32) -> Observation {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.counter = 0;
            Observation {
                improved: true,
                halt: false,
            }
        } else {
            self.counter += 1;
            Observation {
                improved: false,
                halt: self.counter >= self.patience,
            }
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

pub struct Trainer {
    config: TrainConfig,
    device: Device,
    checkpoint_path: Option<PathBuf>,
}

impl Trainer {
    pub fn new(config: TrainConfig, device: Device) -> Self {
        Self {
            config,
            device,
            checkpoint_path: None,
        }
    }

    /// Save the parameters to `path` every time the validation loss improves.
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }

    pub fn train(
        &self,
        model: &TraceVae,
        varmap: &VarMap,
        optimizer: &mut Adam,
        train_data: &TraceMatrix,
        val_data: &TraceMatrix,
    ) -> Result<TrainingMetrics> {
        let evaluator = LossEvaluator::new(self.config.loss_type, self.config.beta_kl);
        let mut noise = NoiseSource::seeded(self.config.seed.wrapping_add(1));
        let mut shuffle_rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(2));
        let mut stopper = EarlyStopping::new(self.config.patience, self.config.min_delta);

        // Validation is one forward pass over the whole held-out set.
        let x_val = val_data.to_tensor(&self.device)?;

        let mut indices: Vec<usize> = (0..train_data.rows()).collect();
        let num_batches = (indices.len() + self.config.batch_size - 1) / self.config.batch_size;
        let mut metrics = TrainingMetrics {
            epochs: Vec::new(),
            stop: StopReason::Exhausted,
        };

        for epoch in 0..self.config.epochs {
            let lr = self
                .config
                .schedule
                .lr_for_epoch(self.config.learning_rate, epoch);
            optimizer.set_lr(lr);

            indices.shuffle(&mut shuffle_rng);

            let pb = ProgressBar::new(num_batches as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap(),
            );

            let mut running_loss = 0f64;
            let mut running_rec_loss = 0f64;
            let mut running_kl_loss = 0f64;

            for chunk in indices.chunks(self.config.batch_size) {
                let x = train_data.batch_tensor(chunk, &self.device)?;
                let (xhat, mu, logvar) = model.forward(&x, &mut noise)?;
                let (loss, terms) = evaluator.evaluate(&xhat, &x, &mu, &logvar)?;
                if !terms.is_finite() {
                    return Err(VaeError::NonFiniteLoss {
                        epoch,
                        value: terms.total,
                    }
                    .into());
                }
                optimizer.backward_step(&loss, varmap)?;

                running_loss += terms.total as f64;
                running_rec_loss += terms.reconstruction as f64;
                running_kl_loss += terms.kl as f64;
                pb.set_message(format!("loss: {:.4}", terms.total));
                pb.inc(1);
            }
            pb.finish_and_clear();

            let train_loss = (running_loss / num_batches as f64) as f32;
            let train_rec_loss = (running_rec_loss / num_batches as f64) as f32;
            let train_kl_loss = (running_kl_loss / num_batches as f64) as f32;

            let (xhat, mu, logvar) = model.forward(&x_val, &mut noise)?;
            let (_, val_terms) = evaluator.evaluate(&xhat, &x_val, &mu, &logvar)?;
            if !val_terms.is_finite() {
                return Err(VaeError::NonFiniteLoss {
                    epoch,
                    value: val_terms.total,
                }
                .into());
            }

            metrics.epochs.push(EpochMetrics {
                epoch,
                train_loss,
                val_loss: val_terms.total,
                train_rec_loss,
                train_kl_loss,
                lr,
            });

            println!(
                "[epoch {}/{}] train: {:.4}  val: {:.4}  rec: {:.4}  kl: {:.4}  lr: {:.5}",
                epoch + 1,
                self.config.epochs,
                train_loss,
                val_terms.total,
                train_rec_loss,
                train_kl_loss,
                lr
            );

            let observation = stopper.observe(val_terms.total);
            if observation.improved {
                if let Some(path) = &self.checkpoint_path {
                    varmap.save(path)?;
                }
            }
            if observation.halt {
                println!("early stopping triggered at epoch {}", epoch + 1);
                metrics.stop = StopReason::EarlyStopped { epoch };
                break;
            }
        }

        Ok(metrics)
    }
}
