//! Train subcommand - full training pipeline
//!
//! Load traces, split, fit the VAE, then export the checkpoint, loss curve,
//! per-trace embeddings, and the effective hyperparameters.

use std::path::PathBuf;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use clap::Args;

use tracevae_core::{seed_weights, LossType, LrSchedule, TraceVae, TrainConfig};
use tracevae_optimizer::{Adam, AdamConfig};
use tracevae_training::{ArtifactWriter, TraceMatrix, Trainer};

#[derive(Args)]
pub struct TrainArgs {
    /// Path to the trace matrix (delimited text, .gz supported); one trace per row
    #[arg(long)]
    pub data: PathBuf,

    /// Dimension of the latent space
    #[arg(long, default_value = "4")]
    pub latent: usize,

    /// Dimension of the hidden layer
    #[arg(long, default_value = "64")]
    pub hidden: usize,

    /// Number of training epochs
    #[arg(long, default_value = "200")]
    pub epochs: usize,

    /// Batch size
    #[arg(long, default_value = "32")]
    pub batch_size: usize,

    /// Learning rate
    #[arg(long, default_value = "0.005")]
    pub learning_rate: f64,

    /// Weight on the KL divergence term
    #[arg(long, default_value = "1.0")]
    pub beta_kl: f64,

    /// RNG seed (weight init, split, shuffling, sampling noise)
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Early-stopping patience in epochs
    #[arg(long, default_value = "10")]
    pub patience: usize,

    /// Minimum validation-loss drop that counts as an improvement
    #[arg(long, default_value = "0.001")]
    pub min_delta: f32,

    /// Reconstruction loss: squared-error or absolute-error
    #[arg(long, default_value = "squared-error")]
    pub loss_type: String,

    /// Min-max normalize the traces to [-0.5, 0.5]
    #[arg(long)]
    pub normalize: bool,

    /// Retrain even if a checkpoint already exists in --outdir
    #[arg(long)]
    pub retrain: bool,

    /// Learning-rate schedule: step or exponential
    #[arg(long, default_value = "step")]
    pub schedule: String,

    /// Multiplicative decay factor for the schedule
    #[arg(long, default_value = "0.5")]
    pub gamma: f64,

    /// Epochs between decays (step schedule only)
    #[arg(long, default_value = "10")]
    pub step_size: usize,

    /// Maximum gradient norm for clipping
    #[arg(long, default_value = "1.0")]
    pub max_grad_norm: f64,

    /// Fraction of rows held out for validation
    #[arg(long, default_value = "0.2")]
    pub val_fraction: f64,

    /// Output directory for model, losses, embeddings, hyperparameters
    #[arg(long, default_value = "sndgm")]
    pub outdir: PathBuf,
}

impl TrainArgs {
    fn to_config(&self) -> Result<TrainConfig> {
        let loss_type: LossType = self.loss_type.parse()?;
        let schedule = match self.schedule.as_str() {
            "step" => LrSchedule::Step {
                step_size: self.step_size,
                gamma: self.gamma,
            },
            "exponential" => LrSchedule::Exponential { gamma: self.gamma },
            other => anyhow::bail!("unknown schedule {other:?} (expected step or exponential)"),
        };
        Ok(TrainConfig {
            latent_dim: self.latent,
            hidden_dim: self.hidden,
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            beta_kl: self.beta_kl,
            seed: self.seed,
            patience: self.patience,
            min_delta: self.min_delta,
            loss_type,
            normalize: self.normalize,
            retrain: self.retrain,
            max_grad_norm: self.max_grad_norm,
            val_fraction: self.val_fraction,
            schedule,
        })
    }
}

pub fn run(args: TrainArgs) -> Result<()> {
    let config = args.to_config()?;
    config.validate()?;

    let writer = ArtifactWriter::new(&args.outdir)?;
    if writer.model_path().exists() && !config.retrain {
        println!(
            "checkpoint {} already exists, skipping training (pass --retrain to overwrite)",
            writer.model_path().display()
        );
        return Ok(());
    }

    println!("Loading traces from {}", args.data.display());
    let mut traces = TraceMatrix::load(&args.data)?;
    anyhow::ensure!(traces.rows() >= 2, "need at least two traces to train");
    if config.normalize {
        traces.normalize();
    }
    let input_dim = traces.cols();
    println!("  {} traces of length {}", traces.rows(), input_dim);

    let (train_data, val_data) = traces.split(config.val_fraction, config.seed);
    println!(
        "  split: {} train / {} validation",
        train_data.rows(),
        val_data.rows()
    );

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = TraceVae::new(input_dim, config.hidden_dim, config.latent_dim, vb)?;
    seed_weights(&varmap, config.seed)?;

    let mut optimizer = Adam::new(AdamConfig {
        lr: config.learning_rate,
        max_grad_norm: Some(config.max_grad_norm),
        ..Default::default()
    });

    println!(
        "Training: {} epochs, batch {}, lr {}, beta {}",
        config.epochs, config.batch_size, config.learning_rate, config.beta_kl
    );
    let trainer =
        Trainer::new(config.clone(), device.clone()).with_checkpoint(writer.model_path());
    let metrics = trainer.train(&model, &varmap, &mut optimizer, &train_data, &val_data)?;

    println!("Saving model");
    writer.write_model(&varmap)?;

    println!("Saving losses");
    writer.write_losses(&metrics)?;

    println!("Saving embeddings");
    let embeddings = compute_embeddings(&model, &traces, config.batch_size, &device)?;
    writer.write_embeddings(&embeddings)?;

    println!("Saving hyperparameters");
    writer.write_hyperparameters(&config, input_dim)?;

    println!("Training completed");
    Ok(())
}

/// Posterior means for every trace, batch by batch, in input order.
pub(crate) fn compute_embeddings(
    model: &TraceVae,
    data: &TraceMatrix,
    batch_size: usize,
    device: &Device,
) -> Result<Tensor> {
    let indices: Vec<usize> = (0..data.rows()).collect();
    let mut chunks = Vec::new();
    for chunk in indices.chunks(batch_size) {
        let x = data.batch_tensor(chunk, device)?;
        chunks.push(model.embed(&x)?);
    }
    Ok(Tensor::cat(&chunks, 0)?)
}
