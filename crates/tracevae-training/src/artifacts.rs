//! Artifact export
//!
//! Everything a finished run leaves behind: safetensors checkpoint, gzipped
//! TSV loss curve and embedding matrix, and a JSON hyperparameter record that
//! doubles as the checkpoint's schema (readers validate dimensions against it
//! before touching the tensor file).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Tensor;
use candle_nn::VarMap;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use tracevae_core::TrainConfig;

use crate::trainer::TrainingMetrics;

pub const MODEL_FILE: &str = "vae.safetensors";
pub const LOSSES_FILE: &str = "losses.txt.gz";
pub const EMBEDDINGS_FILE: &str = "embeddings.txt.gz";
pub const HYPERPARAMETERS_FILE: &str = "hyperparameters.json";

pub const SCHEMA_VERSION: u32 = 1;

/// Effective configuration of a run plus the data-derived input width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparameterRecord {
    pub schema_version: u32,
    pub input_dim: usize,
    #[serde(flatten)]
    pub config: TrainConfig,
}

pub struct ArtifactWriter {
    outdir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(outdir: impl Into<PathBuf>) -> Result<Self> {
        let outdir = outdir.into();
        fs::create_dir_all(&outdir)
            .with_context(|| format!("failed to create output directory {}", outdir.display()))?;
        Ok(Self { outdir })
    }

    pub fn model_path(&self) -> PathBuf {
        self.outdir.join(MODEL_FILE)
    }

    pub fn write_model(&self, varmap: &VarMap) -> Result<()> {
        varmap
            .save(self.model_path())
            .with_context(|| format!("failed to write {}", self.model_path().display()))?;
        Ok(())
    }

    pub fn write_losses(&self, metrics: &TrainingMetrics) -> Result<()> {
        let mut writer = self.gz_writer(LOSSES_FILE)?;
        writeln!(writer, "train_loss\tval_loss\ttrain_rec_loss\ttrain_kl_loss")?;
        for epoch in &metrics.epochs {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                epoch.train_loss, epoch.val_loss, epoch.train_rec_loss, epoch.train_kl_loss
            )?;
        }
        writer.finish()?;
        Ok(())
    }

    /// Writes the (samples, latent_dim) embedding matrix as headerless TSV,
    /// row-aligned with the input traces.
    pub fn write_embeddings(&self, embeddings: &Tensor) -> Result<()> {
        let rows: Vec<Vec<f32>> = embeddings.to_vec2()?;
        let mut writer = self.gz_writer(EMBEDDINGS_FILE)?;
        for row in rows {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", line.join("\t"))?;
        }
        writer.finish()?;
        Ok(())
    }

    pub fn write_hyperparameters(&self, config: &TrainConfig, input_dim: usize) -> Result<()> {
        let record = HyperparameterRecord {
            schema_version: SCHEMA_VERSION,
            input_dim,
            config: config.clone(),
        };
        let path = self.outdir.join(HYPERPARAMETERS_FILE);
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn read_hyperparameters(outdir: &Path) -> Result<HyperparameterRecord> {
        let path = outdir.join(HYPERPARAMETERS_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record: HyperparameterRecord = serde_json::from_str(&json)
            .with_context(|| format!("malformed hyperparameter record {}", path.display()))?;
        Ok(record)
    }

    fn gz_writer(&self, name: &str) -> Result<GzEncoder<File>> {
        let path = self.outdir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(GzEncoder::new(file, Compression::default()))
    }
}
