//! Training pipeline for the trace VAE
//!
//! Trace matrix loading and splitting, the epoch loop with early stopping and
//! learning-rate decay, and the artifact writer that persists the model,
//! loss curves, embeddings, and hyperparameters.

pub mod artifacts;
pub mod dataset;
pub mod trainer;

pub use artifacts::{ArtifactWriter, HyperparameterRecord};
pub use dataset::TraceMatrix;
pub use trainer::{EarlyStopping, EpochMetrics, StopReason, Trainer, TrainingMetrics};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
