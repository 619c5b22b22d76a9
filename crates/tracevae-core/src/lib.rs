//! tracevae core - Candle-based VAE for calcium-imaging traces
//!
//! The model maps a fixed-length fluorescence trace to a low-dimensional
//! latent distribution and back, trained with a reconstruction + beta * KL
//! objective.

pub mod config;
pub mod error;
pub mod loss;
pub mod model;
pub mod noise;

pub use config::{LossType, LrSchedule, TrainConfig};
pub use error::{Result, VaeError};
pub use loss::{LossEvaluator, LossTerms};
pub use model::TraceVae;
pub use noise::{seed_weights, NoiseSource};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
