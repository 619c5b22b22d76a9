//! Adam optimizer driving a `candle_nn::VarMap`
//!
//! Owns the backward pass so it can clip the global gradient norm before the
//! update; Candle only exposes gradients through the `GradStore` produced by
//! `loss.backward()`.

mod adam;

pub use adam::{Adam, AdamConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
