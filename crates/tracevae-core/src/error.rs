use std::fmt;
use std::io;

/// Errors produced while configuring, training, or evaluating the VAE.
#[derive(Debug)]
pub enum VaeError {
    /// A shape invariant was violated (inconsistent trace lengths, wrong
    /// feature dimension, data width disagreeing with a checkpoint).
    ShapeMismatch {
        /// Human-readable context for the mismatch (e.g. "encoder input").
        what: &'static str,
        /// Observed value.
        got: usize,
        /// Expected value.
        expected: usize,
    },

    /// An invalid hyperparameter combination, fatal before any compute.
    Config(String),

    /// Training loss became NaN or infinite; the run must abort since a
    /// diverged model produces meaningless embeddings.
    NonFiniteLoss { epoch: usize, value: f32 },

    /// Unreadable input or unwritable output.
    Io(io::Error),

    /// An underlying tensor operation failed.
    Tensor(candle_core::Error),
}

pub type Result<T> = std::result::Result<T, VaeError>;

impl fmt::Display for VaeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaeError::ShapeMismatch {
                what,
                got,
                expected,
            } => {
                write!(f, "shape mismatch for {what}: got {got}, expected {expected}")
            }
            VaeError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            VaeError::NonFiniteLoss { epoch, value } => {
                write!(f, "non-finite loss {value} at epoch {epoch}, aborting")
            }
            VaeError::Io(err) => write!(f, "i/o error: {err}"),
            VaeError::Tensor(err) => write!(f, "tensor error: {err}"),
        }
    }
}

impl std::error::Error for VaeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VaeError::Io(err) => Some(err),
            VaeError::Tensor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for VaeError {
    fn from(err: io::Error) -> Self {
        VaeError::Io(err)
    }
}

impl From<candle_core::Error> for VaeError {
    fn from(err: candle_core::Error) -> Self {
        VaeError::Tensor(err)
    }
}
