use ndarray::ShapeError;
use thiserror::Error;

use crate::Shape;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("{what} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Shape,
        got: Shape,
    },

    #[error("no loss function named `{0}` in the registry")]
    UnknownLoss(String),

    #[error("unknown activation `{0}`")]
    UnknownActivation(String),

    #[error("expected exactly one {what} per layer ({expected} layers), got {got}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Backward pass or update without a fresh forward pass behind it.
    #[error("gradient is stale: run a forward pass before the backward pass")]
    StaleGradient,

    #[error("training loss became {loss} at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, loss: f64 },

    #[error("a network needs at least one layer")]
    EmptyNetwork,

    #[error("layer index {index} out of range for {len} layers")]
    LayerIndex { index: usize, len: usize },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}
