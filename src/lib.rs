//! A small feed-forward network engine: a stack of dense layers with a
//! pluggable loss registry and per-layer update rules, trained by plain
//! backpropagation on `ndarray` matrices.

pub mod activation;
pub mod config;
pub mod error;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;

/// `(rows, cols)` of a matrix.
pub type Shape = (usize, usize);

pub use config::{PredictOptions, TrainConfig, TrainReport, TrainStatus};
pub use error::{NetworkError, Result};
pub use layer::Layer;
pub use loss::{LossFunction, LossRegistry};
pub use network::{GradientState, Network};
pub use optimizer::{Adam, GradientDescent, Momentum, Optimizer};

#[macro_export]
macro_rules! assert_rel_eq_arr1 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
}

#[macro_export]
macro_rules! assert_rel_eq_arr2 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
}
