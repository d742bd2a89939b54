use std::{collections::BTreeMap, fmt, sync::Arc};

use ndarray::{Array1, ArrayView1, Zip};

use crate::error::{NetworkError, Result};

type ValueFn = dyn Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Send + Sync;
type DerivativeFn = dyn Fn(ArrayView1<f64>, ArrayView1<f64>) -> Array1<f64> + Send + Sync;

/// A scalar loss over `(prediction, target)` paired with its gradient with
/// respect to the prediction. Both vectors always have the same length.
#[derive(Clone)]
pub struct LossFunction {
    value: Arc<ValueFn>,
    derivative: Arc<DerivativeFn>,
}

impl LossFunction {
    pub fn new<V, D>(value: V, derivative: D) -> Self
    where
        V: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Send + Sync + 'static,
        D: Fn(ArrayView1<f64>, ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            value: Arc::new(value),
            derivative: Arc::new(derivative),
        }
    }

    pub fn value(&self, prediction: ArrayView1<f64>, target: ArrayView1<f64>) -> f64 {
        (self.value)(prediction, target)
    }

    pub fn derivative(&self, prediction: ArrayView1<f64>, target: ArrayView1<f64>) -> Array1<f64> {
        (self.derivative)(prediction, target)
    }
}

impl fmt::Debug for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossFunction").finish_non_exhaustive()
    }
}

/// Half the squared euclidean norm of the residual.
pub fn l2() -> LossFunction {
    LossFunction::new(
        |prediction, target| {
            let residual = &prediction - &target;
            0.5 * residual.dot(&residual)
        },
        |prediction, target| &prediction - &target,
    )
}

/// Mean squared error over the elements of the vector.
pub fn mean_squared_error() -> LossFunction {
    LossFunction::new(
        |prediction, target| {
            let n = prediction.len();
            Zip::from(&prediction)
                .and(&target)
                .fold(0.0, |loss, &p, &t| loss + (p - t).powi(2))
                / n as f64
        },
        |prediction, target| {
            let n = prediction.len();
            (&prediction - &target) * (2.0 / n as f64)
        },
    )
}

pub fn l1() -> LossFunction {
    LossFunction::new(
        |prediction, target| {
            Zip::from(&prediction)
                .and(&target)
                .fold(0.0, |loss, &p, &t| loss + (p - t).abs())
        },
        |prediction, target| {
            Zip::from(&prediction)
                .and(&target)
                .map_collect(|&p, &t| if p > t { 1.0 } else if p < t { -1.0 } else { 0.0 })
        },
    )
}

fn softmax(x: ArrayView1<f64>) -> Array1<f64> {
    let max_element = x.iter().fold(f64::NEG_INFINITY, |v, &w| v.max(w));
    let exp_each = x.map(|v| (v - max_element).exp());
    let exp_sum = exp_each.sum();
    exp_each / exp_sum
}

/// Cross entropy of `target` against the softmax of the raw prediction.
pub fn softmax_cross_entropy() -> LossFunction {
    LossFunction::new(
        |prediction, target| {
            let softmax = softmax(prediction);
            -Zip::from(&target)
                .and(&softmax)
                .fold(0.0, |loss, t, y| loss + t * y.ln())
        },
        |prediction, target| softmax(prediction) - &target,
    )
}

/// Immutable name to loss-pair lookup table, shared between networks via `Arc`.
#[derive(Clone, Debug, Default)]
pub struct LossRegistry {
    entries: BTreeMap<String, LossFunction>,
}

impl LossRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `L2`, `MSE`, `L1` and `SoftmaxCrossEntropy`.
    pub fn builtin() -> Self {
        Self::new()
            .with("L2", l2())
            .with("MSE", mean_squared_error())
            .with("L1", l1())
            .with("SoftmaxCrossEntropy", softmax_cross_entropy())
    }

    /// Return a registry that also maps `name` to `loss`, replacing any
    /// previous entry of that name.
    pub fn with(mut self, name: impl Into<String>, loss: LossFunction) -> Self {
        self.entries.insert(name.into(), loss);
        self
    }

    pub fn get(&self, name: &str) -> Result<LossFunction> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| NetworkError::UnknownLoss(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
