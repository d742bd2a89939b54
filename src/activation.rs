use std::{fmt::Debug, sync::Arc};

use ndarray::Array2;

use crate::error::{NetworkError, Result};

/// Element-wise nonlinearity applied to a layer's pre-activations.
/// `derivative` is evaluated at the pre-activation, not at the output.
pub trait Activation: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn compute(&self, x: &Array2<f64>) -> Array2<f64>;

    fn derivative(&self, x: &Array2<f64>) -> Array2<f64>;
}

// Elements are independent, so each rayon worker writes a disjoint slot.
fn par_map(x: &Array2<f64>, f: fn(f64) -> f64) -> Array2<f64> {
    let mut out = x.to_owned();
    out.par_mapv_inplace(f);
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Identity;

impl Activation for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compute(&self, x: &Array2<f64>) -> Array2<f64> {
        x.clone()
    }

    fn derivative(&self, x: &Array2<f64>) -> Array2<f64> {
        x.map(|_| 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sigmoid;

impl Sigmoid {
    fn compute_one(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }
}

impl Activation for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    fn compute(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, Sigmoid::compute_one)
    }

    fn derivative(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, |v| {
            let w = Sigmoid::compute_one(v);
            w * (1.0 - w)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Relu;

impl Activation for Relu {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn compute(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, |v| if v > 0.0 { v } else { 0.0 })
    }

    fn derivative(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, |v| if v > 0.0 { 1.0 } else { 0.0 })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tanh;

impl Activation for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    fn compute(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, f64::tanh)
    }

    fn derivative(&self, x: &Array2<f64>) -> Array2<f64> {
        par_map(x, |v| 1.0 - v.tanh().powi(2))
    }
}

/// Resolve an activation from its name. Matching ignores ASCII case.
pub fn activation_by_name(name: &str) -> Result<Arc<dyn Activation>> {
    match name.to_ascii_lowercase().as_str() {
        "identity" | "linear" => Ok(Arc::new(Identity)),
        "sigmoid" => Ok(Arc::new(Sigmoid)),
        "relu" => Ok(Arc::new(Relu)),
        "tanh" => Ok(Arc::new(Tanh)),
        _ => Err(NetworkError::UnknownActivation(name.to_string())),
    }
}
