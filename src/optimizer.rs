mod adam;
mod gradient_descent;
mod momentum;

use std::fmt::Debug;

use ndarray::{Array2, ArrayView2};

pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use momentum::Momentum;

/// Update rule applied to one layer's weights.
/// Implementors keep their per-layer state (velocity, moments, step count)
/// inside themselves, so every layer owns its own instance.
pub trait Optimizer: Debug + Send {
    fn name(&self) -> &'static str;

    fn learning_rate(&self) -> f64;

    /// Apply one step to `weights` using `gradient`, which has the same shape.
    fn update(&mut self, weights: &mut Array2<f64>, gradient: ArrayView2<f64>);

    /// Same hyperparameters, fresh state.
    fn boxed_clone(&self) -> Box<dyn Optimizer>;
}

impl Clone for Box<dyn Optimizer> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Return a zeroed buffer if `state` is missing or no longer matches `shape`.
fn state_for<'a>(state: &'a mut Option<Array2<f64>>, shape: (usize, usize)) -> &'a mut Array2<f64> {
    if state.as_ref().map_or(true, |buffer| buffer.dim() != shape) {
        *state = Some(Array2::zeros(shape));
    }
    state.get_or_insert_with(|| Array2::zeros(shape))
}
