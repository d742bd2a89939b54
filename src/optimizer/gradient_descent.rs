use crate::optimizer::Optimizer;

use ndarray::{Array2, ArrayView2, Zip};

/// Fixed-step gradient descent: `w <- w - lr * g`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for GradientDescent {
    fn name(&self) -> &'static str {
        "gradient_descent"
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn update(&mut self, weights: &mut Array2<f64>, gradient: ArrayView2<f64>) {
        Zip::from(weights)
            .and(gradient)
            .for_each(|w, &g| *w -= self.learning_rate * g);
    }

    fn boxed_clone(&self) -> Box<dyn Optimizer> {
        Box::new(*self)
    }
}
