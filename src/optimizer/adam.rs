use ndarray::{Array2, ArrayView2, Zip};

use crate::optimizer::{state_for, Optimizer};

/// Adam: per-weight step sizes from bias-corrected first and second moment
/// estimates of the gradient.
///
/// ```text
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g^2
/// w = w - lr * (m / (1 - beta1^t)) / (sqrt(v / (1 - beta2^t)) + epsilon)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Option<Array2<f64>>,
    v: Option<Array2<f64>>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: None,
            v: None,
            t: 0,
        }
    }

    /// Adam with `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`.
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn update(&mut self, weights: &mut Array2<f64>, gradient: ArrayView2<f64>) {
        let shape = weights.dim();
        if self.m.as_ref().map_or(true, |m| m.dim() != shape) {
            self.t = 0;
        }
        self.t += 1;

        let (beta1, beta2, epsilon, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);
        let m = state_for(&mut self.m, shape);
        let v = state_for(&mut self.v, shape);

        Zip::from(weights)
            .and(m)
            .and(v)
            .and(gradient)
            .for_each(|w, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *w -= lr * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

    fn boxed_clone(&self) -> Box<dyn Optimizer> {
        Box::new(Adam::new(
            self.learning_rate,
            self.beta1,
            self.beta2,
            self.epsilon,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first step is lr * g / |g| per element.
        let mut w = arr2(&[[1.0, 1.0]]);
        let mut opt = Adam::with_learning_rate(0.1);
        opt.update(&mut w, arr2(&[[4.0, -0.5]]).view());
        assert_relative_eq!(w[[0, 0]], 0.9, epsilon = 1e-6);
        assert_relative_eq!(w[[0, 1]], 1.1, epsilon = 1e-6);
        assert_eq!(opt.steps(), 1);
    }

    #[test]
    fn boxed_clone_restarts_step_count() {
        let mut w = arr2(&[[0.0]]);
        let mut opt = Adam::with_learning_rate(0.01);
        opt.update(&mut w, arr2(&[[1.0]]).view());
        opt.update(&mut w, arr2(&[[1.0]]).view());
        assert_eq!(opt.steps(), 2);

        let mut fresh = opt.boxed_clone();
        let mut w2 = arr2(&[[0.0]]);
        fresh.update(&mut w2, arr2(&[[1.0]]).view());
        assert_relative_eq!(w2[[0, 0]], -0.01, epsilon = 1e-6);
    }
}
