use ndarray::{Array2, ArrayView2, Zip};

use crate::optimizer::{state_for, Optimizer};

/// Gradient descent with classical momentum:
/// `v <- momentum * v - lr * g`, then `w <- w + v`.
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    learning_rate: f64,
    momentum: f64,
    velocity: Option<Array2<f64>>,
}

impl Momentum {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: None,
        }
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }
}

impl Optimizer for Momentum {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn update(&mut self, weights: &mut Array2<f64>, gradient: ArrayView2<f64>) {
        let (lr, mu) = (self.learning_rate, self.momentum);
        let velocity = state_for(&mut self.velocity, weights.dim());
        Zip::from(weights)
            .and(velocity)
            .and(gradient)
            .for_each(|w, v, &g| {
                *v = mu * *v - lr * g;
                *w += *v;
            });
    }

    fn boxed_clone(&self) -> Box<dyn Optimizer> {
        Box::new(Momentum::new(self.learning_rate, self.momentum))
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_rel_eq_arr2;

    use super::*;

    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn velocity_accumulates() {
        let mut w = arr2(&[[1.0, -1.0]]);
        let g = arr2(&[[1.0, -2.0]]);
        let mut opt = Momentum::new(0.5, 0.5);

        opt.update(&mut w, g.view());
        assert_rel_eq_arr2!(w, arr2(&[[0.5, 0.0]]));

        // v = 0.5 * (-0.5, 1.0) - 0.5 * (1.0, -2.0) = (-0.75, 1.5)
        opt.update(&mut w, g.view());
        assert_rel_eq_arr2!(w, arr2(&[[-0.25, 1.5]]));
    }

    #[test]
    fn clone_drops_velocity() {
        let mut w = arr2(&[[0.0]]);
        let mut opt = Momentum::new(0.1, 0.9);
        opt.update(&mut w, arr2(&[[1.0]]).view());

        let fresh = opt.boxed_clone();
        assert_eq!(fresh.name(), "momentum");
        assert_relative_eq!(fresh.learning_rate(), 0.1);
        assert!(opt.velocity.is_some());
    }

    #[test]
    fn velocity_resets_when_shape_changes() {
        let mut opt = Momentum::new(1.0, 0.9);
        let mut small = arr2(&[[0.0]]);
        opt.update(&mut small, arr2(&[[1.0]]).view());

        let mut wide = arr2(&[[0.0, 0.0]]);
        opt.update(&mut wide, arr2(&[[1.0, 1.0]]).view());
        assert_rel_eq_arr2!(wide, arr2(&[[-1.0, -1.0]]));
    }
}
