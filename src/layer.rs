use std::sync::Arc;

use ndarray::{Array, Array1, Array2, ArrayView2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::{
    activation::{activation_by_name, Activation},
    error::{NetworkError, Result},
    optimizer::{GradientDescent, Optimizer},
    Shape,
};

/// Dense layer without bias.
///
/// The input matrix of shape `input_shape` is flattened row-major into a
/// `1 x (rows * cols)` row vector `x`, and the layer computes
/// `y = f(x . W)` with `W` of shape `(rows * cols) x output_width`.
/// The output is always a single row.
#[derive(Debug, Clone)]
pub struct Layer {
    input_shape: Shape,
    weights: Array2<f64>,
    inputs: Option<Array2<f64>>,
    dot_products: Option<Array2<f64>>,
    outputs: Option<Array2<f64>>,
    error: Option<Array2<f64>>,
    gradient: Option<Array2<f64>>,
    // set by `backward`, cleared once `apply_update` has used the gradient
    gradient_pending: bool,
    activation: Arc<dyn Activation>,
    update_rule: Box<dyn Optimizer>,
}

fn flat_len((rows, cols): Shape) -> usize {
    rows * cols
}

fn random_weights(input_shape: Shape, output_width: usize) -> Array2<f64> {
    Array::random(
        (flat_len(input_shape), output_width),
        Uniform::new(-1.0, 1.0),
    )
}

// Row-major copy into a single row, whatever the memory layout of `x`.
fn flatten_row(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    let len = x.len();
    Ok(Array1::from_iter(x.iter().copied()).into_shape((1, len))?)
}

impl Layer {
    /// Create a layer with weights drawn from `Uniform(-1, 1)`.
    pub fn new(input_shape: Shape, output_width: usize, activation: &str) -> Result<Self> {
        let weights = random_weights(input_shape, output_width);
        Layer::with_weights(input_shape, weights, activation)
    }

    /// Create a layer with explicit weights. The output width is
    /// `weights.ncols()`.
    pub fn with_weights(input_shape: Shape, weights: Array2<f64>, activation: &str) -> Result<Self> {
        let activation = activation_by_name(activation)?;
        let expected = (flat_len(input_shape), weights.ncols());
        if weights.dim() != expected {
            return Err(NetworkError::ShapeMismatch {
                what: "weight matrix",
                expected,
                got: weights.dim(),
            });
        }

        Ok(Self {
            input_shape,
            weights,
            inputs: None,
            dot_products: None,
            outputs: None,
            error: None,
            gradient: None,
            gradient_pending: false,
            activation,
            update_rule: Box::new(GradientDescent::default()),
        })
    }

    pub fn forward(&mut self, input: ArrayView2<f64>) -> Result<Array2<f64>> {
        if input.dim() != self.input_shape {
            return Err(NetworkError::ShapeMismatch {
                what: "layer input",
                expected: self.input_shape,
                got: input.dim(),
            });
        }

        let inputs = flatten_row(input)?;
        let dot_products = inputs.dot(&self.weights);
        let outputs = self.activation.compute(&dot_products);

        self.inputs = Some(inputs);
        self.dot_products = Some(dot_products);
        self.outputs = Some(outputs.clone());
        self.error = None;
        self.gradient = None;
        self.gradient_pending = false;
        Ok(outputs)
    }

    /// Propagate `upstream`, the gradient of the loss with respect to this
    /// layer's output, back through the layer.
    ///
    /// Returns `(error, gradient)`: the gradient with respect to the layer
    /// input (shaped like the input, handed to the preceding layer) and the
    /// gradient with respect to the weights (shaped like the weights).
    pub fn backward(&mut self, upstream: ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        let (inputs, dot_products) = match (&self.inputs, &self.dot_products) {
            (Some(inputs), Some(dot_products)) => (inputs, dot_products),
            _ => return Err(NetworkError::StaleGradient),
        };
        let width = self.weights.ncols();
        if upstream.len() != width {
            return Err(NetworkError::ShapeMismatch {
                what: "upstream gradient",
                expected: (1, width),
                got: upstream.dim(),
            });
        }

        let upstream = flatten_row(upstream)?;
        let dot_products_derivative = self.activation.derivative(dot_products) * &upstream;
        let inputs_derivative = dot_products_derivative
            .dot(&self.weights.t())
            .into_shape(self.input_shape)?;
        let weights_derivative = inputs.t().dot(&dot_products_derivative);

        self.error = Some(inputs_derivative.clone());
        self.gradient = Some(weights_derivative.clone());
        self.gradient_pending = true;
        Ok((inputs_derivative, weights_derivative))
    }

    /// Step the weights with this layer's update rule and cached gradient.
    ///
    /// Each gradient is applied at most once; the cached gradient stays
    /// readable, but a further update needs another backward pass.
    pub fn apply_update(&mut self) -> Result<()> {
        let gradient = match &self.gradient {
            Some(gradient) if self.gradient_pending => gradient,
            _ => return Err(NetworkError::StaleGradient),
        };
        self.update_rule.update(&mut self.weights, gradient.view());
        self.gradient_pending = false;
        Ok(())
    }

    /// Whether the cached gradient has not been applied yet.
    pub fn has_pending_gradient(&self) -> bool {
        self.gradient_pending
    }

    pub fn update_rule(&self) -> &dyn Optimizer {
        self.update_rule.as_ref()
    }

    pub fn set_update_rule(&mut self, update_rule: Box<dyn Optimizer>) {
        self.update_rule = update_rule;
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn set_weights(&mut self, weights: Array2<f64>) -> Result<()> {
        if weights.dim() != self.weights.dim() {
            return Err(NetworkError::ShapeMismatch {
                what: "weight matrix",
                expected: self.weights.dim(),
                got: weights.dim(),
            });
        }
        self.weights = weights;
        self.clear_caches();
        Ok(())
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    /// Change the accepted input shape. Weights are kept when the flattened
    /// length is unchanged, otherwise they are re-drawn.
    pub fn set_input_shape(&mut self, input_shape: Shape) {
        if flat_len(input_shape) != self.weights.nrows() {
            self.reinitialize(input_shape, self.output_width());
        }
        self.input_shape = input_shape;
        self.clear_caches();
    }

    pub fn output_width(&self) -> usize {
        self.weights.ncols()
    }

    pub fn set_output_width(&mut self, output_width: usize) {
        if output_width != self.output_width() {
            self.reinitialize(self.input_shape, output_width);
        }
        self.clear_caches();
    }

    pub fn activation_name(&self) -> &'static str {
        self.activation.name()
    }

    pub fn set_activation(&mut self, activation: &str) -> Result<()> {
        self.activation = activation_by_name(activation)?;
        self.clear_caches();
        Ok(())
    }

    pub(crate) fn set_activation_fn(&mut self, activation: Arc<dyn Activation>) {
        self.activation = activation;
        self.clear_caches();
    }

    /// The flattened input seen by the last forward pass.
    pub fn input(&self) -> Option<&Array2<f64>> {
        self.inputs.as_ref()
    }

    pub fn output(&self) -> Option<&Array2<f64>> {
        self.outputs.as_ref()
    }

    pub fn error(&self) -> Option<&Array2<f64>> {
        self.error.as_ref()
    }

    pub fn gradient(&self) -> Option<&Array2<f64>> {
        self.gradient.as_ref()
    }

    fn reinitialize(&mut self, input_shape: Shape, output_width: usize) {
        self.weights = random_weights(input_shape, output_width);
        self.update_rule = self.update_rule.boxed_clone();
    }

    fn clear_caches(&mut self) {
        self.inputs = None;
        self.dot_products = None;
        self.outputs = None;
        self.error = None;
        self.gradient = None;
        self.gradient_pending = false;
    }
}
