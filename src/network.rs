use std::sync::Arc;

use log::{debug, info, trace, warn};
use ndarray::{Array1, Array2, Axis};

use crate::{
    activation::activation_by_name,
    config::{PredictOptions, TrainConfig, TrainReport, TrainStatus},
    error::{NetworkError, Result},
    layer::Layer,
    loss::{LossFunction, LossRegistry},
    optimizer::Optimizer,
    Shape,
};

/// Loss selected when a network is built without an explicit one.
pub const DEFAULT_LOSS: &str = "L2";

/// Whether the cached loss gradient may seed a backward pass.
///
/// A forward pass makes it `Fresh`; a backward pass consumes it, and any
/// change to inputs, target, weights, activations, loss or layer structure
/// makes it `Stale` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientState {
    Stale,
    Fresh,
}

/// An ordered stack of dense layers trained against a single target vector.
///
/// Invariants kept by every method:
/// - there is at least one layer, and each layer's input shape is
///   `(1, previous.output_width())`;
/// - `input_shape` is the first layer's input shape and `num_outputs` the
///   last layer's output width;
/// - `layer_input_shapes` has one entry per layer, in order;
/// - `inputs` has shape `input_shape` and `target` has `num_outputs` elements.
#[derive(Debug, Clone)]
pub struct Network {
    input_shape: Shape,
    num_outputs: usize,
    layers: Vec<Layer>,
    layer_input_shapes: Vec<Shape>,
    inputs: Array2<f64>,
    target: Array1<f64>,
    outputs: Array1<f64>,
    residual: Array1<f64>,
    scalar_loss: f64,
    loss_gradient: Array1<f64>,
    gradient: Option<Array2<f64>>,
    training_loss: Vec<f64>,
    registry: Arc<LossRegistry>,
    loss_name: String,
    loss: LossFunction,
    gradient_state: GradientState,
}

// Returns the network input shape and output count of a valid layer list.
fn validate_chain(layers: &[Layer]) -> Result<(Shape, usize)> {
    let (first, last) = match (layers.first(), layers.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(NetworkError::EmptyNetwork),
    };
    for pair in layers.windows(2) {
        let expected = (1, pair[0].output_width());
        if pair[1].input_shape() != expected {
            return Err(NetworkError::ShapeMismatch {
                what: "layer input",
                expected,
                got: pair[1].input_shape(),
            });
        }
    }
    Ok((first.input_shape(), last.output_width()))
}

impl Network {
    /// Network with a single layer mapping `input_shape` to `num_outputs`,
    /// using the builtin loss registry and the `L2` loss.
    pub fn new(input_shape: Shape, num_outputs: usize, activation: &str) -> Result<Self> {
        let layer = Layer::new(input_shape, num_outputs, activation)?;
        Network::from_layers(vec![layer])
    }

    /// Network over pre-built layers. The list must be non-empty and each
    /// layer must accept the previous layer's output.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        let registry = Arc::new(LossRegistry::builtin());
        let loss = registry.get(DEFAULT_LOSS)?;
        let (input_shape, num_outputs) = validate_chain(&layers)?;
        let layer_input_shapes = layers.iter().map(Layer::input_shape).collect();

        Ok(Self {
            input_shape,
            num_outputs,
            layers,
            layer_input_shapes,
            inputs: Array2::zeros(input_shape),
            target: Array1::zeros(num_outputs),
            outputs: Array1::zeros(num_outputs),
            residual: Array1::zeros(num_outputs),
            scalar_loss: f64::NAN,
            loss_gradient: Array1::zeros(num_outputs),
            gradient: None,
            training_loss: Vec::new(),
            registry,
            loss_name: DEFAULT_LOSS.to_string(),
            loss,
            gradient_state: GradientState::Stale,
        })
    }

    /// Use `registry` for loss lookups and select `loss` from it.
    pub fn with_loss(mut self, registry: Arc<LossRegistry>, loss: &str) -> Result<Self> {
        self.set_loss_registry(registry, loss)?;
        Ok(self)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_input_shapes(&self) -> &[Shape] {
        &self.layer_input_shapes
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn target(&self) -> &Array1<f64> {
        &self.target
    }

    pub fn outputs(&self) -> &Array1<f64> {
        &self.outputs
    }

    /// `outputs - target` as of the last forward pass.
    pub fn residual(&self) -> &Array1<f64> {
        &self.residual
    }

    /// Loss of the last forward pass; NaN before the first one.
    pub fn scalar_loss(&self) -> f64 {
        self.scalar_loss
    }

    pub fn loss_gradient(&self) -> &Array1<f64> {
        &self.loss_gradient
    }

    /// Weight gradient of the first layer from the last backward pass.
    pub fn gradient(&self) -> Option<&Array2<f64>> {
        self.gradient.as_ref()
    }

    /// Scalar loss recorded at every training step, oldest first.
    pub fn training_loss(&self) -> &[f64] {
        &self.training_loss
    }

    pub fn loss_name(&self) -> &str {
        &self.loss_name
    }

    pub fn loss_registry(&self) -> &Arc<LossRegistry> {
        &self.registry
    }

    pub fn gradient_state(&self) -> GradientState {
        self.gradient_state
    }

    fn check_inputs(&self, inputs: &Array2<f64>) -> Result<()> {
        if inputs.dim() != self.input_shape {
            return Err(NetworkError::ShapeMismatch {
                what: "inputs",
                expected: self.input_shape,
                got: inputs.dim(),
            });
        }
        Ok(())
    }

    fn check_target(&self, target: &Array1<f64>) -> Result<()> {
        if target.len() != self.num_outputs {
            return Err(NetworkError::ShapeMismatch {
                what: "target",
                expected: (1, self.num_outputs),
                got: (1, target.len()),
            });
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        self.gradient_state = GradientState::Stale;
        self.gradient = None;
    }

    /// Replace the input matrix. With `override_shape`, a matrix of another
    /// shape is adopted and the first layer is reshaped to accept it.
    pub fn set_inputs(&mut self, inputs: Array2<f64>, override_shape: bool) -> Result<()> {
        if override_shape && inputs.dim() != self.input_shape {
            let shape = inputs.dim();
            debug!("overriding network input shape {:?} -> {:?}", self.input_shape, shape);
            self.layers[0].set_input_shape(shape);
            self.layer_input_shapes[0] = shape;
            self.input_shape = shape;
        } else {
            self.check_inputs(&inputs)?;
        }
        self.inputs = inputs;
        self.invalidate();
        Ok(())
    }

    /// Replace the target vector. With `override_size`, a target of another
    /// length resizes the last layer's output width to match.
    pub fn set_target(&mut self, target: Array1<f64>, override_size: bool) -> Result<()> {
        if override_size && target.len() != self.num_outputs {
            debug!("overriding network output count {} -> {}", self.num_outputs, target.len());
            if let Some(last) = self.layers.last_mut() {
                last.set_output_width(target.len());
            }
            self.refresh_shapes();
        } else {
            self.check_target(&target)?;
        }
        self.target = target;
        self.invalidate();
        Ok(())
    }

    /// Replace the whole layer list.
    pub fn set_layers(&mut self, layers: Vec<Layer>) -> Result<()> {
        self.commit_layers(layers)
    }

    /// Move `layers` onto the end of the stack.
    pub fn append_layers(&mut self, layers: Vec<Layer>) -> Result<()> {
        let mut candidate = self.layers.clone();
        candidate.extend(layers);
        self.commit_layers(candidate)
    }

    /// Insert `layer` before position `index`; `index == len` appends.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        let len = self.layers.len();
        if index > len {
            return Err(NetworkError::LayerIndex { index, len });
        }
        let mut candidate = self.layers.clone();
        candidate.insert(index, layer);
        self.commit_layers(candidate)
    }

    pub fn replace_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        let len = self.layers.len();
        if index >= len {
            return Err(NetworkError::LayerIndex { index, len });
        }
        let mut candidate = self.layers.clone();
        candidate[index] = layer;
        self.commit_layers(candidate)
    }

    fn commit_layers(&mut self, layers: Vec<Layer>) -> Result<()> {
        validate_chain(&layers)?;
        self.layers = layers;
        self.refresh_shapes();
        self.invalidate();
        Ok(())
    }

    // Full recomputation of every shape derived from the layer list.
    fn refresh_shapes(&mut self) {
        self.layer_input_shapes = self.layers.iter().map(Layer::input_shape).collect();
        if let Some(first) = self.layers.first() {
            self.input_shape = first.input_shape();
        }
        if let Some(last) = self.layers.last() {
            self.num_outputs = last.output_width();
        }

        if self.inputs.dim() != self.input_shape {
            debug!("input shape is now {:?}, resetting inputs", self.input_shape);
            self.inputs = Array2::zeros(self.input_shape);
        }
        if self.target.len() != self.num_outputs {
            debug!("output count is now {}, resetting target", self.num_outputs);
            self.target = Array1::zeros(self.num_outputs);
            self.outputs = Array1::zeros(self.num_outputs);
            self.residual = Array1::zeros(self.num_outputs);
            self.loss_gradient = Array1::zeros(self.num_outputs);
        }
    }

    pub fn weights(&self) -> Vec<Array2<f64>> {
        self.layers.iter().map(|l| l.weights().clone()).collect()
    }

    /// Replace every layer's weights. Nothing is changed unless there is one
    /// matrix per layer and each has its layer's shape.
    pub fn set_weights(&mut self, weights: Vec<Array2<f64>>) -> Result<()> {
        if weights.len() != self.layers.len() {
            return Err(NetworkError::ArityMismatch {
                what: "weight matrix",
                expected: self.layers.len(),
                got: weights.len(),
            });
        }
        for (layer, w) in self.layers.iter().zip(&weights) {
            if layer.weights().dim() != w.dim() {
                return Err(NetworkError::ShapeMismatch {
                    what: "weight matrix",
                    expected: layer.weights().dim(),
                    got: w.dim(),
                });
            }
        }
        for (layer, w) in self.layers.iter_mut().zip(weights) {
            layer.set_weights(w)?;
        }
        self.invalidate();
        Ok(())
    }

    /// `(error, gradient)` of every layer from the last backward pass.
    pub fn error_gradient_list(&self) -> Result<Vec<(Array2<f64>, Array2<f64>)>> {
        self.layers
            .iter()
            .map(|l| match (l.error(), l.gradient()) {
                (Some(error), Some(gradient)) => Ok((error.clone(), gradient.clone())),
                _ => Err(NetworkError::StaleGradient),
            })
            .collect()
    }

    /// Same activation for every layer.
    pub fn set_activation(&mut self, activation: &str) -> Result<()> {
        let activation = activation_by_name(activation)?;
        for layer in self.layers.iter_mut() {
            layer.set_activation_fn(Arc::clone(&activation));
        }
        self.invalidate();
        Ok(())
    }

    /// One activation per layer, in layer order.
    pub fn set_activations(&mut self, activations: &[&str]) -> Result<()> {
        if activations.len() != self.layers.len() {
            return Err(NetworkError::ArityMismatch {
                what: "activation",
                expected: self.layers.len(),
                got: activations.len(),
            });
        }
        let resolved = activations
            .iter()
            .map(|name| activation_by_name(name))
            .collect::<Result<Vec<_>>>()?;
        for (layer, activation) in self.layers.iter_mut().zip(resolved) {
            layer.set_activation_fn(activation);
        }
        self.invalidate();
        Ok(())
    }

    /// Select a loss by name from this network's registry.
    pub fn set_loss(&mut self, loss: &str) -> Result<()> {
        self.loss = self.registry.get(loss)?;
        self.loss_name = loss.to_string();
        self.invalidate();
        Ok(())
    }

    pub fn set_loss_registry(&mut self, registry: Arc<LossRegistry>, loss: &str) -> Result<()> {
        let function = registry.get(loss)?;
        self.registry = registry;
        self.loss = function;
        self.loss_name = loss.to_string();
        self.invalidate();
        Ok(())
    }

    /// Install a loss pair that is not in the registry.
    pub fn set_loss_function(&mut self, name: impl Into<String>, loss: LossFunction) {
        self.loss = loss;
        self.loss_name = name.into();
        self.invalidate();
    }

    /// Give every layer its own fresh copy of `update_rule`.
    pub fn set_update_rule(&mut self, update_rule: &dyn Optimizer) {
        for layer in self.layers.iter_mut() {
            layer.set_update_rule(update_rule.boxed_clone());
        }
    }

    /// One update rule per layer, in layer order.
    pub fn set_update_rules(&mut self, update_rules: Vec<Box<dyn Optimizer>>) -> Result<()> {
        if update_rules.len() != self.layers.len() {
            return Err(NetworkError::ArityMismatch {
                what: "update rule",
                expected: self.layers.len(),
                got: update_rules.len(),
            });
        }
        for (layer, rule) in self.layers.iter_mut().zip(update_rules) {
            layer.set_update_rule(rule);
        }
        Ok(())
    }

    /// Forward pass over the cached (or replaced) inputs. Updates outputs,
    /// residual, scalar loss and loss gradient.
    pub fn predict(&mut self, options: PredictOptions) -> Result<()> {
        let PredictOptions { inputs, target } = options;
        if let Some(inputs) = &inputs {
            self.check_inputs(inputs)?;
        }
        if let Some(target) = &target {
            self.check_target(target)?;
        }
        if let Some(inputs) = inputs {
            self.inputs = inputs;
        }
        if let Some(target) = target {
            self.target = target;
        }
        self.invalidate();

        let mut layer_out = self.inputs.clone();
        for layer in self.layers.iter_mut() {
            // output of this layer is input to the next layer
            layer_out = layer.forward(layer_out.view())?;
        }
        let outputs = Array1::from_iter(layer_out.iter().copied());

        self.residual = &outputs - &self.target;
        self.scalar_loss = self.loss.value(outputs.view(), self.target.view());
        self.loss_gradient = self.loss.derivative(outputs.view(), self.target.view());
        self.outputs = outputs;
        self.gradient_state = GradientState::Fresh;
        Ok(())
    }

    /// Same as `predict`, but returns the output vector.
    pub fn predict_value(&mut self, options: PredictOptions) -> Result<Array1<f64>> {
        self.predict(options)?;
        Ok(self.outputs.clone())
    }

    /// Backpropagate the loss gradient of the last forward pass through
    /// every layer, last to first.
    pub fn backward(&mut self) -> Result<()> {
        if self.gradient_state != GradientState::Fresh {
            return Err(NetworkError::StaleGradient);
        }
        self.gradient_state = GradientState::Stale;

        let mut upstream = self.loss_gradient.clone().insert_axis(Axis(0));
        for layer in self.layers.iter_mut().rev() {
            let (error, _) = layer.backward(upstream.view())?;
            upstream = error;
        }
        self.gradient = self.layers[0].gradient().cloned();
        Ok(())
    }

    fn ensure_gradients(&self) -> Result<()> {
        if !self.layers.iter().all(Layer::has_pending_gradient) {
            return Err(NetworkError::StaleGradient);
        }
        Ok(())
    }

    /// Step every layer with its own update rule and the gradient of the
    /// last backward pass. A gradient is used once; updating again needs a
    /// new forward and backward pass.
    pub fn update_weights(&mut self) -> Result<()> {
        self.ensure_gradients()?;
        for layer in self.layers.iter_mut() {
            layer.apply_update()?;
        }
        Ok(())
    }

    /// Install `update_rule` on every layer, then step. This resets any
    /// optimizer state; use `set_update_rule` once for stateful rules.
    pub fn update_weights_with(&mut self, update_rule: &dyn Optimizer) -> Result<()> {
        self.ensure_gradients()?;
        self.set_update_rule(update_rule);
        self.update_weights()
    }

    pub fn update_weights_with_each(&mut self, update_rules: Vec<Box<dyn Optimizer>>) -> Result<()> {
        self.ensure_gradients()?;
        self.set_update_rules(update_rules)?;
        self.update_weights()
    }

    fn train_step(&mut self, options: PredictOptions, iteration: usize) -> Result<()> {
        self.predict(options)?;
        self.training_loss.push(self.scalar_loss);
        trace!("step {}: loss {}", iteration, self.scalar_loss);
        if !self.scalar_loss.is_finite() {
            return Err(NetworkError::NonFiniteLoss {
                iteration,
                loss: self.scalar_loss,
            });
        }
        self.backward()?;
        self.update_weights()
    }

    /// Repeat forward, backward and update until the scalar loss is at or
    /// below `config.stop_tolerance` or `config.max_iterations` steps ran.
    /// One step always runs. A NaN or infinite loss aborts training with
    /// `NonFiniteLoss` before that step's update.
    pub fn train(&mut self, config: &TrainConfig) -> Result<TrainReport> {
        debug!(
            "training {} layers: tolerance {}, max iterations {}",
            self.layers.len(),
            config.stop_tolerance,
            config.max_iterations
        );

        self.train_step(config.first_pass(), 1)?;
        let mut iterations = 1;
        while iterations < config.max_iterations && self.scalar_loss > config.stop_tolerance {
            iterations += 1;
            self.train_step(PredictOptions::default(), iterations)?;
        }

        let status = if self.scalar_loss <= config.stop_tolerance {
            info!("converged after {} iterations, loss {}", iterations, self.scalar_loss);
            TrainStatus::Converged
        } else {
            if !config.quiet {
                warn!(
                    "network hit max iterations ({}) in training, scalar loss is {}",
                    iterations, self.scalar_loss
                );
            }
            TrainStatus::MaxIterationsReached
        };

        Ok(TrainReport {
            status,
            iterations,
            final_loss: self.scalar_loss,
        })
    }
}
