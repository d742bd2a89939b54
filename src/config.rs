use ndarray::{Array1, Array2};

/// Optional replacements for the cached input and target of a forward pass.
/// Both are validated against the network's declared shapes before either
/// is applied.
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub inputs: Option<Array2<f64>>,
    pub target: Option<Array1<f64>>,
}

impl PredictOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs(mut self, inputs: Array2<f64>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_target(mut self, target: Array1<f64>) -> Self {
        self.target = Some(target);
        self
    }
}

/// Configuration for `Network::train`.
///
/// # Fields
/// - `stop_tolerance` - stop once the scalar loss is at or below this value (default `1e-5`)
/// - `max_iterations` - upper bound on training steps per call (default `1000`); at least one
///   step always runs
/// - `quiet` - suppress the warning logged when `max_iterations` is hit first (default `false`)
/// - `inputs`, `target` - replacements applied before the first iteration only
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub stop_tolerance: f64,
    pub max_iterations: usize,
    pub quiet: bool,
    pub inputs: Option<Array2<f64>>,
    pub target: Option<Array1<f64>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            stop_tolerance: 1.0e-5,
            max_iterations: 1000,
            quiet: false,
            inputs: None,
            target: None,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_tolerance(mut self, stop_tolerance: f64) -> Self {
        self.stop_tolerance = stop_tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_inputs(mut self, inputs: Array2<f64>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_target(mut self, target: Array1<f64>) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn first_pass(&self) -> PredictOptions {
        PredictOptions {
            inputs: self.inputs.clone(),
            target: self.target.clone(),
        }
    }
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainStatus {
    Converged,
    MaxIterationsReached,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub status: TrainStatus,
    pub iterations: usize,
    pub final_loss: f64,
}
