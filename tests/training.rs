use approx::assert_relative_eq;
use layerstack::{
    Adam, GradientDescent, Layer, Momentum, Network, Optimizer, TrainConfig, TrainStatus,
};
use ndarray::{arr1, arr2};

// Fit y = 2x from the single sample x = 3, y = 6, starting at w = 1.
fn doubling_network() -> Network {
    let layer = Layer::with_weights((1, 1), arr2(&[[1.0]]), "identity").unwrap();
    Network::from_layers(vec![layer]).unwrap()
}

fn doubling_config() -> TrainConfig {
    TrainConfig::new()
        .with_stop_tolerance(1e-6)
        .with_max_iterations(1000)
        .with_inputs(arr2(&[[3.0]]))
        .with_target(arr1(&[6.0]))
}

#[test]
fn gradient_descent_converges_to_doubling() {
    let mut network = doubling_network();
    network.set_update_rule(&GradientDescent::new(0.05));

    let report = network.train(&doubling_config()).unwrap();
    assert_eq!(report.status, TrainStatus::Converged);
    assert!(report.final_loss <= 1e-6);
    assert_eq!(network.training_loss().len(), report.iterations);
    assert_eq!(*network.training_loss().last().unwrap(), report.final_loss);
    assert_relative_eq!(network.weights()[0][[0, 0]], 2.0, epsilon = 1e-3);

    // first-iteration replacements stay cached
    assert_eq!(network.inputs(), &arr2(&[[3.0]]));
    assert_eq!(network.target(), &arr1(&[6.0]));
}

#[test]
fn single_step_reports_max_iterations() {
    let mut network = doubling_network();
    network.set_update_rule(&GradientDescent::new(0.05));
    let config = doubling_config()
        .with_stop_tolerance(0.0)
        .with_max_iterations(1)
        .quiet(true);

    let report = network.train(&config).unwrap();
    assert_eq!(report.status, TrainStatus::MaxIterationsReached);
    assert_eq!(report.iterations, 1);
    assert_eq!(network.training_loss().len(), 1);
    // 0.5 * (3 - 6)^2 before the single update
    assert_relative_eq!(network.training_loss()[0], 4.5);
}

#[test]
fn loss_history_is_append_only() {
    let mut network = doubling_network();
    network.set_update_rule(&GradientDescent::new(0.01));
    let config = doubling_config().with_max_iterations(5).quiet(true);

    network.train(&config).unwrap();
    let first_run = network.training_loss().to_vec();
    network
        .train(&TrainConfig::new().with_max_iterations(3).quiet(true))
        .unwrap();

    assert_eq!(network.training_loss().len(), first_run.len() + 3);
    assert_eq!(&network.training_loss()[..first_run.len()], &first_run[..]);
    assert!(network.training_loss().windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn momentum_converges() {
    let mut network = doubling_network();
    network.set_update_rule(&Momentum::new(0.02, 0.5));

    let report = network.train(&doubling_config()).unwrap();
    assert_eq!(report.status, TrainStatus::Converged);
    assert_relative_eq!(network.weights()[0][[0, 0]], 2.0, epsilon = 1e-3);
}

#[test]
fn adam_reduces_loss() {
    let mut network = doubling_network();
    network.set_update_rule(&Adam::with_learning_rate(0.05));

    let config = doubling_config().with_max_iterations(200).quiet(true);
    let report = network.train(&config).unwrap();
    assert!(report.final_loss < network.training_loss()[0] / 100.0);
}

#[test]
fn per_layer_update_rules_train_a_stack() {
    let hidden = Layer::with_weights(
        (1, 2),
        arr2(&[[0.1, -0.2, 0.3], [0.4, 0.1, -0.1]]),
        "tanh",
    )
    .unwrap();
    let out = Layer::with_weights((1, 3), arr2(&[[0.2], [0.3], [-0.1]]), "identity").unwrap();
    let mut network = Network::from_layers(vec![hidden, out]).unwrap();
    let rules: Vec<Box<dyn Optimizer>> = vec![
        Box::new(GradientDescent::new(0.05)),
        Box::new(Momentum::new(0.05, 0.5)),
    ];
    network.set_update_rules(rules).unwrap();
    assert_eq!(network.layers()[1].update_rule().name(), "momentum");

    let config = TrainConfig::new()
        .with_max_iterations(200)
        .with_inputs(arr2(&[[0.5, -0.5]]))
        .with_target(arr1(&[0.5]))
        .quiet(true);
    let report = network.train(&config).unwrap();
    assert!(report.final_loss < network.training_loss()[0]);
}

#[test]
fn manual_loop_matches_train() {
    let mut manual = doubling_network();
    let mut trained = doubling_network();
    trained.set_update_rule(&GradientDescent::new(0.05));

    manual
        .predict(
            layerstack::PredictOptions::new()
                .with_inputs(arr2(&[[3.0]]))
                .with_target(arr1(&[6.0])),
        )
        .unwrap();
    manual.backward().unwrap();
    manual.update_weights_with(&GradientDescent::new(0.05)).unwrap();

    let config = doubling_config().with_max_iterations(1).quiet(true);
    trained.train(&config).unwrap();
    assert_eq!(manual.weights(), trained.weights());
}

#[test]
fn non_finite_loss_aborts_training() {
    let mut network = doubling_network();
    network.set_update_rule(&GradientDescent::new(0.05));
    let config = doubling_config().with_inputs(arr2(&[[f64::NAN]]));

    let err = network.train(&config).unwrap_err();
    assert!(matches!(
        err,
        layerstack::NetworkError::NonFiniteLoss { iteration: 1, .. }
    ));
    assert_eq!(network.training_loss().len(), 1);
    assert!(network.training_loss()[0].is_nan());
    // aborted before the update
    assert_eq!(network.weights()[0], arr2(&[[1.0]]));
}

#[test]
fn update_with_each_checks_arity_first() {
    let hidden = Layer::with_weights((1, 2), arr2(&[[0.5, -0.5], [0.25, 1.0]]), "tanh").unwrap();
    let out = Layer::with_weights((1, 2), arr2(&[[1.0], [-1.0]]), "identity").unwrap();
    let mut network = Network::from_layers(vec![hidden, out]).unwrap();
    network
        .predict(
            layerstack::PredictOptions::new()
                .with_inputs(arr2(&[[1.0, 2.0]]))
                .with_target(arr1(&[0.5])),
        )
        .unwrap();
    network.backward().unwrap();
    let before = network.weights();

    let rules: Vec<Box<dyn Optimizer>> = vec![Box::new(GradientDescent::new(0.1))];
    assert!(matches!(
        network.update_weights_with_each(rules),
        Err(layerstack::NetworkError::ArityMismatch { expected: 2, got: 1, .. })
    ));
    assert_eq!(network.weights(), before);
    assert_eq!(network.layers()[1].update_rule().name(), "gradient_descent");

    let rules: Vec<Box<dyn Optimizer>> = vec![
        Box::new(GradientDescent::new(0.1)),
        Box::new(Momentum::new(0.1, 0.9)),
    ];
    network.update_weights_with_each(rules).unwrap();
    assert_ne!(network.weights(), before);
    assert_eq!(network.layers()[1].update_rule().name(), "momentum");
}
