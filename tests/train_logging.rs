use std::sync::Mutex;

use layerstack::{GradientDescent, Layer, Network, TrainConfig, TrainStatus};
use log::{Level, LevelFilter, Log, Metadata, Record};
use ndarray::{arr1, arr2};

// Keeps every warning emitted while the tests in this file run.
struct WarningLog {
    messages: Mutex<Vec<String>>,
}

impl Log for WarningLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.messages.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static WARNINGS: WarningLog = WarningLog {
    messages: Mutex::new(Vec::new()),
};

fn take_warnings() -> Vec<String> {
    std::mem::take(&mut *WARNINGS.messages.lock().unwrap())
}

fn unconverged_run(quiet: bool) -> TrainStatus {
    let layer = Layer::with_weights((1, 1), arr2(&[[1.0]]), "identity").unwrap();
    let mut network = Network::from_layers(vec![layer]).unwrap();
    network.set_update_rule(&GradientDescent::new(0.05));
    let config = TrainConfig::new()
        .with_stop_tolerance(0.0)
        .with_max_iterations(2)
        .with_inputs(arr2(&[[3.0]]))
        .with_target(arr1(&[6.0]))
        .quiet(quiet);
    network.train(&config).unwrap().status
}

// A single test, so the two runs cannot interleave on the global logger.
#[test]
fn max_iterations_warning_respects_quiet() {
    log::set_logger(&WARNINGS).unwrap();
    log::set_max_level(LevelFilter::Warn);

    assert_eq!(unconverged_run(false), TrainStatus::MaxIterationsReached);
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("max iterations (2)"));

    assert_eq!(unconverged_run(true), TrainStatus::MaxIterationsReached);
    assert!(take_warnings().is_empty());
}
