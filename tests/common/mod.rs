//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use imu_recorder::session::{SessionController, StateView};
use std::time::{Duration, Instant};

/// Upper bound for waiting on a condition in integration tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Poll snapshots until `pred` holds; panics after [`test_timeout`]
pub fn wait_for(controller: &SessionController, pred: impl Fn(&StateView) -> bool) -> StateView {
    let deadline = Instant::now() + test_timeout();
    loop {
        let view = controller.snapshot();
        if pred(&view) {
            return view;
        }
        assert!(
            Instant::now() < deadline,
            "condition not reached, last state: {:?}",
            view
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
