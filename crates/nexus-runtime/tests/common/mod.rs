#![allow(dead_code)]
//! Shared integration test utilities.

use nexus_runtime::{Runtime, RuntimeConfig};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// A wall-clock runtime with a short idle sleep.
pub fn test_runtime(name: &str) -> Runtime {
    init_test_logging();
    Runtime::with_config(
        RuntimeConfig::default()
            .with_name(name)
            .with_idle_sleep(Duration::from_micros(50)),
    )
}

/// Ordered record shared between tasks and the test body.
pub type Recorder<T> = Arc<Mutex<Vec<T>>>;

pub fn recorder<T>() -> Recorder<T> {
    Arc::new(Mutex::new(Vec::new()))
}
