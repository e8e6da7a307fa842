#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

pub use mqtt_executor_test_utils::builders;
pub use mqtt_executor_test_utils::fake_transport::{FakeTransport, Published};
pub use mqtt_executor_test_utils::{init_tracing, with_timeout};

use mqtt_executor::exec::{ExecutionRegistry, ProcessRunner};

/// A fresh registry and a runner bound to it.
pub fn runner() -> (Arc<ExecutionRegistry>, ProcessRunner) {
    let registry = ExecutionRegistry::new();
    let runner = ProcessRunner::new(Arc::clone(&registry));
    (registry, runner)
}

/// Poll `condition` every 10ms until it holds. Panics after 10 seconds.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
