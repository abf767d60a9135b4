//! Helpers shared by the integration test suites.

#![allow(dead_code)]

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Wait for a condition with timeout, polling periodically.
pub async fn wait_for<F, Fut>(timeout_ms: u64, poll_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(poll_ms)).await;
    }
}

/// String forms of a list of peer names, for table comparisons.
pub fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
