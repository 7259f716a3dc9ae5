//! Bounded status polling
//!
//! `wait_for` polls an accessor until it reports the target value, reports
//! one of the failure values, or the deadline passes. The caller only gets a
//! bool; the reason for a `false` is logged here.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Timeout and interval for one wait stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    pub const fn from_secs(timeout: u64, interval: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout),
            interval: Duration::from_secs(interval),
        }
    }
}

/// Poll `accessor` until it returns `target`.
///
/// The first poll happens immediately and later polls every `interval`.
/// Returns false as soon as a value in `failure_values` is observed, or once
/// `timeout` has elapsed without seeing the target.
pub async fn wait_for<T, F, Fut>(
    mut accessor: F,
    target: &T,
    failure_values: &[T],
    timeout: Duration,
    interval: Duration,
) -> bool
where
    T: PartialEq + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let observed = accessor().await;
        info!("Status: {}", observed);

        if observed == *target {
            return true;
        }
        if failure_values.contains(&observed) {
            warn!("Status {} is a failure state, not waiting for {}", observed, target);
            return false;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!("Timeout waiting for status: {}", target);
            return false;
        }
        let pause = interval.min(deadline - now);
        debug!("Waiting {:?} before polling again for {}", pause, target);
        sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sequence(values: Vec<&'static str>) -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<&'static str>) {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let accessor = move || {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(values[i.min(values.len() - 1)])
        };
        (polls, accessor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_on_third_poll() {
        let (polls, accessor) = sequence(vec!["Commissioning", "Testing", "Ready"]);
        let start = Instant::now();

        let reached = wait_for(accessor, &"Ready", &["Failed commissioning"], Duration::from_secs(10), Duration::from_secs(1)).await;

        assert!(reached);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed <= Duration::from_secs(3), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_value_returns_immediately() {
        let (polls, accessor) = sequence(vec!["Commissioning", "Failed commissioning", "Ready"]);
        let start = Instant::now();

        let reached = wait_for(accessor, &"Ready", &["Failed commissioning", "Unknown"], Duration::from_secs(600), Duration::from_secs(30)).await;

        assert!(!reached);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_matching_waits_full_timeout() {
        let (_, accessor) = sequence(vec!["Deploying"]);
        let start = Instant::now();

        let reached = wait_for(accessor, &"Deployed", &[], Duration::from_secs(10), Duration::from_secs(3)).await;

        assert!(!reached);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_polls_once() {
        let (polls, accessor) = sequence(vec!["Deploying"]);
        let reached = wait_for(accessor, &"Deployed", &[], Duration::ZERO, Duration::from_secs(1)).await;
        assert!(!reached);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}
