use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            initial_interval_ms: 100,
            max_interval_ms: 500,
            use_exponential_backoff: true,
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Default::default()
        }
    }
}

/// Calls `check_fn` until it returns `true` or the timeout is reached.
///
/// The check always runs at least once, so a zero timeout is a single probe.
pub async fn wait_until<F, Fut>(check_fn: F, config: PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut interval = config.initial_interval_ms.max(1);

    loop {
        if check_fn().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }

        tokio::time::sleep(Duration::from_millis(interval)).await;

        if config.use_exponential_backoff {
            interval = (interval * 3 / 2).min(config.max_interval_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_until_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let met = wait_until(
            move || async move { calls.fetch_add(1, Ordering::SeqCst) >= 2 },
            PollConfig {
                timeout_ms: 2000,
                initial_interval_ms: 1,
                max_interval_ms: 2,
                use_exponential_backoff: true,
            },
        )
        .await;
        assert!(met);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let met = wait_until(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            },
            PollConfig::with_timeout(0),
        )
        .await;
        assert!(!met);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
