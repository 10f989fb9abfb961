//! Bounded polling with an injectable sleep

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use nimbus_common::{NimbusError, Result};

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleep on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Re-checks a condition at a fixed interval until it yields a value or the
/// wait budget is spent
#[derive(Clone)]
pub struct Poller {
    max_wait: Duration,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Poller {
    pub fn new(max_wait: Duration, interval: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            max_wait,
            interval: interval.max(Duration::from_millis(1)),
            sleeper,
        }
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `check` until it returns `Some`
    ///
    /// The budget is counted in slept intervals, not wall time. Running out
    /// is a [`NimbusError::Timeout`]; errors from `check` end the wait at once.
    pub async fn until<T, F, Fut>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            if waited >= self.max_wait {
                return Err(NimbusError::Timeout(format!(
                    "{} not available after {}s",
                    what,
                    self.max_wait.as_secs()
                )));
            }
            debug!(waited_secs = waited.as_secs(), "Waiting for {}", what);
            self.sleeper.sleep(self.interval).await;
            waited += self.interval;
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("max_wait", &self.max_wait)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts sleeps without waiting
    #[derive(Default)]
    pub(crate) struct CountingSleeper {
        pub(crate) sleeps: AtomicUsize,
    }

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
    }

    fn poller(sleeper: Arc<CountingSleeper>) -> Poller {
        Poller::new(Duration::from_secs(120), Duration::from_secs(2), sleeper)
    }

    #[tokio::test]
    async fn test_returns_when_ready() {
        let sleeper = Arc::new(CountingSleeper::default());
        let calls = &AtomicUsize::new(0);
        let value = poller(sleeper.clone())
            .until("project id", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok((n == 3).then_some("p1"))
            })
            .await
            .unwrap();
        assert_eq!(value, "p1");
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_times_out_after_budget() {
        let sleeper = Arc::new(CountingSleeper::default());
        let err = poller(sleeper.clone())
            .until("project id", || async { Ok(None::<String>) })
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::Timeout(_)));
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 60);
    }

    #[tokio::test]
    async fn test_check_error_stops_waiting() {
        let sleeper = Arc::new(CountingSleeper::default());
        let err = poller(sleeper.clone())
            .until("project id", || async {
                Err::<Option<String>, _>(NimbusError::Store("down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::Store(_)));
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 0);
    }
}
