//! Task execution settings

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::{Poller, Sleeper};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Worker tasks draining the queue; 0 runs tasks inline
    pub queue_workers: usize,
    pub queue_capacity: usize,
    /// How long `add_user` waits for activation to record a project
    pub user_wait_timeout_secs: u64,
    pub user_wait_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            queue_workers: 0,
            queue_capacity: 256,
            user_wait_timeout_secs: 120,
            user_wait_interval_secs: 2,
        }
    }
}

impl TaskConfig {
    pub fn user_poller(&self, sleeper: Arc<dyn Sleeper>) -> Poller {
        Poller::new(
            Duration::from_secs(self.user_wait_timeout_secs),
            Duration::from_secs(self.user_wait_interval_secs),
            sleeper,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::TokioSleeper;

    #[test]
    fn test_defaults() {
        let config: TaskConfig = serde_json::from_str(r#"{"queue_workers": 3}"#).unwrap();
        assert_eq!(config.queue_workers, 3);
        assert_eq!(config.user_wait_timeout_secs, 120);

        let poller = config.user_poller(Arc::new(TokioSleeper));
        assert_eq!(poller.max_wait(), Duration::from_secs(120));
        assert_eq!(poller.interval(), Duration::from_secs(2));
    }
}
