use journey_store::app_config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// How hard an update keeps trying when its conditional write is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total conditional-write attempts, including the first. At least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Overall budget for one update call, checked before each retry sleep.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            deadline: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the `attempt`-th rejected write: exponential in the attempt
    /// number, capped at `max_backoff`, with the upper half jittered so that
    /// writers who collided do not collide again in lockstep.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.as_millis() as u64;
        let cap = self.max_backoff.as_millis() as u64;
        let exp = base
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
            .min(cap);

        if exp == 0 {
            return Duration::ZERO;
        }

        let floor = exp / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor..=exp))
    }
}
