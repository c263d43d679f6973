use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long the workflow keeps polling a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of submission/job status rounds
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between rounds in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Whether to double the delay after every round
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Upper bound for the delay in milliseconds
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    60
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_max_interval_ms() -> u64 {
    30000
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            exponential_backoff: false,
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl PollPolicy {
    /// One round trip, no waiting
    pub fn single_shot() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: interval.as_millis() as u64,
            exponential_backoff: false,
            max_interval_ms: default_max_interval_ms().max(interval.as_millis() as u64),
        }
    }

    /// Number of rounds to run; at least one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after round `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay_ms = if self.exponential_backoff {
            let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
            self.interval_ms.saturating_mul(factor)
        } else {
            self.interval_ms
        };

        Duration::from_millis(delay_ms.min(self.max_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = PollPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(3), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = PollPolicy {
            max_attempts: 10,
            interval_ms: 1000,
            exponential_backoff: true,
            max_interval_ms: 5000,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_after(64), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_attempts_still_polls_once() {
        let policy = PollPolicy {
            max_attempts: 0,
            ..PollPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(PollPolicy::single_shot().attempts(), 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let policy: PollPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval_ms, 5000);
        assert!(!policy.exponential_backoff);
    }
}
