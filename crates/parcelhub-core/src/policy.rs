use std::time::Duration;

/// Per-carrier call budget: request quota and per-call timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierPolicy {
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub call_timeout: Duration,
    pub retry_backoff: BackoffPolicy,
}

/// Backoff advertised to callers when the quota is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl CarrierPolicy {
    pub fn sendcloud_default() -> Self {
        Self {
            quota_window: Duration::from_secs(60),
            quota_limit: 300,
            call_timeout: Duration::from_secs(8),
            retry_backoff: BackoffPolicy::default(),
        }
    }

    pub fn dhl_default() -> Self {
        Self {
            quota_window: Duration::from_secs(60),
            quota_limit: 120,
            call_timeout: Duration::from_secs(10),
            retry_backoff: BackoffPolicy::default(),
        }
    }

    pub fn ups_default() -> Self {
        Self {
            quota_window: Duration::from_secs(1),
            quota_limit: 10,
            call_timeout: Duration::from_secs(8),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.call_timeout.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ups_policy_matches_per_second_limits() {
        let policy = CarrierPolicy::ups_default();
        assert_eq!(policy.quota_window, Duration::from_secs(1));
        assert_eq!(policy.quota_limit, 10);
        assert_eq!(policy.timeout_ms(), 8_000);
    }

    #[test]
    fn call_timeout_can_be_overridden() {
        let policy = CarrierPolicy::dhl_default().with_call_timeout(Duration::from_millis(2_500));
        assert_eq!(policy.timeout_ms(), 2_500);
    }
}
