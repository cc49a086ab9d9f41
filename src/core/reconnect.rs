use std::time::Duration;

use unidl_core::models::settings::TrackerSettings;

const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// When to reopen a dropped channel. Fixed delay, no backoff growth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn from_settings(settings: &TrackerSettings) -> Self {
        Self {
            delay: settings.reconnect_delay(),
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay before reconnect attempt number `attempt` (1-based, counted
    /// since the last successful open), or `None` to stop trying.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.delay),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retries_forever_every_three_seconds() {
        let policy = ReconnectPolicy::default();
        for attempt in [1, 2, 10, 10_000, u32::MAX] {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(3)));
        }
    }

    #[test]
    fn bounded_policy_stops_after_cap() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for(3), None);
    }

    #[test]
    fn reads_settings() {
        let settings = TrackerSettings {
            reconnect_delay_ms: 250,
            max_reconnect_attempts: Some(4),
            ..TrackerSettings::default()
        };
        let policy = ReconnectPolicy::from_settings(&settings);
        assert_eq!(policy.delay(), Duration::from_millis(250));
        assert_eq!(policy.delay_for(5), None);
    }
}
