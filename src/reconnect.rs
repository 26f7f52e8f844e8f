//! Reconnect backoff schedule.
//!
//! Two independent sequences advance once per failed cycle:
//! - the sleep between attempts doubles up to a ceiling (1, 2, 4, ... 120 s)
//! - the per-attempt connect timeout grows linearly up to a ceiling
//!   (2, 3, 4, ... 10 s)

use std::time::Duration;

use crate::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    wait: Duration,
    max_wait: Duration,
    connect_timeout: Duration,
    max_connect_timeout: Duration,
    timeout_step: Duration,
    failures: u32,
}

impl ReconnectSchedule {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            wait: config.initial_reconnect_wait.min(config.max_reconnect_wait),
            max_wait: config.max_reconnect_wait,
            connect_timeout: config
                .initial_connect_timeout
                .min(config.max_connect_timeout),
            max_connect_timeout: config.max_connect_timeout,
            timeout_step: config.connect_timeout_step,
            failures: 0,
        }
    }

    /// Sleep before the next attempt.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Timeout for the next connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Number of failed cycles so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed cycle.
    pub fn advance(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.wait = self.wait.saturating_mul(2).min(self.max_wait);
        self.connect_timeout = (self.connect_timeout + self.timeout_step).min(self.max_connect_timeout);
    }
}
