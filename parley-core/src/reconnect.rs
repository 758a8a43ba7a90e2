//! Reconnection policy for transports

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of reconnection attempts after a connection is lost
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnection attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Reconnection settings handed to a transport at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether the transport reconnects on its own after losing the connection
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Attempts allowed before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before each attempt
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub delay: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay() -> Duration {
    DEFAULT_DELAY
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_attempts: default_max_attempts(),
            delay: default_delay(),
        }
    }
}

impl ReconnectConfig {
    /// A policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Tracks reconnection attempts against a [`ReconnectConfig`]
///
/// Attempts are counted from the last successful connection; call
/// [`reset`](ReconnectBudget::reset) whenever a connection is established.
#[derive(Debug)]
pub struct ReconnectBudget {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectBudget {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Consume one attempt.
    ///
    /// Returns `Some((attempt, delay))` when another attempt is allowed, with
    /// `attempt` counted from 1, or `None` when reconnection is disabled or
    /// the budget is exhausted.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if !self.config.enabled || self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.config.delay))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
