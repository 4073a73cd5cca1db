//! Reconciliation configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::domain::{AnchorError, DEFAULT_TOLERANCE_SECS};

/// Tunables for submission polling and verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Accepted `|anchored - recorded|` in seconds.
    pub tolerance_secs: u64,

    /// Seconds between receipt polls.
    pub poll_interval_secs: u64,

    /// Maximum seconds to wait for a receipt.
    pub max_poll_wait_secs: u64,

    /// Submission attempts before giving up.
    pub submit_attempts: u32,

    /// Delay before the first submission retry, doubled per retry.
    pub submit_backoff_ms: u64,

    /// Deadline for one transaction lookup.
    pub lookup_timeout_secs: u64,

    /// Records verified in parallel by verify-all.
    pub verify_concurrency: usize,

    /// Per-request timeout of the HTTP adapters.
    pub request_timeout_secs: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            poll_interval_secs: 30,
            max_poll_wait_secs: 30 * 60,
            submit_attempts: 3,
            submit_backoff_ms: 2_000,
            lookup_timeout_secs: 30,
            verify_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl AnchorConfig {
    /// Create config for testing with short waits.
    pub fn for_testing() -> Self {
        Self {
            poll_interval_secs: 1,
            max_poll_wait_secs: 10,
            submit_backoff_ms: 10,
            lookup_timeout_secs: 5,
            request_timeout_secs: 5,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QA_TOLERANCE_SECS` (default: 1200)
    /// - `QA_POLL_INTERVAL_SECS` (default: 30)
    /// - `QA_MAX_POLL_WAIT_SECS` (default: 1800)
    /// - `QA_SUBMIT_ATTEMPTS` (default: 3)
    /// - `QA_SUBMIT_BACKOFF_MS` (default: 2000)
    /// - `QA_LOOKUP_TIMEOUT_SECS` (default: 30)
    /// - `QA_VERIFY_CONCURRENCY` (default: 4)
    /// - `QA_REQUEST_TIMEOUT_SECS` (default: 30)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the `QA_` names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        let d = Self::default();
        Self {
            tolerance_secs: parsed(lookup("QA_TOLERANCE_SECS"), d.tolerance_secs),
            poll_interval_secs: parsed(lookup("QA_POLL_INTERVAL_SECS"), d.poll_interval_secs),
            max_poll_wait_secs: parsed(lookup("QA_MAX_POLL_WAIT_SECS"), d.max_poll_wait_secs),
            submit_attempts: parsed(lookup("QA_SUBMIT_ATTEMPTS"), d.submit_attempts),
            submit_backoff_ms: parsed(lookup("QA_SUBMIT_BACKOFF_MS"), d.submit_backoff_ms),
            lookup_timeout_secs: parsed(lookup("QA_LOOKUP_TIMEOUT_SECS"), d.lookup_timeout_secs),
            verify_concurrency: parsed(lookup("QA_VERIFY_CONCURRENCY"), d.verify_concurrency),
            request_timeout_secs: parsed(
                lookup("QA_REQUEST_TIMEOUT_SECS"),
                d.request_timeout_secs,
            ),
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), AnchorError> {
        if self.poll_interval_secs == 0 {
            return Err(AnchorError::Config("poll interval must be positive".to_string()));
        }
        if self.max_poll_wait_secs < self.poll_interval_secs {
            return Err(AnchorError::Config(format!(
                "max poll wait {}s is shorter than the poll interval {}s",
                self.max_poll_wait_secs, self.poll_interval_secs
            )));
        }
        if self.submit_attempts == 0 {
            return Err(AnchorError::Config("at least one submit attempt is required".to_string()));
        }
        if self.verify_concurrency == 0 {
            return Err(AnchorError::Config("verify concurrency must be positive".to_string()));
        }
        if self.lookup_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(AnchorError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Interval between receipt polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Receipt polling budget.
    pub fn max_poll_wait(&self) -> Duration {
        Duration::from_secs(self.max_poll_wait_secs)
    }

    /// Initial submit retry delay.
    pub fn submit_backoff(&self) -> Duration {
        Duration::from_millis(self.submit_backoff_ms)
    }

    /// Transaction lookup deadline.
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
