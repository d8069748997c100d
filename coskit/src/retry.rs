use coskit_core::Error;
use std::time::Duration;

/// Retry and host-failover behavior for one client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts allowed per logical operation, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub interval: Duration,
    /// Allow switching a recognized domain to its backup suffix when the
    /// primary path looks broken.
    pub enable_failover: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(1),
            enable_failover: true,
        }
    }
}

/// Book-keeping for one logical operation's pass through the retry loop.
/// Discarded when the operation terminates.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    pub(crate) attempts_made: u32,
    pub(crate) saw_request_id: bool,
    pub(crate) switched: bool,
    errors: Vec<Error>,
}

impl RetryState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_error(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub(crate) fn can_retry(&self, config: &RetryConfig) -> bool {
        self.attempts_made < config.max_attempts
    }

    /// Failover kicks in when failure persists into the second-to-last
    /// allowed attempt and the service's request id was never observed.
    pub(crate) fn should_failover(&self, config: &RetryConfig) -> bool {
        config.enable_failover
            && !self.switched
            && !self.saw_request_id
            && self.attempts_made == config.max_attempts.saturating_sub(1)
    }

    /// Fold every attempt's error into the value handed back to the caller.
    pub(crate) fn aggregate(mut self) -> Error {
        match self.errors.len() {
            0 => Error::unexpected("request failed with no recorded attempt"),
            1 => self.errors.remove(0),
            n => {
                let detail = self
                    .errors
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("attempt {}: {e}", i + 1))
                    .collect::<Vec<_>>()
                    .join("; ");
                Error::unexpected(format!("all {n} attempts failed: {detail}"))
            }
        }
    }
}
