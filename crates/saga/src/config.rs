//! Timing configuration for payment sessions.

use std::time::Duration;

/// Default interval between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default hard bound on waiting for a payment.
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default bound on a single gateway call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing knobs shared by the session controller and the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub payment_timeout: Duration,
    /// Kept short so a slow gateway cannot stall the poll cadence.
    pub query_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.payment_timeout, Duration::from_secs(600));
        assert_eq!(config.query_timeout, Duration::from_secs(5));
    }
}
