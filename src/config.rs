use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How the controller polls a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Consecutive failed progress checks tolerated before tracking is
    /// abandoned. Zero stops on the first failure.
    pub max_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: 0,
        }
    }
}

/// Connection settings for the scanner API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub csrf_token: Option<String>,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            csrf_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll: PollPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("api url must start with http:// or https:// (got {url:?})");
        }
        if self.poll.interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        if self.request_timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn api_root(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ClientConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.poll.interval, Duration::from_secs(2));
        assert_eq!(cfg.poll.max_retries, 0);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = ClientConfig {
            base_url: "ftp://scanner".into(),
            ..ClientConfig::default()
        };
        assert!(cfg.validate().is_err());
        cfg.base_url = "https://scanner.local/".into();
        cfg.poll.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_root_drops_trailing_slash() {
        let cfg = ClientConfig {
            base_url: "http://scanner.local:8000/".into(),
            ..ClientConfig::default()
        };
        assert_eq!(cfg.api_root(), "http://scanner.local:8000");
    }
}
