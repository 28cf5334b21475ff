//! Client configuration.
//!
//! Loaded from environment variables with defaults suitable for a local
//! agent stub.

use std::time::Duration;

use url::Url;

/// Default number of attempts before an agent is reported unavailable.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

pub const DEFAULT_RPC_ENDPOINT: &str = "http://127.0.0.1:3000/rpc";
pub const DEFAULT_TERMINAL_ENDPOINT: &str = "ws://127.0.0.1:3000";
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Retry policy for reads against a bootstrapping agent.
///
/// The delay is fixed; there is no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries while the agent reports unavailable.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Upper bound on time spent waiting before giving up.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("terminal endpoint must use ws or wss, got {0}")]
    UnsupportedScheme(String),

    #[error("retry max_attempts must be > 0")]
    ZeroAttempts,

    #[error("organization id is required")]
    MissingOrganization,
}

/// Configuration shared by dispatch, query and session components.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Base endpoint of the RPC transport.
    pub rpc_endpoint: Url,

    /// Base endpoint terminal sessions are opened under.
    pub terminal_endpoint: Url,

    /// Organization calls are made on behalf of.
    pub organization_id: String,

    /// Retry policy for reads.
    pub retry: RetryPolicy,
}

impl LinkConfig {
    /// Configuration for an agent stub on the local machine.
    ///
    /// # Errors
    /// Only fails if the built-in endpoints stop parsing.
    pub fn local() -> Result<Self, ConfigError> {
        Self::from_lookup(|_| None)
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `AGENT_LINK_RPC_ENDPOINT` | `http://127.0.0.1:3000/rpc` |
    /// | `AGENT_LINK_TERMINAL_ENDPOINT` | `ws://127.0.0.1:3000` |
    /// | `AGENT_LINK_ORG_ID` | `default` |
    /// | `AGENT_LINK_RETRY_MAX_ATTEMPTS` | `8` |
    /// | `AGENT_LINK_RETRY_DELAY_MS` | `3000` |
    ///
    /// # Errors
    /// Returns error if a variable is set but cannot be parsed, or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Same as [`LinkConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_endpoint = lookup("AGENT_LINK_RPC_ENDPOINT");
        let terminal_endpoint = lookup("AGENT_LINK_TERMINAL_ENDPOINT");
        let mut config = Self {
            rpc_endpoint: parse_url(
                "AGENT_LINK_RPC_ENDPOINT",
                rpc_endpoint.as_deref().unwrap_or(DEFAULT_RPC_ENDPOINT),
            )?,
            terminal_endpoint: parse_url(
                "AGENT_LINK_TERMINAL_ENDPOINT",
                terminal_endpoint
                    .as_deref()
                    .unwrap_or(DEFAULT_TERMINAL_ENDPOINT),
            )?,
            organization_id: lookup("AGENT_LINK_ORG_ID")
                .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
            retry: RetryPolicy::default(),
        };

        if let Some(value) = lookup("AGENT_LINK_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_number("AGENT_LINK_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("AGENT_LINK_RETRY_DELAY_MS") {
            let millis = parse_number("AGENT_LINK_RETRY_DELAY_MS", &value)?;
            config.retry.delay = Duration::from_millis(u64::from(millis));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the terminal endpoint.
    #[must_use]
    pub fn with_terminal_endpoint(mut self, endpoint: Url) -> Self {
        self.terminal_endpoint = endpoint;
        self
    }

    /// Set the organization.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = organization_id.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.terminal_endpoint.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.organization_id.trim().is_empty() {
            return Err(ConfigError::MissingOrganization);
        }
        Ok(())
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn parse_number(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LinkConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.delay, Duration::from_millis(3000));
        assert_eq!(config.retry.worst_case_wait(), Duration::from_secs(24));
        assert_eq!(config.terminal_endpoint.scheme(), "ws");
    }

    #[test]
    fn test_local_matches_empty_environment() {
        let config = LinkConfig::local().unwrap();
        assert_eq!(config.rpc_endpoint.as_str(), DEFAULT_RPC_ENDPOINT);
        assert_eq!(config.terminal_endpoint.as_str(), "ws://127.0.0.1:3000/");
        assert_eq!(config.organization_id, DEFAULT_ORGANIZATION);
    }

    #[test]
    fn test_overrides() {
        let config = LinkConfig::from_lookup(lookup(&[
            ("AGENT_LINK_TERMINAL_ENDPOINT", "wss://rmm.example.com/agent"),
            ("AGENT_LINK_ORG_ID", "acme"),
            ("AGENT_LINK_RETRY_MAX_ATTEMPTS", "3"),
            ("AGENT_LINK_RETRY_DELAY_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.terminal_endpoint.host_str(), Some("rmm.example.com"));
        assert_eq!(config.organization_id, "acme");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            LinkConfig::from_lookup(lookup(&[("AGENT_LINK_RETRY_MAX_ATTEMPTS", "0")])),
            Err(ConfigError::ZeroAttempts)
        ));
        assert!(matches!(
            LinkConfig::from_lookup(lookup(&[("AGENT_LINK_RETRY_DELAY_MS", "soon")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            LinkConfig::from_lookup(lookup(&[("AGENT_LINK_TERMINAL_ENDPOINT", "http://x")])),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}
