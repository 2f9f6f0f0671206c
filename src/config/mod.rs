//! Typed configuration from environment variables and an optional policy
//! file.
//!
//! Loads once at startup, fails fast if required values are missing.
//! The database URL is wrapped in `SecretString` so it never reaches logs.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub policy: QueuePolicy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables alone.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration, reading queue policy from `policy_file` first and
    /// letting environment variables override it.
    pub fn load(policy_file: Option<&Path>) -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            policy: QueuePolicy::load(policy_file)?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Retry and housekeeping policy for the queue.
///
/// `max_retries` has no default: the number of failures an element may
/// report before it stays `Failed` is a deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// An element that has failed at most this many times returns to
    /// `Available`.
    pub max_retries: u32,
    /// Age at which an unchanged `Negotiating`/`Acquired`/`Running`
    /// element counts as stuck.
    pub stale_after: Option<Duration>,
    /// Age after which settled elements may be purged.
    pub retention: Option<Duration>,
}

/// On-disk shape of the policy file; also the shape of the environment
/// overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    max_retries: Option<u32>,
    stale_after_secs: Option<u64>,
    retention_secs: Option<u64>,
}

impl QueuePolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            stale_after: None,
            retention: None,
        }
    }

    pub fn stale_after(mut self, window: Duration) -> Self {
        self.stale_after = Some(window);
        self
    }

    pub fn retention(mut self, window: Duration) -> Self {
        self.retention = Some(window);
        self
    }

    /// Read `policy_file` (if any), then apply `WORKQUEUE_MAX_RETRIES`,
    /// `WORKQUEUE_STALE_AFTER_SECS` and `WORKQUEUE_RETENTION_SECS`.
    pub fn load(policy_file: Option<&Path>) -> Result<Self> {
        let file = match policy_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read policy file {}: {e}", path.display()))
                })?;
                parse_policy(&text)?
            }
            None => PolicyFile::default(),
        };
        let env = PolicyFile {
            max_retries: optional_var("WORKQUEUE_MAX_RETRIES")?,
            stale_after_secs: optional_var("WORKQUEUE_STALE_AFTER_SECS")?,
            retention_secs: optional_var("WORKQUEUE_RETENTION_SECS")?,
        };
        resolve(file, env)
    }

    /// Parse a TOML policy document on its own.
    pub fn from_toml(text: &str) -> Result<Self> {
        resolve(parse_policy(text)?, PolicyFile::default())
    }
}

fn parse_policy(text: &str) -> Result<PolicyFile> {
    toml::from_str(text).map_err(|e| Error::Config(format!("invalid policy file: {e}")))
}

fn resolve(file: PolicyFile, env: PolicyFile) -> Result<QueuePolicy> {
    let max_retries = env.max_retries.or(file.max_retries).ok_or_else(|| {
        Error::Config(
            "max_retries is not configured; set WORKQUEUE_MAX_RETRIES or max_retries in the policy file"
                .to_string(),
        )
    })?;
    Ok(QueuePolicy {
        max_retries,
        stale_after: env
            .stale_after_secs
            .or(file.stale_after_secs)
            .map(Duration::from_secs),
        retention: env
            .retention_secs
            .or(file.retention_secs)
            .map(Duration::from_secs),
    })
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_file_provides_every_field() {
        let policy = QueuePolicy::from_toml(
            "max_retries = 3\nstale_after_secs = 600\nretention_secs = 86400\n",
        )
        .unwrap();
        assert_eq!(
            policy,
            QueuePolicy::new(3)
                .stale_after(Duration::from_secs(600))
                .retention(Duration::from_secs(86400))
        );
    }

    #[test]
    fn max_retries_has_no_default() {
        let err = QueuePolicy::from_toml("stale_after_secs = 60").unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }

    #[test]
    fn environment_overrides_file() {
        let file = parse_policy("max_retries = 1\nretention_secs = 10").unwrap();
        let env = PolicyFile {
            max_retries: Some(5),
            ..PolicyFile::default()
        };
        let policy = resolve(file, env).unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.retention, Some(Duration::from_secs(10)));
        assert_eq!(policy.stale_after, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(QueuePolicy::from_toml("max_retries = 1\nmax_retry = 2").is_err());
    }
}
