use std::env;
use std::time::Duration;

use crate::jobs::Timeouts;
use crate::{Error, Result};

/// Connection and wait settings for the live Linode API.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_url: String,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub resize_minutes_per_gb: u64,
}

impl Settings {
    /// Create from env vars:
    ///
    /// - `LINODE_API_KEY` (required)
    /// - `LINODE_API_URL` (default: `https://api.linode.com/`)
    /// - `LINODE_JOB_TIMEOUT_SECS` (default: `300`)
    /// - `LINODE_POLL_INTERVAL_SECS` (default: `1`)
    /// - `LINODE_RESIZE_MINUTES_PER_GB` (default: `3`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key =
            env::var("LINODE_API_KEY").map_err(|_| Error::MissingEnv("LINODE_API_KEY".into()))?;

        let api_url =
            env::var("LINODE_API_URL").unwrap_or_else(|_| linode_api::DEFAULT_BASE_URL.into());

        Ok(Self {
            api_key,
            api_url,
            job_timeout: Duration::from_secs(env_u64("LINODE_JOB_TIMEOUT_SECS", 300)?),
            poll_interval: Duration::from_secs(env_u64("LINODE_POLL_INTERVAL_SECS", 1)?),
            resize_minutes_per_gb: env_u64("LINODE_RESIZE_MINUTES_PER_GB", 3)?,
        })
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            standard: self.job_timeout,
            resize_per_gb: Duration::from_secs(self.resize_minutes_per_gb * 60),
        }
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64> {
    parse_u64(var, env::var(var).ok(), default)
}

/// Unset means `default`; anything set must parse.
fn parse_u64(var: &'static str, raw: Option<String>, default: u64) -> Result<u64> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_from_settings() {
        let settings = Settings {
            api_key: "k".into(),
            api_url: linode_api::DEFAULT_BASE_URL.into(),
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            resize_minutes_per_gb: 3,
        };
        let timeouts = settings.timeouts();
        assert_eq!(timeouts.standard, Duration::from_secs(300));
        assert_eq!(timeouts.resize_per_gb, Duration::from_secs(180));
    }

    #[test]
    fn unset_values_take_the_default() {
        assert_eq!(parse_u64("LINODE_JOB_TIMEOUT_SECS", None, 300).unwrap(), 300);
        assert_eq!(
            parse_u64("LINODE_JOB_TIMEOUT_SECS", Some("600".into()), 300).unwrap(),
            600
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = parse_u64("LINODE_JOB_TIMEOUT_SECS", Some("5m".into()), 300).unwrap_err();
        match &err {
            Error::InvalidEnv { var, value } => {
                assert_eq!(*var, "LINODE_JOB_TIMEOUT_SECS");
                assert_eq!(value, "5m");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("LINODE_JOB_TIMEOUT_SECS"));

        assert!(parse_u64("LINODE_POLL_INTERVAL_SECS", Some("-1".into()), 1).is_err());
    }
}
