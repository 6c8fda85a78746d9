//! Lease timing configuration.
//!
//! Defaults favour fast failover: a 2 second lease renewed every second, so
//! a holder survives one missed renewal before another instance may steal
//! the lock. Every option can be overridden through the environment:
//!
//! - `LEASEHOLD_LEASE_TTL_SECS` (default 2)
//! - `LEASEHOLD_RENEWAL_PERIOD_MS` (default 1000)
//! - `LEASEHOLD_POLL_INTERVAL_MS` (default 100)
//! - `LEASEHOLD_SWEEP_PERIOD_SECS` (default 3600)
//! - `LEASEHOLD_SWEEP_GRACE_SECS` (default 3600)

use std::time::Duration;

use serde::Serialize;

pub const ENV_LEASE_TTL_SECS: &str = "LEASEHOLD_LEASE_TTL_SECS";
pub const ENV_RENEWAL_PERIOD_MS: &str = "LEASEHOLD_RENEWAL_PERIOD_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "LEASEHOLD_POLL_INTERVAL_MS";
pub const ENV_SWEEP_PERIOD_SECS: &str = "LEASEHOLD_SWEEP_PERIOD_SECS";
pub const ENV_SWEEP_GRACE_SECS: &str = "LEASEHOLD_SWEEP_GRACE_SECS";

/// Errors from reading or validating a [`LockConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed as a number.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    /// The combination of values cannot work.
    #[error("{0}")]
    Invalid(String),
}

/// Timing knobs for leases and the expired-row sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockConfig {
    /// How long a holder may stay silent before another instance may steal.
    pub lease_ttl_secs: u32,
    /// How often an active lease handle renews.
    pub renewal_period: Duration,
    /// Poll granularity of `LeaseHandle::lock_blocking`.
    pub poll_interval: Duration,
    /// How often the coordinator sweeps long-expired rows.
    pub sweep_period: Duration,
    /// Rows are swept only once they have been expired this long.
    pub sweep_grace_secs: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            lease_ttl_secs: 2,
            renewal_period: Duration::from_millis(1_000),
            poll_interval: Duration::from_millis(100),
            sweep_period: Duration::from_secs(60 * 60),
            sweep_grace_secs: 60 * 60,
        }
    }
}

impl LockConfig {
    /// Defaults overridden by any `LEASEHOLD_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LockConfig::default();

        if let Some(v) = parse::<u32, _>(&lookup, ENV_LEASE_TTL_SECS)? {
            config.lease_ttl_secs = v;
        }
        if let Some(v) = parse::<u64, _>(&lookup, ENV_RENEWAL_PERIOD_MS)? {
            config.renewal_period = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64, _>(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64, _>(&lookup, ENV_SWEEP_PERIOD_SECS)? {
            config.sweep_period = Duration::from_secs(v);
        }
        if let Some(v) = parse::<u32, _>(&lookup, ENV_SWEEP_GRACE_SECS)? {
            config.sweep_grace_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// The lease TTL as a `Duration`.
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.lease_ttl_secs))
    }

    /// Rejects settings under which a healthy holder could lose its lease.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_ttl_secs == 0 {
            return Err(ConfigError::Invalid("lease TTL must be at least 1 second".into()));
        }
        if self.renewal_period.is_zero() {
            return Err(ConfigError::Invalid("renewal period must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        if self.sweep_period.is_zero() {
            return Err(ConfigError::Invalid("sweep period must be non-zero".into()));
        }
        if self.renewal_period >= self.lease_ttl() {
            return Err(ConfigError::Invalid(format!(
                "renewal period {:?} must be shorter than lease TTL {:?}",
                self.renewal_period,
                self.lease_ttl()
            )));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
