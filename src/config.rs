//! Configuration for the limiter, the registry and the gate.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [rate_limit]
//! max_rate = 20
//! period_secs = 60
//! max_burst = 5
//! failure_policy = "closed"
//! vary_by = ["path", "method", "header:x-forwarded-for"]
//!
//! [session]
//! ttl_secs = 2592000
//! refresh_secs = 2592000
//! policy = "single"
//!
//! [headers]
//! client_token = "X-Client-Token"
//! ```

use crate::error::ConfigError;
use crate::rate_limit::gcra::DEFAULT_MAX_CAS_ATTEMPTS;
use crate::rate_limit::{FailurePolicy, Quota, Rate, VaryBy};
use crate::session::{SessionPolicy, DEFAULT_SESSION_TTL};
use http::header::HeaderName;
use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Request admission.
    pub rate_limit: RateLimitConfig,
    /// Session lifetime and policy.
    pub session: SessionConfig,
    /// Header names.
    pub headers: HeaderConfig,
}

/// GCRA quota and limiter behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Events per period.
    pub max_rate: u32,
    /// Period length in seconds.
    pub period_secs: u64,
    /// Extra burst on top of one period's worth.
    pub max_burst: u32,
    /// Bound on compare-and-swap attempts per check.
    pub max_cas_attempts: usize,
    /// Behavior when the counter store fails.
    pub failure_policy: FailurePolicy,
    /// Key dimensions: `path`, `method`, or `header:<name>`.
    pub vary_by: Vec<String>,
    /// Background sweep period for the in-memory store; `0` disables it.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_rate: 20,
            period_secs: 60,
            max_burst: 5,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            failure_policy: FailurePolicy::Closed,
            vary_by: vec!["path".into()],
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// Quota described by this section.
    pub fn quota(&self) -> Quota {
        Quota::new(Rate::new(self.max_rate, Duration::from_secs(self.period_secs)), self.max_burst)
    }

    /// Sweep period, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Key derivation described by `vary_by`.
    pub fn vary_by(&self) -> Result<VaryBy, ConfigError> {
        let mut vary = VaryBy {
            path: false,
            method: false,
            headers: Vec::new(),
            separator: "\n".into(),
        };
        for dim in &self.vary_by {
            match dim.as_str() {
                "path" => vary.path = true,
                "method" => vary.method = true,
                other => {
                    let name = other
                        .strip_prefix("header:")
                        .ok_or_else(|| ConfigError::Invalid(format!("unknown vary_by `{other}`")))?;
                    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
                        ConfigError::Invalid(format!("bad header name in vary_by `{other}`"))
                    })?;
                    vary.headers.push(name);
                }
            }
        }
        Ok(vary)
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Lifetime of a new session, seconds.
    pub ttl_secs: u64,
    /// Expiry extension on each successful authentication, seconds.
    pub refresh_secs: u64,
    /// Concurrent-session policy.
    pub policy: SessionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            refresh_secs: DEFAULT_SESSION_TTL.as_secs(),
            policy: SessionPolicy::Single,
        }
    }
}

impl SessionConfig {
    /// Lifetime of a new session.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Expiry extension applied by the gate.
    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

/// Header names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderConfig {
    /// Header carrying the client token.
    pub client_token: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            client_token: "X-Client-Token".into(),
        }
    }
}

impl HeaderConfig {
    /// Parsed client token header name.
    pub fn client_token_header(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::from_bytes(self.client_token.as_bytes())
            .map_err(|_| ConfigError::Invalid(format!("bad header name `{}`", self.client_token)))
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges and names that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rl = &self.rate_limit;
        if rl.max_rate == 0 || rl.period_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.max_rate and period_secs must be positive".into(),
            ));
        }
        if rl.max_cas_attempts == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_cas_attempts must be positive".into()));
        }
        if rl.vary_by.is_empty() {
            return Err(ConfigError::Invalid("rate_limit.vary_by must name a dimension".into()));
        }
        rl.vary_by()?;
        if self.session.ttl_secs == 0 || self.session.refresh_secs == 0 {
            return Err(ConfigError::Invalid("session ttl and refresh must be positive".into()));
        }
        self.headers.client_token_header()?;
        Ok(())
    }
}
