//! Gateway configuration.
//!
//! Loaded from an optional TOML file, then overridden by flags and
//! environment variables in the binary.
//!
//! ```toml
//! port = 8000
//! upstream_timeout_secs = 30
//!
//! [backends]
//! auth = "http://auth:8001"
//! patient = "http://patient:8002"
//!
//! [rate_limit]
//! requests_per_second = 10.0
//! burst = 20
//! sweep_interval_secs = 300
//! ```

use std::path::Path;
use std::time::Duration;

use axum::http::Uri;
pub use healthbar_core::config::ConfigError;
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;

/// Base URLs of the five backend services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendUrls {
    pub auth: String,
    pub patient: String,
    pub doctor: String,
    pub timeline: String,
    pub prescription: String,
}

impl Default for BackendUrls {
    fn default() -> Self {
        Self {
            auth: "http://localhost:8001".to_string(),
            patient: "http://localhost:8002".to_string(),
            doctor: "http://localhost:8003".to_string(),
            timeline: "http://localhost:8004".to_string(),
            prescription: "http://localhost:8005".to_string(),
        }
    }
}

impl BackendUrls {
    /// `(service name, base URL)` pairs.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("auth", self.auth.as_str()),
            ("patient", self.patient.as_str()),
            ("doctor", self.doctor.as_str()),
            ("timeline", self.timeline.as_str()),
            ("prescription", self.prescription.as_str()),
        ]
    }
}

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSettings {
    /// Refill rate R in tokens per second.
    pub requests_per_second: f64,
    /// Bucket capacity B.
    pub burst: u32,
    /// How often full buckets are dropped.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
            sweep_interval_secs: 300,
        }
    }
}

impl RateLimitSettings {
    #[must_use]
    pub const fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            refill_per_sec: self.requests_per_second,
            burst: self.burst,
        }
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub port: u16,
    pub backends: BackendUrls,
    pub rate_limit: RateLimitSettings,
    /// Deadline for a backend's response headers. `None` leaves requests
    /// unbounded.
    pub upstream_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            backends: BackendUrls::default(),
            rate_limit: RateLimitSettings::default(),
            upstream_timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    /// Checks value ranges and backend URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.rate_limit;
        if !limits.requests_per_second.is_finite() || limits.requests_per_second <= 0.0 {
            return Err(ConfigError::Invalid(
                "rate_limit.requests_per_second must be positive".to_string(),
            ));
        }
        if limits.burst == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.burst must be at least 1".to_string(),
            ));
        }
        if limits.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.upstream_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "upstream_timeout_secs must be positive".to_string(),
            ));
        }
        for (name, url) in self.backends.entries() {
            let uri: Uri = url
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("backends.{name}: invalid URL {url}")))?;
            if uri.scheme_str() != Some("http") || uri.authority().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "backends.{name}: expected an http:// URL, got {url}"
                )));
            }
        }
        Ok(())
    }
}
