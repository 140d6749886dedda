use clap::{Args, Parser};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::Result;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.brawlstars.com/v1";

/// Process configuration, read from flags with environment fallbacks.
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "brawl-proxy", version, about)]
pub struct Config {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "BIND_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_host: IpAddr,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(flatten)]
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    #[command(flatten)]
    #[validate(nested)]
    pub limiter: LimiterConfig,
}

impl Config {
    /// Load configuration from command line and environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }
}

/// Where and how to reach the upstream API.
#[derive(Clone, Args, Validate)]
pub struct UpstreamConfig {
    /// Bearer credential attached to every upstream request
    #[arg(long = "api-key", env = "BRAWL_STARS_API_KEY", hide_env_values = true)]
    #[validate(length(min = 1, message = "BRAWL_STARS_API_KEY must not be empty"))]
    pub api_key: String,

    #[arg(long = "upstream-base-url", env = "UPSTREAM_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
    #[validate(url)]
    pub base_url: String,

    #[arg(
        long = "upstream-timeout",
        env = "UPSTREAM_TIMEOUT",
        default_value = "10s",
        value_parser = humantime_serde::re::humantime::parse_duration
    )]
    #[validate(custom(function = "non_zero_duration"))]
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Token bucket parameters shared by every client identity.
#[derive(Debug, Clone, Args, Validate, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Requests allowed per interval for one client
    #[arg(long = "rate-limit-capacity", env = "RATE_LIMIT_CAPACITY", default_value_t = 30)]
    #[validate(range(min = 1, message = "rate limit capacity must be greater than 0"))]
    pub capacity: u32,

    /// Refill period; a full interval restores the whole capacity
    #[arg(
        long = "rate-limit-interval",
        env = "RATE_LIMIT_INTERVAL",
        default_value = "1m",
        value_parser = humantime_serde::re::humantime::parse_duration
    )]
    #[validate(custom(function = "non_zero_duration"))]
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Buckets untouched for longer than this are dropped by the sweep
    #[arg(
        long = "rate-limit-idle-ttl",
        env = "RATE_LIMIT_IDLE_TTL",
        default_value = "10m",
        value_parser = humantime_serde::re::humantime::parse_duration
    )]
    #[validate(custom(function = "non_zero_duration"))]
    #[serde(with = "humantime_serde")]
    pub idle_ttl: Duration,

    /// How often the sweep runs
    #[arg(
        long = "rate-limit-sweep-period",
        env = "RATE_LIMIT_SWEEP_PERIOD",
        default_value = "5m",
        value_parser = humantime_serde::re::humantime::parse_duration
    )]
    #[validate(custom(function = "non_zero_duration"))]
    #[serde(with = "humantime_serde")]
    pub sweep_period: Duration,
}

impl LimiterConfig {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity,
            interval,
            ..Self::default()
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn with_sweep_period(mut self, sweep_period: Duration) -> Self {
        self.sweep_period = sweep_period;
        self
    }

    /// Seconds a denied client is told to wait: one interval, at least 1s.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.interval.as_secs();
        let secs = if self.interval.subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(10 * 60),
            sweep_period: Duration::from_secs(5 * 60),
        }
    }
}

fn non_zero_duration(value: &Duration) -> std::result::Result<(), ValidationError> {
    if value.is_zero() {
        let mut err = ValidationError::new("non_zero_duration");
        err.message = Some("duration must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["brawl-proxy", "--api-key", "test-key"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_BASE_URL);
        assert_eq!(config.upstream.timeout, Duration::from_secs(10));
        assert_eq!(config.limiter.capacity, 30);
        assert_eq!(config.limiter.interval, Duration::from_secs(60));
        assert_eq!(config.limiter.idle_ttl, Duration::from_secs(600));
        assert_eq!(config.limiter.sweep_period, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_humantime_durations() {
        let config = parse(&[
            "--rate-limit-interval",
            "90s",
            "--rate-limit-idle-ttl",
            "1h",
            "--upstream-timeout",
            "2500ms",
        ]);
        assert_eq!(config.limiter.interval, Duration::from_secs(90));
        assert_eq!(config.limiter.idle_ttl, Duration::from_secs(3600));
        assert_eq!(config.upstream.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_limiter_config() {
        assert!(LimiterConfig::new(0, Duration::from_secs(60)).validate().is_err());
        assert!(LimiterConfig::new(30, Duration::ZERO).validate().is_err());
        assert!(LimiterConfig::default()
            .with_sweep_period(Duration::ZERO)
            .validate()
            .is_err());
        assert!(LimiterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_upstream_config() {
        assert!(UpstreamConfig::new("", DEFAULT_UPSTREAM_BASE_URL).validate().is_err());
        assert!(UpstreamConfig::new("key", "not a url").validate().is_err());
        assert!(UpstreamConfig::new("key", "http://127.0.0.1:9000/v1").validate().is_ok());
    }

    #[test]
    fn test_empty_api_key_rejected_by_nested_validation() {
        let config = Config::try_parse_from(["brawl-proxy", "--api-key", ""]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_after_secs() {
        assert_eq!(LimiterConfig::default().retry_after_secs(), 60);
        assert_eq!(
            LimiterConfig::new(5, Duration::from_millis(1500)).retry_after_secs(),
            2
        );
        assert_eq!(
            LimiterConfig::new(5, Duration::from_millis(200)).retry_after_secs(),
            1
        );
    }

    #[test]
    fn test_limiter_config_serializes_humantime() {
        let json = serde_json::to_value(LimiterConfig::default()).unwrap();
        assert_eq!(json["capacity"], 30);
        assert_eq!(json["interval"], "1m");
        assert_eq!(json["idle_ttl"], "10m");
        assert_eq!(json["sweep_period"], "5m");
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let upstream = UpstreamConfig::new("super-secret", DEFAULT_UPSTREAM_BASE_URL);
        let debug = format!("{:?}", upstream);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
