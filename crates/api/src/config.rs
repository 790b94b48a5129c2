//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::{RetryPolicy, SettlementConfig};
use common::Money;
use domain::ShippingPolicy;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `REDIS_URL`: Redis URL; unset runs on the in-memory cart
/// - `SHIPPING_FEE_MINOR`: flat shipping surcharge (default `1000`)
/// - `RESERVATION_MAX_ATTEMPTS`, `RESERVATION_BASE_DELAY_MS`,
///   `RESERVATION_MAX_DELAY_MS`: stock conflict retry (default `3`, `5`, `100`)
/// - `SETTLEMENT_POLL_INTERVAL_MS`, `SETTLEMENT_MAX_WAIT_MS`: gateway polling
///   (default `5000`, `60000`)
/// - `GATEWAY_BASE_URL`: payment redirect prefix
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub shipping_fee_minor: i64,
    pub reservation_max_attempts: u32,
    pub reservation_base_delay_ms: u64,
    pub reservation_max_delay_ms: u64,
    pub settlement_poll_interval_ms: u64,
    pub settlement_max_wait_ms: u64,
    pub gateway_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            shipping_fee_minor: parse_or(&lookup, "SHIPPING_FEE_MINOR", defaults.shipping_fee_minor),
            reservation_max_attempts: parse_or(
                &lookup,
                "RESERVATION_MAX_ATTEMPTS",
                defaults.reservation_max_attempts,
            ),
            reservation_base_delay_ms: parse_or(
                &lookup,
                "RESERVATION_BASE_DELAY_MS",
                defaults.reservation_base_delay_ms,
            ),
            reservation_max_delay_ms: parse_or(
                &lookup,
                "RESERVATION_MAX_DELAY_MS",
                defaults.reservation_max_delay_ms,
            ),
            settlement_poll_interval_ms: parse_or(
                &lookup,
                "SETTLEMENT_POLL_INTERVAL_MS",
                defaults.settlement_poll_interval_ms,
            ),
            settlement_max_wait_ms: parse_or(
                &lookup,
                "SETTLEMENT_MAX_WAIT_MS",
                defaults.settlement_max_wait_ms,
            ),
            gateway_base_url: non_empty("GATEWAY_BASE_URL").unwrap_or(defaults.gateway_base_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy::flat(Money::from_minor(self.shipping_fee_minor))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.reservation_max_attempts)
            .with_delays(
                Duration::from_millis(self.reservation_base_delay_ms),
                Duration::from_millis(self.reservation_max_delay_ms),
            )
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            poll_interval: Duration::from_millis(self.settlement_poll_interval_ms),
            max_wait: Duration::from_millis(self.settlement_max_wait_ms),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            redis_url: None,
            shipping_fee_minor: domain::pricing::DEFAULT_SHIPPING_FEE_MINOR,
            reservation_max_attempts: 3,
            reservation_base_delay_ms: 5,
            reservation_max_delay_ms: 100,
            settlement_poll_interval_ms: 5_000,
            settlement_max_wait_ms: 60_000,
            gateway_base_url: "https://gateway.example/pay".to_string(),
        }
    }
}
