//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::Money;
use domain::{PricingPolicy, RestockPolicy};
use store::RetryConfig;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Error)]
#[error("Invalid value {value:?} for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: Postgres connection string; unset runs in memory
/// - `TX_MAX_ATTEMPTS`, `TX_INITIAL_BACKOFF_MS`, `TX_MAX_BACKOFF_MS`,
///   `TX_ATTEMPT_TIMEOUT_MS`: transaction retry policy
/// - `TAX_RATE_BPS`, `FREE_SHIPPING_THRESHOLD_CENTS`, `FLAT_SHIPPING_CENTS`:
///   pricing
/// - `PAYMENT_PROVIDERS`: comma separated provider names (default `card`)
/// - `AUDIT_BUFFER`: audit queue capacity
/// - `RESTOCK_REFUNDS`: put refunded items back on the shelf
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub tx_max_attempts: u32,
    pub tx_initial_backoff_ms: u64,
    pub tx_max_backoff_ms: u64,
    pub tx_attempt_timeout_ms: u64,
    pub tax_rate_bps: u32,
    pub free_shipping_threshold_cents: i64,
    pub flat_shipping_cents: i64,
    pub payment_providers: Vec<String>,
    pub audit_buffer: usize,
    pub restock_refunds: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys take their
    /// default; set keys that do not parse are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };
        let payment_providers = match lookup("PAYMENT_PROVIDERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.payment_providers,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            tx_max_attempts: parsed(&lookup, "TX_MAX_ATTEMPTS", defaults.tx_max_attempts)?,
            tx_initial_backoff_ms: parsed(
                &lookup,
                "TX_INITIAL_BACKOFF_MS",
                defaults.tx_initial_backoff_ms,
            )?,
            tx_max_backoff_ms: parsed(&lookup, "TX_MAX_BACKOFF_MS", defaults.tx_max_backoff_ms)?,
            tx_attempt_timeout_ms: parsed(
                &lookup,
                "TX_ATTEMPT_TIMEOUT_MS",
                defaults.tx_attempt_timeout_ms,
            )?,
            tax_rate_bps: parsed(&lookup, "TAX_RATE_BPS", defaults.tax_rate_bps)?,
            free_shipping_threshold_cents: parsed(
                &lookup,
                "FREE_SHIPPING_THRESHOLD_CENTS",
                defaults.free_shipping_threshold_cents,
            )?,
            flat_shipping_cents: parsed(
                &lookup,
                "FLAT_SHIPPING_CENTS",
                defaults.flat_shipping_cents,
            )?,
            payment_providers,
            audit_buffer: parsed(&lookup, "AUDIT_BUFFER", defaults.audit_buffer)?,
            restock_refunds: parsed(&lookup, "RESTOCK_REFUNDS", defaults.restock_refunds)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.tx_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.tx_initial_backoff_ms),
            max_delay: Duration::from_millis(self.tx_max_backoff_ms),
            attempt_timeout: Duration::from_millis(self.tx_attempt_timeout_ms),
            ..RetryConfig::default()
        }
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_bps: self.tax_rate_bps,
            free_shipping_threshold: Money::from_cents(self.free_shipping_threshold_cents),
            flat_shipping_fee: Money::from_cents(self.flat_shipping_cents),
        }
    }

    pub fn restock_policy(&self) -> RestockPolicy {
        if self.restock_refunds {
            RestockPolicy::RestockRefunds
        } else {
            RestockPolicy::ReleaseUnpaidOnly
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryConfig::default();
        let pricing = PricingPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            tx_max_attempts: retry.max_attempts,
            tx_initial_backoff_ms: retry.initial_delay.as_millis() as u64,
            tx_max_backoff_ms: retry.max_delay.as_millis() as u64,
            tx_attempt_timeout_ms: retry.attempt_timeout.as_millis() as u64,
            tax_rate_bps: pricing.tax_rate_bps,
            free_shipping_threshold_cents: pricing.free_shipping_threshold.cents(),
            flat_shipping_cents: pricing.flat_shipping_fee.cents(),
            payment_providers: vec!["card".to_string()],
            audit_buffer: 1024,
            restock_refunds: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.payment_providers, vec!["card".to_string()]);
        assert_eq!(config.pricing_policy(), PricingPolicy::default());
        assert_eq!(config.restock_policy(), RestockPolicy::ReleaseUnpaidOnly);
        assert_eq!(config.retry_config().max_attempts, 5);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("TX_MAX_ATTEMPTS", "3"),
            ("TX_ATTEMPT_TIMEOUT_MS", "250"),
            ("TAX_RATE_BPS", "825"),
            ("PAYMENT_PROVIDERS", "card, wallet,"),
            ("RESTOCK_REFUNDS", "true"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.attempt_timeout, Duration::from_millis(250));
        assert_eq!(config.pricing_policy().tax_rate_bps, 825);
        assert_eq!(config.payment_providers, vec!["card", "wallet"]);
        assert_eq!(config.restock_policy(), RestockPolicy::RestockRefunds);
    }

    #[test]
    fn test_unparseable_value_is_an_error() {
        let err = from_pairs(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.key, "PORT");

        let err = from_pairs(&[("LOG_FORMAT", "yaml")]).unwrap_err();
        assert_eq!(err.key, "LOG_FORMAT");
    }
}
