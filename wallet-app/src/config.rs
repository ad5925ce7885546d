//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use payment_gateway::HttpGatewayConfig;
use wallet_hex::EngineConfig;
use wallet_types::Currency;

/// Which payment provider adapter to run against.
#[derive(Debug, Clone)]
pub enum GatewaySettings {
    Http(HttpGatewayConfig),
    /// In-process provider, for local runs and demos
    Simulated,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub currency: Currency,
    pub gateway: GatewaySettings,
    pub callback_secret: Option<String>,
    pub engine: EngineConfig,
    pub sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = parse_or(&var, "PORT", 3000)?;

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let currency = parse_or(&var, "LEDGER_CURRENCY", Currency::USD)?;
        let timeout = Duration::from_millis(parse_or(&var, "GATEWAY_TIMEOUT_MS", 10_000)?);

        let mode = var("GATEWAY_MODE").unwrap_or_else(|| "http".to_string());
        let gateway = match mode.to_ascii_lowercase().as_str() {
            "http" => GatewaySettings::Http(HttpGatewayConfig {
                base_url: var("GATEWAY_BASE_URL").ok_or_else(|| {
                    anyhow::anyhow!("GATEWAY_BASE_URL is required when GATEWAY_MODE=http")
                })?,
                api_key: var("GATEWAY_API_KEY").ok_or_else(|| {
                    anyhow::anyhow!("GATEWAY_API_KEY is required when GATEWAY_MODE=http")
                })?,
                signing_secret: non_empty(var("GATEWAY_SIGNING_SECRET")),
                timeout,
            }),
            "simulated" => GatewaySettings::Simulated,
            other => anyhow::bail!("unknown GATEWAY_MODE {other:?} (expected http or simulated)"),
        };

        let engine = EngineConfig {
            gateway_timeout: timeout,
            conflict_retries: parse_or(&var, "CONFLICT_RETRIES", 5)?,
            stale_after: Duration::from_secs(parse_or(&var, "SWEEP_STALE_AFTER_SECS", 60)?),
            sweep_batch_size: parse_or(&var, "SWEEP_BATCH_SIZE", 100)?,
        };

        let sweep_interval_secs: u64 = parse_or(&var, "SWEEP_INTERVAL_SECS", 30)?;
        if sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            port,
            database_url,
            currency,
            gateway,
            callback_secret: non_empty(var("PROVIDER_CALLBACK_SECRET")),
            engine,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_MODE", "simulated"),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.currency, Currency::USD);
        assert!(matches!(config.gateway, GatewaySettings::Simulated));
        assert!(config.callback_secret.is_none());
        assert_eq!(config.engine.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.engine.conflict_retries, 5);
        assert_eq!(config.engine.stale_after, Duration::from_secs(60));
        assert_eq!(config.engine.sweep_batch_size, 100);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_database_url_required() {
        let err = load(&[("GATEWAY_MODE", "simulated")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_http_gateway_needs_credentials() {
        let err = load(&[("DATABASE_URL", "memory://")]).unwrap_err();
        assert!(err.to_string().contains("GATEWAY_BASE_URL"));

        let err = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_BASE_URL", "https://provider.test"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_API_KEY"));
    }

    #[test]
    fn test_http_gateway() {
        let config = load(&[
            ("DATABASE_URL", "sqlite://wallet.db"),
            ("GATEWAY_MODE", "HTTP"),
            ("GATEWAY_BASE_URL", "https://provider.test"),
            ("GATEWAY_API_KEY", "sk_test"),
            ("GATEWAY_SIGNING_SECRET", ""),
            ("GATEWAY_TIMEOUT_MS", "2500"),
            ("LEDGER_CURRENCY", "eur"),
            ("PROVIDER_CALLBACK_SECRET", "whsec"),
        ])
        .unwrap();

        let GatewaySettings::Http(http) = &config.gateway else {
            panic!("expected http gateway");
        };
        assert_eq!(http.base_url, "https://provider.test");
        assert_eq!(http.timeout, Duration::from_millis(2500));
        assert!(http.signing_secret.is_none());
        assert_eq!(config.engine.gateway_timeout, Duration::from_millis(2500));
        assert_eq!(config.currency, Currency::EUR);
        assert_eq!(config.callback_secret.as_deref(), Some("whsec"));
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_MODE", "simulated"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = load(&[("DATABASE_URL", "memory://"), ("GATEWAY_MODE", "carrier-pigeon")])
            .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_MODE"));

        let err = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_MODE", "simulated"),
            ("LEDGER_CURRENCY", "BTC"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("LEDGER_CURRENCY"));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let err = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_MODE", "simulated"),
            ("SWEEP_INTERVAL_SECS", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SWEEP_INTERVAL_SECS"));

        let config = load(&[
            ("DATABASE_URL", "memory://"),
            ("GATEWAY_MODE", "simulated"),
            ("SWEEP_INTERVAL_SECS", "1"),
        ])
        .unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }
}
