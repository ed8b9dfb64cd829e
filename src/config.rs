use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

pub mod assets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub stellar_horizon_url: String,
    pub horizon_poll_interval: Duration,
    pub horizon_timeout: Duration,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub asset_refresh_interval: Duration,
    pub outgoing_poll_interval: Duration,
    pub anchor_rates_url: Option<String>,
    pub anchor_settlement_url: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        let required = |name: &str| -> anyhow::Result<String> {
            vars.get(name)
                .cloned()
                .with_context(|| format!("{} must be set", name))
        };
        let optional = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

        let log_format = match optional("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            stellar_horizon_url: required("STELLAR_HORIZON_URL")?,
            horizon_poll_interval: Duration::from_millis(parse_or(vars, "HORIZON_POLL_INTERVAL_MS", 1000)?),
            horizon_timeout: Duration::from_secs(parse_or(vars, "HORIZON_TIMEOUT_SECS", 30)?),
            circuit_breaker_threshold: parse_or(vars, "CIRCUIT_BREAKER_THRESHOLD", 3)?,
            circuit_breaker_reset_secs: parse_or(vars, "CIRCUIT_BREAKER_RESET_SECS", 60)?,
            asset_refresh_interval: Duration::from_secs(parse_or(vars, "ASSET_REFRESH_SECS", 60)?),
            outgoing_poll_interval: Duration::from_secs(parse_or(vars, "OUTGOING_POLL_INTERVAL_SECS", 5)?),
            anchor_rates_url: optional("ANCHOR_RATES_URL"),
            anchor_settlement_url: optional("ANCHOR_SETTLEMENT_URL"),
            log_format,
        })
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars.get(name).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        None => Ok(default),
    }
}
