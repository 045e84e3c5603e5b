use anyhow::{Context, Result};
use bazaar_settlement::SettlementSettings;
use chrono::Duration;
use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
        })
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("PAYMENT_GATEWAY_URL").context("PAYMENT_GATEWAY_URL is required")?;
        let api_key = std::env::var("PAYMENT_GATEWAY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let timeout_secs = env_parse("PAYMENT_GATEWAY_TIMEOUT_SECS", 15u64)?;

        Ok(Self {
            base_url,
            api_key,
            timeout_secs,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
}

impl ReconcileConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            interval_secs: env_parse("RECONCILE_INTERVAL_SECS", 60u64)?.max(1),
        })
    }
}

pub fn settlement_settings_from_env() -> Result<SettlementSettings> {
    let currency = std::env::var("SETTLEMENT_CURRENCY")
        .unwrap_or_else(|_| "XAF".to_string())
        .trim()
        .to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        anyhow::bail!("SETTLEMENT_CURRENCY must be a 3-letter code, got {currency}");
    }

    let minimum_withdrawal = env_parse("MIN_WITHDRAWAL_AMOUNT", Decimal::new(1000, 0))?;
    if minimum_withdrawal < Decimal::ZERO {
        anyhow::bail!("MIN_WITHDRAWAL_AMOUNT cannot be negative");
    }

    Ok(SettlementSettings {
        currency,
        success_url: std::env::var("PAYMENT_SUCCESS_URL").unwrap_or_default(),
        failure_url: std::env::var("PAYMENT_FAILURE_URL").unwrap_or_default(),
        minimum_withdrawal,
        renewal_window: Duration::days(env_parse("RENEWAL_WINDOW_DAYS", 7i64)?),
        stale_after: Duration::seconds(env_parse("STALE_PAYMENT_AFTER_SECS", 300i64)?),
        ..SettlementSettings::default()
    })
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{name} is invalid: {err}")),
        Err(_) => Ok(default),
    }
}
