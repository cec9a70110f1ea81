use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_rates_config")]
    pub rates: RatesConfig,
    #[serde(default = "default_health_config")]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Channel the rate message lives in (e.g. -1001234567890)
    pub channel_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatesConfig {
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_fiat_url")]
    pub fiat_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Offset of the displayed date/time from UTC (Kyiv is +3 in summer)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_update_interval() -> u64 {
    60
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3/coins/markets".to_string()
}

fn default_fiat_url() -> String {
    "https://open.er-api.com/v6/latest/USD".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_utc_offset() -> i32 {
    3
}

fn default_health_port() -> u16 {
    3000
}

fn default_rates_config() -> RatesConfig {
    RatesConfig {
        update_interval_secs: default_update_interval(),
        coingecko_url: default_coingecko_url(),
        fiat_url: default_fiat_url(),
        request_timeout_secs: default_request_timeout(),
        utc_offset_hours: default_utc_offset(),
    }
}

fn default_health_config() -> HealthConfig {
    HealthConfig {
        port: default_health_port(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.rates.update_interval_secs == 0 {
            anyhow::bail!("update_interval_secs must be at least 1");
        }

        Ok(config)
    }
}
