use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::RatesConfig;

/// Price and 24h change for a single coin, in USD
#[derive(Debug, Clone, PartialEq)]
pub struct CoinQuote {
    pub price: f64,
    pub change_24h: Option<f64>,
}

/// One fetched set of rate figures, treated as a unit.
/// Fields the upstream APIs failed to deliver are None; the renderer
/// substitutes fallback text instead of this layer erroring out.
#[derive(Debug, Clone)]
pub struct RateSnapshot {
    pub bitcoin: Option<CoinQuote>,
    pub ethereum: Option<CoinQuote>,
    pub tether: Option<CoinQuote>,
    pub usd_uah: Option<f64>,
    pub usd_rub: Option<f64>,
    pub usd_kzt: Option<f64>,
    pub usd_eur: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    current_price: f64,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FiatResponse {
    rates: HashMap<String, f64>,
}

pub struct RateFetcher {
    client: reqwest::Client,
    config: RatesConfig,
}

impl RateFetcher {
    pub fn new(config: RatesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Fetch a fresh snapshot. Failure surfaces as None, never as an error:
    /// a missed cycle is recoverable and the caller just skips its turn.
    pub async fn fetch(&self) -> Option<RateSnapshot> {
        match self.try_fetch().await {
            Ok(snapshot) => {
                debug!("Fetched rate snapshot at {}", snapshot.fetched_at);
                Some(snapshot)
            }
            Err(e) => {
                warn!("Rate fetch failed, skipping cycle: {:#}", e);
                None
            }
        }
    }

    async fn try_fetch(&self) -> Result<RateSnapshot> {
        let response = self
            .client
            .get(&self.config.coingecko_url)
            .query(&[
                ("vs_currency", "usd"),
                ("ids", "bitcoin,ethereum,tether"),
                ("price_change_percentage", "24h"),
            ])
            .send()
            .await
            .context("Failed to send request to CoinGecko")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("CoinGecko API error ({})", status);
        }

        let markets: Vec<MarketEntry> = response
            .json()
            .await
            .context("Failed to parse CoinGecko response")?;

        let response = self
            .client
            .get(&self.config.fiat_url)
            .send()
            .await
            .context("Failed to send request to exchange rate API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Exchange rate API error ({})", status);
        }

        let fiat: FiatResponse = response
            .json()
            .await
            .context("Failed to parse exchange rate response")?;

        Ok(build_snapshot(&markets, &fiat, Utc::now()))
    }
}

fn build_snapshot(
    markets: &[MarketEntry],
    fiat: &FiatResponse,
    fetched_at: DateTime<Utc>,
) -> RateSnapshot {
    let quote = |id: &str| {
        markets.iter().find(|m| m.id == id).map(|m| CoinQuote {
            price: m.current_price,
            change_24h: m.price_change_percentage_24h,
        })
    };

    RateSnapshot {
        bitcoin: quote("bitcoin"),
        ethereum: quote("ethereum"),
        tether: quote("tether"),
        usd_uah: fiat.rates.get("UAH").copied(),
        usd_rub: fiat.rates.get("RUB").copied(),
        usd_kzt: fiat.rates.get("KZT").copied(),
        usd_eur: fiat.rates.get("EUR").copied(),
        fetched_at,
    }
}
