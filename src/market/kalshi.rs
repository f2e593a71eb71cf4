use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::market::types::{MarketListing, Settlement};

pub struct KalshiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct KalshiMarket {
    ticker: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KalshiMarketsResponse {
    #[serde(default)]
    markets: Vec<KalshiMarket>,
}

/// Event ticker for a day's high-temperature event, e.g. `KXHIGHNY-25JAN05`.
pub fn event_ticker(series: &str, date: NaiveDate) -> String {
    format!("{}-{}", series, date.format("%y%b%d").to_string().to_uppercase())
}

fn convert_market(km: KalshiMarket) -> MarketListing {
    let settlement = match km.result.as_deref() {
        Some("yes") => Some(Settlement::Yes),
        Some("no") => Some(Settlement::No),
        _ => None,
    };

    MarketListing {
        ticker: km.ticker,
        subtitle: km.subtitle,
        settlement,
    }
}

impl KalshiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch every contract of one day's event, in the operator's listing order.
    pub async fn fetch_event_markets(&self, series: &str, date: NaiveDate) -> Result<Vec<MarketListing>> {
        let event = event_ticker(series, date);
        let url = format!("{}/markets", self.base_url);

        let response: KalshiMarketsResponse = self
            .client
            .get(&url)
            .query(&[("event_ticker", event.as_str()), ("limit", "50")])
            .send()
            .await
            .context("Failed to fetch markets")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse markets response")?;

        let listings: Vec<MarketListing> = response.markets.into_iter().map(convert_market).collect();
        info!("Fetched {} markets for {}", listings.len(), event);
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ticker() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(event_ticker("KXHIGHNY", date), "KXHIGHNY-25JAN05");
    }

    #[test]
    fn test_convert_market_result() {
        let json = r#"{"markets": [
            {"ticker": "A", "subtitle": "57° to 58°", "result": "yes"},
            {"ticker": "B", "subtitle": "59° to 60°", "result": "no"},
            {"ticker": "C", "subtitle": "61° or above", "result": ""},
            {"ticker": "D"}
        ]}"#;
        let response: KalshiMarketsResponse = serde_json::from_str(json).unwrap();
        let listings: Vec<_> = response.markets.into_iter().map(convert_market).collect();

        assert_eq!(listings[0].settlement, Some(Settlement::Yes));
        assert_eq!(listings[1].settlement, Some(Settlement::No));
        assert_eq!(listings[2].settlement, None);
        assert_eq!(listings[3].subtitle, "");
    }
}
