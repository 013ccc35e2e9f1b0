//! Price oracle client
//!
//! The oracle is an external HTTP service keyed by chain address,
//! returning trading-pair data. It rate limits aggressively, observed as
//! HTTP 429.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use screener_core::{EnrichmentError, EnrichmentResult, PriceData};

/// Seam for the external price service.
#[async_trait::async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch(&self, address: &str) -> EnrichmentResult<PriceData>;
}

/// Wire format of the oracle's pair payload.
#[derive(Debug, Deserialize)]
struct PairResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    #[serde(default)]
    price_usd: Option<serde_json::Value>,
    #[serde(default)]
    volume: Option<Window24h>,
    #[serde(default)]
    price_change: Option<Window24h>,
}

#[derive(Debug, Default, Deserialize)]
struct Window24h {
    #[serde(default)]
    h24: Option<serde_json::Value>,
}

fn lenient(value: &Option<serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// HTTP oracle client: `GET {base}/{address}`.
pub struct HttpPriceOracle {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> EnrichmentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn fetch(&self, address: &str) -> EnrichmentResult<PriceData> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), address);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentError::Timeout
            } else {
                EnrichmentError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EnrichmentError::RateLimited);
        }
        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        let payload: PairResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        let pair = payload
            .pairs
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| EnrichmentError::NoData(address.to_string()))?;

        let data = PriceData {
            price_usd: lenient(&pair.price_usd),
            volume_h24: lenient(&pair.volume.unwrap_or_default().h24),
            price_change_h24: lenient(&pair.price_change.unwrap_or_default().h24),
        };

        debug!("Oracle price for {}: {} USD", address, data.price_usd);
        Ok(data)
    }
}
