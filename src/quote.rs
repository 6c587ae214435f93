// ===============================
// src/quote.rs
// ===============================
//
// Price resolver:
// - races one upstream GET against a fixed timeout (tokio::time::timeout)
// - any failure (transport, bad status, malformed payload, timeout) resolves
//   from a hard-coded fallback table, so `resolve` never fails
// - on timeout the in-flight request future is dropped, which guarantees a
//   single settlement: a late upstream response has nothing left to touch
//
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::PriceQuote;
use crate::metrics::{QUOTES, QUOTE_LATENCY};

/// Last-resort prices when the upstream cannot be consulted.
const FALLBACK_PRICES: &[(&str, f64)] = &[
    ("GOOG", 786.90),
    ("MSFT", 62.30),
    ("AAPL", 150.00),
    ("TSLA", 250.00),
];
const DEFAULT_FALLBACK_PRICE: f64 = 100.00;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed quote payload")]
    Malformed,
}

pub struct PriceResolver {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PriceResolver {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self { http: reqwest::Client::new(), base_url, timeout }
    }

    /// Infallible by contract: a quote always comes back, possibly synthetic.
    pub async fn resolve(&self, symbol: &str) -> PriceQuote {
        let start = Instant::now();
        let quote = match tokio::time::timeout(self.timeout, self.fetch(symbol)).await {
            Ok(Ok(quote)) => {
                QUOTES.with_label_values(&["upstream"]).inc();
                debug!(%symbol, price = quote.price, "quote from upstream");
                quote
            }
            Ok(Err(e)) => {
                QUOTES.with_label_values(&["error"]).inc();
                warn!(%symbol, %e, "quote lookup failed, using fallback");
                fallback_quote(symbol)
            }
            Err(_) => {
                // dropping the fetch future here neutralizes any late response
                QUOTES.with_label_values(&["timeout"]).inc();
                warn!(
                    %symbol,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "quote lookup timed out, using fallback"
                );
                fallback_quote(symbol)
            }
        };
        QUOTE_LATENCY.observe(start.elapsed().as_secs_f64() * 1000.0);
        quote
    }

    async fn fetch(&self, symbol: &str) -> Result<PriceQuote, QuoteError> {
        let url = format!("{}/v1/stock/{}/quote", self.base_url.trim_end_matches('/'), symbol);
        let rsp = self.http.get(&url).send().await?;
        if !rsp.status().is_success() {
            return Err(QuoteError::Status(rsp.status()));
        }
        let v = rsp
            .json::<serde_json::Value>()
            .await
            .map_err(|_| QuoteError::Malformed)?;
        let price = v
            .get("latestPrice")
            .and_then(|x| x.as_f64())
            .ok_or(QuoteError::Malformed)?;
        let stock = v
            .get("symbol")
            .and_then(|x| x.as_str())
            .unwrap_or(symbol)
            .to_string();
        Ok(PriceQuote { stock, price })
    }
}

/// Fallback-table lookup; unknown symbols get the fixed default price.
pub fn fallback_quote(symbol: &str) -> PriceQuote {
    let price = FALLBACK_PRICES
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_FALLBACK_PRICE);
    PriceQuote { stock: symbol.to_string(), price }
}
