// ===============================
// src/domain.rs
// ===============================
use serde::Serialize;

/// One resolved quote. Produced fresh per request, never cached across requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote { pub stock: String, pub price: f64 }

/// Request shape after validation: one symbol or a comparison pair.
/// Symbols are already normalized (trimmed, uppercase) at this point.
#[derive(Debug, Clone)]
pub enum StockQuery {
    Single(String),
    Pair(String, String),
}

impl StockQuery {
    pub fn symbols(&self) -> Vec<&str> {
        match self {
            StockQuery::Single(s) => vec![s],
            StockQuery::Pair(a, b) => vec![a, b],
        }
    }
}

/// `stockData` entry for the one-symbol response.
#[derive(Debug, Serialize)]
pub struct StockView { pub stock: String, pub price: f64, pub likes: u64 }

/// `stockData` entry for the two-symbol response. The two `rel_likes`
/// values always sum to zero.
#[derive(Debug, Serialize)]
pub struct StockViewRel { pub stock: String, pub price: f64, pub rel_likes: i64 }

/// `stockData` is an object for one symbol and an array for two.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StockData {
    Single(StockView),
    Pair([StockViewRel; 2]),
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    #[serde(rename = "stockData")]
    pub stock_data: StockData,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody { pub error: String }
