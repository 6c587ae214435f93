// ===============================
// src/server.rs
// ===============================
//
// Request handler: routing, query parsing, origin extraction, validation,
// and response assembly. Likes are recorded first (sequentially per symbol),
// then the one or two price resolutions run; a symbol pair is joined, never
// raced, so both quotes are present before the body is built.
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Response, StatusCode};
use thiserror::Error;
use tracing::{error, info};

use crate::anonymize;
use crate::config::Config;
use crate::domain::{
    ErrorBody, StockData, StockQuery, StockResponse, StockView, StockViewRel,
};
use crate::ledger::LikeLedger;
use crate::metrics::{self, LIKES, REQUESTS};
use crate::quote::PriceResolver;

const MAX_SYMBOL_LEN: usize = 12;
// used when no origin can be determined at all
const DEFAULT_ORIGIN: &str = "127.0.0.1";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a request needs, built once in main and cloned per connection.
#[derive(Clone)]
pub struct AppContext {
    pub cfg: Arc<Config>,
    pub ledger: Arc<LikeLedger>,
    pub resolver: Arc<PriceResolver>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("stock parameter is required")]
    MissingStock,
    #[error("can only compare up to 2 stocks")]
    TooManyStocks,
    #[error("invalid stock symbol: {0:?}")]
    InvalidSymbol(String),
}

/// Service entry point. Infallible towards hyper: anything unexpected below
/// is absorbed into a generic 500 here, never a crash.
pub async fn handle(
    req: Request<Body>,
    ctx: AppContext,
    remote: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let rsp = route(req, &ctx, remote).await.unwrap_or_else(|e| {
        error!(%e, "request handling failed");
        REQUESTS.with_label_values(&["internal_error"]).inc();
        let mut rsp = Response::new(Body::from(r#"{"error":"internal server error"}"#));
        *rsp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        rsp
    });
    Ok(rsp)
}

async fn route(
    req: Request<Body>,
    ctx: &AppContext,
    remote: SocketAddr,
) -> Result<Response<Body>, BoxError> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/api/stock-prices") => stock_prices(&req, ctx, remote).await,
        (&Method::GET, "/metrics") => {
            let rsp = Response::builder()
                .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                .body(Body::from(metrics::encode()))?;
            Ok(rsp)
        }
        (_, "/api/stock-prices") | (_, "/metrics") => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        _ => error_response(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn stock_prices(
    req: &Request<Body>,
    ctx: &AppContext,
    remote: SocketAddr,
) -> Result<Response<Body>, BoxError> {
    let raw_query = req.uri().query().unwrap_or("");
    let (query, like) = match parse_stock_query(raw_query) {
        Ok(parsed) => parsed,
        Err(e) => {
            REQUESTS.with_label_values(&["client_error"]).inc();
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    if like {
        let origin = anonymize::anonymize(&client_origin(req, remote), &ctx.cfg.anon_salt);
        for symbol in query.symbols() {
            let fresh = ctx.ledger.record_like(symbol, &origin);
            LIKES
                .with_label_values(&[if fresh { "new" } else { "duplicate" }])
                .inc();
            if fresh {
                info!(%symbol, %origin, "like recorded");
            }
        }
    }

    let body = match &query {
        StockQuery::Single(symbol) => {
            let quote = ctx.resolver.resolve(symbol).await;
            let likes = ctx.ledger.count(symbol);
            StockResponse {
                stock_data: StockData::Single(StockView {
                    stock: quote.stock,
                    price: quote.price,
                    likes,
                }),
            }
        }
        StockQuery::Pair(a, b) => {
            // both lookups in flight at once, joined (not raced)
            let (quote_a, quote_b) = tokio::join!(ctx.resolver.resolve(a), ctx.resolver.resolve(b));
            let (likes_a, likes_b) = (ctx.ledger.count(a) as i64, ctx.ledger.count(b) as i64);
            StockResponse {
                stock_data: StockData::Pair([
                    StockViewRel {
                        stock: quote_a.stock,
                        price: quote_a.price,
                        rel_likes: likes_a - likes_b,
                    },
                    StockViewRel {
                        stock: quote_b.stock,
                        price: quote_b.price,
                        rel_likes: likes_b - likes_a,
                    },
                ]),
            }
        }
    };

    REQUESTS.with_label_values(&["ok"]).inc();
    json_response(StatusCode::OK, &body)
}

/// Pull `stock` (1..=2 occurrences, validated + uppercased) and the `like`
/// flag out of the raw query string.
fn parse_stock_query(raw: &str) -> Result<(StockQuery, bool), ApiError> {
    let mut stocks: Vec<String> = Vec::new();
    let mut like = false;
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "stock" => stocks.push(value.into_owned()),
            // only the exact literal "true" counts
            "like" => like = value == "true",
            _ => {}
        }
    }

    if stocks.is_empty() {
        return Err(ApiError::MissingStock);
    }
    if stocks.len() > 2 {
        return Err(ApiError::TooManyStocks);
    }

    let mut symbols = Vec::with_capacity(stocks.len());
    for s in stocks {
        symbols.push(normalize_symbol(&s)?);
    }
    let query = if symbols.len() == 1 {
        StockQuery::Single(symbols.remove(0))
    } else {
        let second = symbols.remove(1);
        StockQuery::Pair(symbols.remove(0), second)
    };
    Ok((query, like))
}

fn normalize_symbol(raw: &str) -> Result<String, ApiError> {
    let s = raw.trim();
    let ok = !s.is_empty()
        && s.len() <= MAX_SYMBOL_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    if !ok {
        return Err(ApiError::InvalidSymbol(raw.to_string()));
    }
    Ok(s.to_ascii_uppercase())
}

/// Raw origin precedence: x-forwarded-for (first hop), x-real-ip, socket
/// peer address, fixed loopback placeholder.
fn client_origin(req: &Request<Body>, remote: SocketAddr) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first.to_string();
        }
    }
    if let Some(real_ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return real_ip.to_string();
    }
    let ip = remote.ip();
    if ip.is_unspecified() {
        DEFAULT_ORIGIN.to_string()
    } else {
        ip.to_string()
    }
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>, BoxError> {
    let payload = serde_json::to_vec(body)?;
    let rsp = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(payload))?;
    Ok(rsp)
}

fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>, BoxError> {
    json_response(status, &ErrorBody { error: message.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    // nothing listens here, so every price comes from the fallback table
    const DEAD_UPSTREAM: &str = "http://127.0.0.1:9";

    fn test_ctx() -> AppContext {
        let cfg = Config {
            listen_port: 0,
            upstream_url: DEAD_UPSTREAM.to_string(),
            quote_timeout_ms: 500,
            anon_salt: "test-salt".to_string(),
        };
        AppContext {
            resolver: Arc::new(PriceResolver::new(
                cfg.upstream_url.clone(),
                Duration::from_millis(cfg.quote_timeout_ms),
            )),
            ledger: Arc::new(LikeLedger::new()),
            cfg: Arc::new(cfg),
        }
    }

    async fn get(ctx: &AppContext, path_and_query: &str, origin: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .header("x-forwarded-for", origin)
            .body(Body::empty())
            .expect("test request");
        let remote: SocketAddr = "10.0.0.1:50000".parse().expect("remote addr");
        let rsp = handle(req, ctx.clone(), remote).await.expect("infallible");
        let status = rsp.status();
        let bytes = hyper::body::to_bytes(rsp.into_body()).await.expect("body");
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    #[tokio::test]
    async fn single_stock_view() {
        let ctx = test_ctx();
        let (status, body) = get(&ctx, "/api/stock-prices?stock=GOOG", "203.0.113.1").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["stockData"];
        assert_eq!(data["stock"], "GOOG");
        assert_eq!(data["price"], 786.90);
        assert_eq!(data["likes"], 0);
    }

    #[tokio::test]
    async fn lowercase_symbols_are_normalized() {
        let ctx = test_ctx();
        let (status, body) = get(&ctx, "/api/stock-prices?stock=goog", "203.0.113.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stockData"]["stock"], "GOOG");
    }

    #[tokio::test]
    async fn repeated_like_from_same_origin_counts_once() {
        let ctx = test_ctx();

        let (_, body) = get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.1").await;
        assert_eq!(body["stockData"]["likes"], 1);

        let (_, body) = get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.1").await;
        assert_eq!(body["stockData"]["likes"], 1);
    }

    #[tokio::test]
    async fn likes_from_distinct_origins_accumulate() {
        let ctx = test_ctx();
        let (_, body) = get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.1").await;
        assert_eq!(body["stockData"]["likes"], 1);
        let (_, body) = get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.2").await;
        assert_eq!(body["stockData"]["likes"], 2);
    }

    #[tokio::test]
    async fn like_flag_must_be_the_literal_true() {
        let ctx = test_ctx();
        let (_, body) = get(&ctx, "/api/stock-prices?stock=GOOG&like=yes", "203.0.113.1").await;
        assert_eq!(body["stockData"]["likes"], 0);
        assert_eq!(ctx.ledger.count("GOOG"), 0);
    }

    #[tokio::test]
    async fn pair_rel_likes_are_symmetric() {
        let ctx = test_ctx();
        // GOOG: 2 likes, MSFT: 1 like
        get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.1").await;
        get(&ctx, "/api/stock-prices?stock=GOOG&like=true", "203.0.113.2").await;
        get(&ctx, "/api/stock-prices?stock=MSFT&like=true", "203.0.113.3").await;

        let (status, body) = get(&ctx, "/api/stock-prices?stock=GOOG&stock=MSFT", "203.0.113.9").await;
        assert_eq!(status, StatusCode::OK);
        let data = body["stockData"].as_array().expect("pair is an array");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["stock"], "GOOG");
        assert_eq!(data[0]["rel_likes"], 1);
        assert_eq!(data[1]["stock"], "MSFT");
        assert_eq!(data[1]["rel_likes"], -1);
        let sum = data[0]["rel_likes"].as_i64().unwrap() + data[1]["rel_likes"].as_i64().unwrap();
        assert_eq!(sum, 0);
    }

    #[tokio::test]
    async fn liking_a_pair_records_both_symbols() {
        let ctx = test_ctx();
        let (status, body) = get(
            &ctx,
            "/api/stock-prices?stock=GOOG&stock=MSFT&like=true",
            "203.0.113.1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = body["stockData"].as_array().expect("pair is an array");
        assert_eq!(data[0]["rel_likes"], 0);
        assert_eq!(data[1]["rel_likes"], 0);
        assert_eq!(ctx.ledger.count("GOOG"), 1);
        assert_eq!(ctx.ledger.count("MSFT"), 1);
    }

    #[tokio::test]
    async fn missing_stock_is_a_client_error() {
        let ctx = test_ctx();
        let (status, body) = get(&ctx, "/api/stock-prices?like=true", "203.0.113.1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        // rejected before any core component ran
        assert_eq!(ctx.ledger.count("GOOG"), 0);
    }

    #[tokio::test]
    async fn three_stocks_are_a_client_error() {
        let ctx = test_ctx();
        let (status, body) = get(
            &ctx,
            "/api/stock-prices?stock=GOOG&stock=MSFT&stock=AAPL&like=true",
            "203.0.113.1",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(ctx.ledger.count("GOOG"), 0);
        assert_eq!(ctx.ledger.count("MSFT"), 0);
        assert_eq!(ctx.ledger.count("AAPL"), 0);
    }

    #[tokio::test]
    async fn empty_symbol_is_a_client_error() {
        let ctx = test_ctx();
        let (status, _) = get(&ctx, "/api/stock-prices?stock=", "203.0.113.1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(&ctx, "/api/stock-prices?stock=G%20OG", "203.0.113.1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let ctx = test_ctx();
        let (status, body) = get(&ctx, "/api/nope", "203.0.113.1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[test]
    fn origin_precedence_forwarded_then_real_ip_then_peer() {
        let remote: SocketAddr = "192.0.2.50:1234".parse().expect("remote addr");

        let req = Request::builder()
            .uri("/api/stock-prices?stock=GOOG")
            .header("x-forwarded-for", "203.0.113.1, 10.0.0.2")
            .header("x-real-ip", "203.0.113.2")
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_origin(&req, remote), "203.0.113.1");

        let req = Request::builder()
            .uri("/api/stock-prices?stock=GOOG")
            .header("x-real-ip", "203.0.113.2")
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_origin(&req, remote), "203.0.113.2");

        let req = Request::builder()
            .uri("/api/stock-prices?stock=GOOG")
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_origin(&req, remote), "192.0.2.50");
    }
}
