// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stock_requests_total",
            "API requests by outcome (ok, client_error, internal_error)",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static LIKES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stock_likes_total", "like attempts by result (new, duplicate)"),
        &["result"],
    )
    .unwrap()
});

pub static QUOTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stock_quotes_total",
            "price resolutions by source (upstream, error, timeout)",
        ),
        &["source"],
    )
    .unwrap()
});

// Quote resolution latency, bounded above by the resolver timeout
pub static QUOTE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "stock_quote_resolve_ms",
        "Quote resolution latency (ms)",
    ))
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(REQUESTS.clone())),
        REGISTRY.register(Box::new(LIKES.clone())),
        REGISTRY.register(Box::new(QUOTES.clone())),
        REGISTRY.register(Box::new(QUOTE_LATENCY.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
