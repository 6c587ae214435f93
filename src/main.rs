// ===============================
// src/main.rs
// ===============================
/*
 # one symbol
 curl -s 'localhost:3000/api/stock-prices?stock=GOOG'

 # like it (dedup per anonymized origin)
 curl -s 'localhost:3000/api/stock-prices?stock=GOOG&like=true'

 # compare two symbols
 curl -s 'localhost:3000/api/stock-prices?stock=GOOG&stock=MSFT'

 curl -s localhost:3000/metrics | grep '^stock_'
*/
mod anonymize;
mod config;
mod domain;
mod ledger;
mod metrics;
mod quote;
mod server;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use tracing::{error, info};

use crate::ledger::LikeLedger;
use crate::quote::PriceResolver;
use crate::server::AppContext;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config ----
    let cfg = config::load();

    // ---- Metrics ----
    metrics::init();

    info!(
        port = cfg.listen_port,
        upstream = %cfg.upstream_url,
        quote_timeout_ms = cfg.quote_timeout_ms,
        "startup config"
    );

    // ---- Shared state (injected, not ambient) ----
    let ctx = AppContext {
        ledger: Arc::new(LikeLedger::new()),
        resolver: Arc::new(PriceResolver::new(
            cfg.upstream_url.clone(),
            Duration::from_millis(cfg.quote_timeout_ms),
        )),
        cfg: Arc::new(cfg),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.cfg.listen_port));
    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let ctx = ctx.clone();
        let remote = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                server::handle(req, ctx.clone(), remote)
            }))
        }
    });

    info!(%addr, "listening");
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        error!(%e, "server error");
    }
}
