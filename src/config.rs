// ===============================
// src/config.rs
// ===============================
use dotenvy::dotenv;
use std::env;

/// Runtime configuration, env-driven with working defaults.
///
/// - LISTEN_PORT       port for the API + metrics server (default 3000)
/// - UPSTREAM_URL      base URL of the quote proxy
/// - QUOTE_TIMEOUT_MS  bounded wait before the fallback table kicks in
/// - ANON_SALT         fixed salt mixed into origin anonymization
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_port: u16,
    pub upstream_url: String,
    pub quote_timeout_ms: u64,
    pub anon_salt: String,
}

pub fn load() -> Config {
    // Make sure .env is read (LISTEN_PORT, UPSTREAM_URL, etc.)
    let _ = dotenv();

    let listen_port = env::var("LISTEN_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);

    let upstream_url = env::var("UPSTREAM_URL")
        .unwrap_or_else(|_| "https://stock-price-checker-proxy.freecodecamp.rocks".to_string());

    let quote_timeout_ms = env::var("QUOTE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // NB: changing the salt between runs resets dedup for returning origins
    let anon_salt = env::var("ANON_SALT").unwrap_or_else(|_| "stock-checker-salt".to_string());

    Config { listen_port, upstream_url, quote_timeout_ms, anon_salt }
}
