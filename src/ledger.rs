// ===============================
// src/ledger.rs
// ===============================
//
// In-memory like ledger: at most one like per (symbol, anonymized origin)
// pair, plus a running count per symbol. The membership check and the
// insert-and-increment form one atomic step under a single mutex, so two
// concurrent identical likes can never both observe "absent" and
// double-increment. The lock is never held across an await.
//
use ahash::{AHashMap, AHashSet};
use std::sync::Mutex;

use crate::anonymize::AnonymizedOrigin;

#[derive(Default)]
struct LedgerState {
    seen: AHashSet<(String, AnonymizedOrigin)>,
    counts: AHashMap<String, u64>,
}

/// Process-wide like state. Constructed once in main and shared via `Arc`,
/// never ambient module state, so tests get isolated instances.
pub struct LikeLedger {
    state: Mutex<LedgerState>,
}

impl LikeLedger {
    pub fn new() -> Self {
        Self { state: Mutex::new(LedgerState::default()) }
    }

    /// Insert-if-absent. Returns `true` exactly once per (symbol, origin)
    /// pair; replays are no-ops and leave the count untouched.
    /// `symbol` must already be normalized to uppercase by the caller.
    pub fn record_like(&self, symbol: &str, origin: &AnonymizedOrigin) -> bool {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (symbol.to_string(), origin.clone());
        if st.seen.contains(&key) {
            return false;
        }
        st.seen.insert(key);
        *st.counts.entry(symbol.to_string()).or_insert(0) += 1;
        true
    }

    /// Current like count for `symbol`, 0 if it has never been liked.
    pub fn count(&self, symbol: &str) -> u64 {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.counts.get(symbol).copied().unwrap_or(0)
    }
}

impl Default for LikeLedger {
    fn default() -> Self {
        Self::new()
    }
}
