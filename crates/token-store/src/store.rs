//! Exhaustion store and credential-list parsing

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{MemoryBackend, StateBackend};
use crate::record::ExhaustionRecord;
use crate::window::RotationWindow;

/// Parse a raw comma-separated credential list.
///
/// Trims whitespace, drops empty entries, preserves order. Duplicates are
/// NOT removed: a repeated token is legal and is simply re-selected after
/// earlier occurrences exhaust (both occurrences are skipped once the value
/// is marked, since identity is the exact string).
pub fn parse_credentials(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Read-side aggregate for the health surface. `total = exhausted + active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    pub total: usize,
    pub exhausted: usize,
    pub active: usize,
}

/// Day-scoped exhaustion store over an injected backend.
///
/// Every read re-checks the day key against the provider's rotation window,
/// so stale records expire lazily with no sweep. Writes persist immediately
/// so a concurrent call in the same process observes the mark on its next
/// load.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn StateBackend>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// Store with no persistence: exhaustion memory lasts for the life of
    /// the process only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// The record for the provider's current rotation window.
    ///
    /// Absent, unparseable, or mismatched-day state all read as a fresh
    /// empty record; the day-key check IS the reset mechanism.
    pub async fn load(&self, provider_key: &str, window: &RotationWindow) -> ExhaustionRecord {
        let today = window.current_day();
        let key = state_key(provider_key);

        match self.backend.load(&key).await {
            Some(raw) => match serde_json::from_str::<ExhaustionRecord>(&raw) {
                Ok(record) if record.day == today => record,
                Ok(record) => {
                    debug!(
                        provider = provider_key,
                        stale_day = %record.day,
                        current_day = %today,
                        "exhaustion record from a previous window, resetting"
                    );
                    ExhaustionRecord::empty(today)
                }
                Err(e) => {
                    warn!(provider = provider_key, error = %e, "corrupt exhaustion record, resetting");
                    ExhaustionRecord::empty(today)
                }
            },
            None => ExhaustionRecord::empty(today),
        }
    }

    /// Mark a credential exhausted for the current window and persist.
    ///
    /// Safe to call redundantly. A failed write degrades to a warning: the
    /// process keeps its decision for this call, it only loses the memory
    /// across restarts.
    pub async fn mark_exhausted(
        &self,
        provider_key: &str,
        window: &RotationWindow,
        credential: &str,
    ) {
        let mut record = self.load(provider_key, window).await;
        record.mark(credential);

        let serialized = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                warn!(provider = provider_key, error = %e, "exhaustion record serialize failed");
                return;
            }
        };

        if let Err(e) = self.backend.save(&state_key(provider_key), serialized).await {
            warn!(provider = provider_key, error = %e, "exhaustion record persist failed");
        }
    }

    /// Aggregate token counts for observability. Pure read, no side effects.
    pub async fn stats(
        &self,
        provider_key: &str,
        window: &RotationWindow,
        raw: Option<&str>,
    ) -> TokenStats {
        let credentials = parse_credentials(raw);
        let record = self.load(provider_key, window).await;

        let total = credentials.len();
        let exhausted = credentials
            .iter()
            .filter(|credential| record.is_exhausted(credential))
            .count();

        TokenStats {
            total,
            exhausted,
            active: total - exhausted,
        }
    }
}

fn state_key(provider_key: &str) -> String {
    format!("token-exhaustion-{provider_key}")
}
