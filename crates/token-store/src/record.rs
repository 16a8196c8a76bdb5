//! Day-keyed exhaustion record

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-provider exhaustion memory for one rotation window.
///
/// Persisted as `{ "day": "YYYY-MM-DD", "exhausted": { token: true } }`.
/// Entries are only meaningful while `day` matches the provider's current
/// window; callers must treat a mismatched-day record as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustionRecord {
    /// Day key the marks below belong to.
    pub day: String,
    /// Credentials that hit their quota during `day`.
    #[serde(default)]
    pub exhausted: HashMap<String, bool>,
}

impl ExhaustionRecord {
    /// Fresh record with no exhaustion marks.
    pub fn empty(day: String) -> Self {
        Self {
            day,
            exhausted: HashMap::new(),
        }
    }

    /// Whether a credential is marked exhausted in this record.
    pub fn is_exhausted(&self, credential: &str) -> bool {
        self.exhausted.get(credential).copied().unwrap_or(false)
    }

    /// Mark a credential exhausted. Returns `false` if it was already
    /// marked (idempotent at the set level).
    pub fn mark(&mut self, credential: &str) -> bool {
        self.exhausted.insert(credential.to_string(), true) != Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent() {
        let mut record = ExhaustionRecord::empty("2025-03-01".into());
        assert!(record.mark("sk-a"));
        assert!(!record.mark("sk-a"));
        assert_eq!(record.exhausted.len(), 1);
        assert!(record.is_exhausted("sk-a"));
    }

    #[test]
    fn unknown_credential_is_not_exhausted() {
        let record = ExhaustionRecord::empty("2025-03-01".into());
        assert!(!record.is_exhausted("sk-missing"));
    }

    #[test]
    fn serializes_to_day_keyed_map_layout() {
        let mut record = ExhaustionRecord::empty("2025-03-01".into());
        record.mark("sk-a");

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(json["day"], "2025-03-01");
        assert_eq!(json["exhausted"]["sk-a"], true);
    }

    #[test]
    fn deserializes_without_exhausted_field() {
        let record: ExhaustionRecord = serde_json::from_str(r#"{"day":"2025-03-01"}"#).unwrap();
        assert!(record.exhausted.is_empty());
    }
}
