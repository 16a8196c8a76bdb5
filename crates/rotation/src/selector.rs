//! Deterministic credential selection

use token_store::ExhaustionRecord;

/// First credential in configured order not marked exhausted.
///
/// No round-robin cursor: repeated calls with no intervening mark return
/// the same credential, so retries always use the earliest available token
/// and selection order is reproducible in tests. Duplicate entries share
/// one identity, so marking the value skips every occurrence.
pub fn first_available<'a>(
    credentials: &'a [String],
    record: &ExhaustionRecord,
) -> Option<&'a str> {
    credentials
        .iter()
        .find(|credential| !record.is_exhausted(credential))
        .map(String::as_str)
}
