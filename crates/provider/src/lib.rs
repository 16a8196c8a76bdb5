//! Adapter-facing contract for upstream inference providers
//!
//! Defines the error taxonomy every provider adapter raises and the
//! per-provider credential policy. Adapters that can recognize a quota
//! signal themselves raise the tagged `QuotaExhausted` variant; adapters
//! that cannot (opaque upstream bodies) raise `Upstream` with the status
//! and body, and the rotation layer's keyword fallback classifies it.

use thiserror::Error;

/// Whether a provider can be called without a credential.
///
/// `Required` providers fail fast on an empty credential list. `Optional`
/// providers are invoked once anonymously when no tokens are configured;
/// there is nothing to rotate in that mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    Required,
    Optional,
}

/// Errors raised by provider adapters, shaped so the rotation layer can
/// classify them without knowing any provider's wire format.
///
/// `QuotaExhausted` is the cooperative path: the adapter recognized the
/// signal itself. `Upstream`, `TaskFailed` and friends carry the original
/// message so the keyword fallback still works for upstreams that bury
/// quota complaints in free-form text.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter determined the credential's allowance is spent.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Upstream returned a non-success HTTP status.
    #[error("upstream status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A streamed response terminated with an error event instead of
    /// completing.
    #[error("stream error event: {0}")]
    StreamFailed(String),

    /// The response decoded but required fields were missing.
    #[error("invalid response shape: {0}")]
    InvalidResponse(String),

    /// Connection, TLS, or timeout failure from the transport layer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An async task did not reach a terminal state within the poll budget.
    #[error("task {task_id} not finished after {polls} polls")]
    PollBudgetExceeded { task_id: String, polls: u32 },

    /// An async task reported failure from the remote side.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl AdapterError {
    /// Status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AdapterError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_reports_status() {
        let err = AdapterError::Upstream {
            status: 429,
            body: "too many requests".into(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(AdapterError::Transport("refused".into()).status(), None);
        assert_eq!(
            AdapterError::PollBudgetExceeded {
                task_id: "t-1".into(),
                polls: 60,
            }
            .status(),
            None
        );
    }

    #[test]
    fn display_preserves_original_message() {
        let err = AdapterError::TaskFailed("Arrearage: account balance too low".into());
        assert!(err.to_string().contains("Arrearage: account balance too low"));
    }
}
