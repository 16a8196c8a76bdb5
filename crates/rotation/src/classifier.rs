//! Quota-failure classification
//!
//! Decides whether an adapter error means "this credential's allowance is
//! spent" (rotate to the next token) or "something else broke" (propagate
//! immediately). Tagged variants from cooperative adapters are checked
//! first; the substring heuristics exist for upstreams that only surface
//! quota complaints in free-form message text.

use provider::AdapterError;

/// Classify an adapter error, first-true-wins:
///
/// 1. tagged `QuotaExhausted` from the adapter itself
/// 2. HTTP 429 status
/// 3. message containing the literal "429"
/// 4. message containing any provider keyword (case-insensitive)
/// 5. a stream that raised an error event instead of completing
///
/// Everything else is a hard failure and must never trigger rotation.
pub fn is_quota_failure(error: &AdapterError, keywords: &[String]) -> bool {
    match error {
        AdapterError::QuotaExhausted(_) => true,
        AdapterError::Upstream { status: 429, .. } => true,
        AdapterError::StreamFailed(_) => true,
        other => message_indicates_quota(&other.to_string(), keywords),
    }
}

fn message_indicates_quota(message: &str, keywords: &[String]) -> bool {
    if message.contains("429") {
        return true;
    }
    let lower = message.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lower.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn tagged_quota_is_quota() {
        let err = AdapterError::QuotaExhausted("daily limit reached".into());
        assert!(is_quota_failure(&err, &[]));
    }

    #[test]
    fn status_429_is_quota_without_keywords() {
        let err = AdapterError::Upstream {
            status: 429,
            body: "slow down".into(),
        };
        assert!(is_quota_failure(&err, &[]));
    }

    #[test]
    fn message_containing_429_is_quota() {
        let err = AdapterError::TaskFailed("upstream responded with code 429".into());
        assert!(is_quota_failure(&err, &[]));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let err = AdapterError::Upstream {
            status: 402,
            body: "Arrearage: please check your Bill".into(),
        };
        assert!(is_quota_failure(&err, &keywords(&["arrearage", "bill"])));
        assert!(is_quota_failure(&err, &keywords(&["ARREARAGE"])));
    }

    #[test]
    fn stream_error_event_is_quota() {
        let err = AdapterError::StreamFailed("model capacity exceeded".into());
        assert!(is_quota_failure(&err, &[]));
    }

    #[test]
    fn task_failure_with_keyword_is_quota() {
        let err = AdapterError::TaskFailed("insufficient credit balance".into());
        assert!(is_quota_failure(&err, &keywords(&["quota", "credit"])));
    }

    #[test]
    fn transport_failure_is_hard() {
        let err = AdapterError::Transport("connection refused".into());
        assert!(!is_quota_failure(&err, &keywords(&["quota", "credit"])));
    }

    #[test]
    fn poll_budget_exceeded_is_hard() {
        let err = AdapterError::PollBudgetExceeded {
            task_id: "task-9".into(),
            polls: 60,
        };
        assert!(!is_quota_failure(&err, &keywords(&["quota"])));
    }

    #[test]
    fn invalid_response_is_hard() {
        let err = AdapterError::InvalidResponse("missing images[0].url".into());
        assert!(!is_quota_failure(&err, &keywords(&["quota"])));
    }

    #[test]
    fn server_error_without_keywords_is_hard() {
        let err = AdapterError::Upstream {
            status: 500,
            body: "internal error".into(),
        };
        assert!(!is_quota_failure(&err, &keywords(&["quota", "credit"])));
    }

    #[test]
    fn unrelated_status_with_keyword_body_still_rotates() {
        // Some upstreams report balance exhaustion with a 403 and a prose body
        let err = AdapterError::Upstream {
            status: 403,
            body: "account quota used up for today".into(),
        };
        assert!(is_quota_failure(&err, &keywords(&["quota"])));
    }
}
