//! Per-provider rotation configuration

use provider::CredentialPolicy;
use token_store::RotationWindow;

/// Everything the generic executor needs to know about one provider.
///
/// One structurally identical rotation loop serves every provider; the
/// differences live entirely in this struct: the state namespace key, the
/// billing-day offset, the quota keyword set for the classifier fallback,
/// and whether anonymous calls are allowed.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    key: String,
    pub window: RotationWindow,
    pub credential_policy: CredentialPolicy,
    pub quota_keywords: Vec<String>,
}

impl ProviderProfile {
    pub fn new(key: impl Into<String>, window: RotationWindow, policy: CredentialPolicy) -> Self {
        Self {
            key: key.into(),
            window,
            credential_policy: policy,
            quota_keywords: Vec::new(),
        }
    }

    /// Extend the classifier's keyword fallback for this provider.
    /// Matching is case-insensitive substring.
    pub fn with_quota_keywords(mut self, keywords: &[&str]) -> Self {
        self.quota_keywords
            .extend(keywords.iter().map(|k| k.to_string()));
        self
    }

    /// Provider key: namespaces persisted state and labels log lines and
    /// metrics.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_accumulate() {
        let profile = ProviderProfile::new(
            "siliconflow",
            RotationWindow::utc_offset(8),
            CredentialPolicy::Required,
        )
        .with_quota_keywords(&["quota", "credit"]);

        assert_eq!(profile.key(), "siliconflow");
        assert_eq!(profile.quota_keywords, vec!["quota", "credit"]);
    }
}
