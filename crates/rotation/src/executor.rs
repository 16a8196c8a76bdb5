//! The rotation state machine
//!
//! `SELECT → INVOKE → {success, quota → mark + SELECT, hard → abort,
//! budget spent → abort}`. One ephemeral retry session per `execute` call;
//! the only shared state it touches is the day-scoped exhaustion record,
//! and the only mutation is marking a credential after a classified quota
//! failure.
//!
//! Concurrent `execute` calls are not serialized against each other: two
//! calls may both pick a credential before either marks it. The attempt
//! budget carries a +1 slack for exactly that race. Exhaustion is a fact
//! the remote service owns; discovering it twice is harmless.

use std::future::Future;

use common::redact_token;
use provider::{AdapterError, CredentialPolicy};
use token_store::{TokenStats, TokenStore, parse_credentials};
use tracing::{debug, warn};

use crate::classifier::is_quota_failure;
use crate::error::{Error, Result};
use crate::profile::ProviderProfile;
use crate::selector::first_available;

/// Provider-agnostic retry executor over a shared exhaustion store.
#[derive(Clone)]
pub struct RotationExecutor {
    store: TokenStore,
}

impl RotationExecutor {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    /// Run one logical operation with credential rotation.
    ///
    /// `raw_tokens` is the provider's raw comma-separated credential list,
    /// re-parsed on every call so configuration changes apply without a
    /// restart. The operation receives `Some(credential)` on rotation
    /// attempts, or `None` exactly once for credential-optional providers
    /// with nothing configured.
    ///
    /// Success short-circuits. A quota-classified failure marks the
    /// credential exhausted and retries with the next one; any other
    /// failure propagates unchanged on first occurrence.
    pub async fn execute<T, F, Fut>(
        &self,
        profile: &ProviderProfile,
        raw_tokens: Option<&str>,
        operation: F,
    ) -> Result<T>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = std::result::Result<T, AdapterError>>,
    {
        let credentials = parse_credentials(raw_tokens);

        if credentials.is_empty() {
            return match profile.credential_policy {
                CredentialPolicy::Required => {
                    Err(Error::CredentialRequired(profile.key().to_string()))
                }
                CredentialPolicy::Optional => {
                    debug!(
                        provider = profile.key(),
                        "no credentials configured, single anonymous attempt"
                    );
                    operation(None).await.map_err(Error::from)
                }
            };
        }

        // +1 tolerates one race where a credential looked available at
        // selection time but was concurrently marked exhausted.
        let max_attempts = credentials.len() + 1;
        let mut attempts = 0usize;
        let mut last_error: Option<AdapterError> = None;

        while attempts < max_attempts {
            attempts += 1;

            let record = self.store.load(profile.key(), &profile.window).await;
            let Some(credential) = first_available(&credentials, &record) else {
                warn!(
                    provider = profile.key(),
                    attempts, "every configured credential is exhausted"
                );
                metrics::counter!(
                    "rotation_exhausted_total",
                    "provider" => profile.key().to_string()
                )
                .increment(1);
                return Err(Error::CredentialsExhausted(profile.key().to_string()));
            };
            let credential = credential.to_string();

            metrics::counter!(
                "rotation_attempts_total",
                "provider" => profile.key().to_string()
            )
            .increment(1);

            match operation(Some(credential.clone())).await {
                Ok(value) => return Ok(value),
                Err(err) if is_quota_failure(&err, &profile.quota_keywords) => {
                    warn!(
                        provider = profile.key(),
                        credential = %redact_token(&credential),
                        attempt = attempts,
                        error = %err,
                        "credential quota exhausted, rotating"
                    );
                    metrics::counter!(
                        "rotation_quota_failures_total",
                        "provider" => profile.key().to_string()
                    )
                    .increment(1);
                    self.store
                        .mark_exhausted(profile.key(), &profile.window, &credential)
                        .await;
                    last_error = Some(err);
                }
                Err(err) => return Err(Error::Adapter(err)),
            }
        }

        // Attempt budget spent without a clean availability verdict, only
        // reachable when marks fail to stick (store inconsistency). The last
        // observed error beats a synthetic one.
        match last_error {
            Some(err) => Err(Error::Adapter(err)),
            None => Err(Error::Connectivity(profile.key().to_string())),
        }
    }

    /// Read-side token counts for a provider, for the health surface.
    pub async fn stats(&self, profile: &ProviderProfile, raw_tokens: Option<&str>) -> TokenStats {
        self.store
            .stats(profile.key(), &profile.window, raw_tokens)
            .await
    }

    /// The underlying exhaustion store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}
