//! Error types for rotation operations

use provider::AdapterError;

/// Errors surfaced by the rotation executor.
///
/// `CredentialRequired`, `CredentialsExhausted` and `Connectivity` originate
/// here; `Adapter` is a transparent pass-through of whatever the provider
/// operation raised, original message intact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("provider {0} requires a credential and none are configured")]
    CredentialRequired(String),

    #[error("all credentials exhausted for provider {0}")]
    CredentialsExhausted(String),

    #[error("connectivity failure calling provider {0}")]
    Connectivity(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Result alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;
