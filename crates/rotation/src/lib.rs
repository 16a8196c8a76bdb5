//! Token-rotation request executor
//!
//! Wraps a caller-supplied async operation with credential rotation: pick
//! the first non-exhausted token, run the operation, classify any failure,
//! mark quota-exhausted tokens in the day-scoped store, and fail over until
//! the attempt budget (`credential_count + 1`) runs out. The executor is
//! provider-agnostic; everything provider-specific arrives through a
//! `ProviderProfile` (key, rotation window, quota keyword set, credential
//! policy) and the operation closure itself.
//!
//! Call lifecycle:
//! 1. Credential list parsed fresh from raw config (changes apply next call)
//! 2. Selector returns the earliest available credential, deterministically
//! 3. Operation runs; success returns immediately
//! 4. Quota failure marks the credential and loops; any other failure
//!    propagates unchanged on first occurrence
//! 5. No credential left → terminal `CredentialsExhausted`

pub mod classifier;
pub mod error;
pub mod executor;
pub mod profile;
pub mod selector;

pub use classifier::is_quota_failure;
pub use error::{Error, Result};
pub use executor::RotationExecutor;
pub use profile::ProviderProfile;
pub use selector::first_available;
