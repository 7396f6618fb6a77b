//! Identity provider seam.
//!
//! Everything the platform owns (password verification, factor
//! challenge/response, token issuance, session revocation) sits behind
//! [`IdentityProvider`]. Handlers depend on the trait; the HTTP client in
//! [`client`] talks to the platform's admin API.

pub mod client;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::assurance::{Factor, FactorType};

pub use client::HttpIdentityProvider;

/// Provider-side failures, already classified for the caller.
#[derive(Debug, Error)]
pub enum IdpError {
    #[error("incorrect credentials")]
    InvalidCredentials,
    #[error("invalid or expired code")]
    InvalidCode,
    #[error("factor not found")]
    FactorNotFound,
    /// Network, timeout, or unexpected provider response. Timeouts are a
    /// failure of this step; they are never retried blindly.
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// A pending factor created by an enrollment request. Per-flow object: the
/// caller carries it through the verify step, nothing is kept module-wide.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Enrollment {
    pub factor: Factor,
    /// Provisioning payload for the authenticator (e.g. an otpauth URI).
    pub provisioning_uri: Option<String>,
}

/// Result of a successful factor challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepUpGrant {
    pub factor: Factor,
    /// Fresh AAL2 access token minted by the provider.
    pub access_token: String,
    /// True when this challenge promoted a pending factor to verified.
    pub newly_verified: bool,
}

/// Reachability of the provider, reported by `/health`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderStatus {
    Ok,
    Error,
}

impl ProviderStatus {
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Ok)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Calls into the external identity platform.
///
/// All methods are awaited to completion by callers; there is no
/// fire-and-forget path here.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Live password check against the account of record.
    ///
    /// Contract: this call MUST NOT affect any existing session. The
    /// platform's credential check can mint a throwaway low-assurance
    /// session as a side effect; implementations discard every such
    /// artifact so a caller's AAL2 session is never silently replaced.
    /// The secret is never logged or stored.
    async fn verify_password(&self, email: &str, password: &SecretString) -> Result<(), IdpError>;

    /// Fresh factor set for the account, pending and verified.
    async fn list_factors(&self, account_id: Uuid) -> Result<Vec<Factor>, IdpError>;

    /// Create a pending factor and return its provisioning data.
    async fn begin_enrollment(
        &self,
        account_id: Uuid,
        factor_type: FactorType,
    ) -> Result<Enrollment, IdpError>;

    /// Challenge-response against a factor. Verifying a pending factor
    /// promotes it; verifying an already-verified factor is a step-up or a
    /// fresh re-proof for a sensitive operation.
    async fn verify_factor(
        &self,
        account_id: Uuid,
        factor_id: Uuid,
        code: &str,
    ) -> Result<StepUpGrant, IdpError>;

    /// Destroy a factor. An already-gone factor is `FactorNotFound`.
    async fn delete_factor(&self, account_id: Uuid, factor_id: Uuid) -> Result<(), IdpError>;

    /// Replace the account's password credential. Returns only once the
    /// provider has durably applied the change.
    async fn update_password(
        &self,
        account_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), IdpError>;

    /// Invalidate every live session for the account, not only the
    /// caller's. Idempotent: zero live sessions is a no-op, not an error.
    async fn revoke_all_sessions(&self, account_id: Uuid) -> Result<(), IdpError>;

    async fn dependency_status(&self) -> ProviderStatus;
}
