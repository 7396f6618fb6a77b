//! Authenticated principal extraction and assurance gates.
//!
//! Flow Overview: read the bearer token, verify and decode its claims with
//! the single claims-parsing implementation, re-derive the assurance level
//! server-side, and refuse tokens issued before the account's revocation
//! watermark. A client-asserted level is never trusted; anything
//! undecodable is refused.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::assurance::{AccessClaims, AssuranceLevel, AuthMethod, decode_access_token};

use super::error::AuthError;
use super::state::{AssuranceConfig, AuthState};
use super::storage::MfaStore;

/// Authenticated caller context derived from verified token claims.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    pub level: AssuranceLevel,
    pub methods: Vec<AuthMethod>,
    pub recovery: bool,
    pub issued_at: DateTime<Utc>,
}

impl Principal {
    pub(crate) fn from_claims(claims: &AccessClaims) -> Result<Self, AuthError> {
        // An assurance claim we cannot understand fails closed.
        let Some(level) = claims.effective_level() else {
            return Err(AuthError::Unauthenticated);
        };
        Ok(Self {
            account_id: claims.sub,
            email: claims.email.clone(),
            level,
            methods: claims.methods(),
            recovery: claims.is_recovery(),
            issued_at: claims.issued_at(),
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Verify the bearer token into a principal without consulting storage.
/// Callers that grant access go through [`authenticate`] instead, which also
/// applies the revocation watermark.
pub fn verify_bearer(
    headers: &HeaderMap,
    config: &AssuranceConfig,
) -> Result<Principal, AuthError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthError::Unauthenticated);
    };
    let claims = decode_access_token(&token, config.jwt_secret(), config.jwt_audience()).map_err(
        |err| {
            debug!("Rejected access token: {err}");
            AuthError::Unauthenticated
        },
    )?;
    Principal::from_claims(&claims)
}

/// Refuse tokens issued before the account's revocation watermark. The
/// provider has already destroyed its own sessions by the time the watermark
/// moves; this makes the revocation bite on locally-verified tokens too,
/// instead of letting them ride out their expiry.
pub(crate) async fn ensure_sessions_not_revoked(
    principal: &Principal,
    store: &dyn MfaStore,
) -> Result<(), AuthError> {
    let revoked_at = store
        .sessions_revoked_at(principal.account_id)
        .await
        .map_err(AuthError::Database)?;
    if let Some(revoked_at) = revoked_at {
        if principal.issued_at < revoked_at {
            debug!(
                account_id = %principal.account_id,
                "Rejected token issued before the revocation watermark"
            );
            return Err(AuthError::Unauthenticated);
        }
    }
    Ok(())
}

/// Verify the bearer token into a live principal. Recovery sessions pass;
/// use [`require_auth`] where they must not.
pub async fn authenticate(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let principal = verify_bearer(headers, state.config())?;
    ensure_sessions_not_revoked(&principal, state.store().as_ref()).await?;
    Ok(principal)
}

/// Authenticate and refuse recovery sessions: they are only valid for
/// setting a new credential or re-enrolling factors.
pub async fn require_auth(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let principal = authenticate(headers, state).await?;
    if principal.recovery {
        return Err(AuthError::RecoverySession);
    }
    Ok(principal)
}

/// Authenticate and require a stepped-up session.
pub async fn require_aal2(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let principal = require_auth(headers, state).await?;
    if !principal.level.meets(AssuranceLevel::Aal2) {
        return Err(AuthError::InsufficientAssurance);
    }
    Ok(principal)
}

/// Best-effort client address for audit metadata.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().map(str::trim)?;
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::{ExposeSecret, SecretString};
    use std::sync::Arc;

    use crate::assurance::{AmrEntry, Factor, FactorType};
    use crate::audit::{AuditEvent, AuditSink};
    use crate::idp::{Enrollment, IdentityProvider, IdpError, ProviderStatus, StepUpGrant};

    use super::super::storage::{AccountMfa, DisableOutcome};

    struct WatermarkStore {
        revoked_at: Option<DateTime<Utc>>,
    }

    #[async_trait]
    impl MfaStore for WatermarkStore {
        async fn load(&self, _account_id: Uuid) -> Result<Option<AccountMfa>> {
            Ok(None)
        }

        async fn record_factor_enrolled(&self, _account_id: Uuid) -> Result<i32> {
            Ok(1)
        }

        async fn record_factor_disabled(
            &self,
            _account_id: Uuid,
            _cooling_period_hours: i64,
        ) -> Result<DisableOutcome> {
            Ok(DisableOutcome::Committed {
                remaining_factors: 0,
            })
        }

        async fn record_sessions_revoked(&self, _account_id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn sessions_revoked_at(&self, _account_id: Uuid) -> Result<Option<DateTime<Utc>>> {
            Ok(self.revoked_at)
        }
    }

    struct NullProvider;

    #[async_trait]
    impl IdentityProvider for NullProvider {
        async fn verify_password(
            &self,
            _email: &str,
            _password: &SecretString,
        ) -> Result<(), IdpError> {
            Ok(())
        }

        async fn list_factors(&self, _account_id: Uuid) -> Result<Vec<Factor>, IdpError> {
            Ok(Vec::new())
        }

        async fn begin_enrollment(
            &self,
            _account_id: Uuid,
            _factor_type: FactorType,
        ) -> Result<Enrollment, IdpError> {
            Err(IdpError::FactorNotFound)
        }

        async fn verify_factor(
            &self,
            _account_id: Uuid,
            _factor_id: Uuid,
            _code: &str,
        ) -> Result<StepUpGrant, IdpError> {
            Err(IdpError::FactorNotFound)
        }

        async fn delete_factor(&self, _account_id: Uuid, _factor_id: Uuid) -> Result<(), IdpError> {
            Ok(())
        }

        async fn update_password(
            &self,
            _account_id: Uuid,
            _new_password: &SecretString,
        ) -> Result<(), IdpError> {
            Ok(())
        }

        async fn revoke_all_sessions(&self, _account_id: Uuid) -> Result<(), IdpError> {
            Ok(())
        }

        async fn dependency_status(&self) -> ProviderStatus {
            ProviderStatus::Ok
        }
    }

    struct NullSink;

    #[async_trait]
    impl AuditSink for NullSink {
        async fn record(&self, _event: &AuditEvent) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> AssuranceConfig {
        AssuranceConfig::new(
            "https://app.example.com".to_string(),
            SecretString::from("test-signing-secret"),
        )
    }

    fn state(revoked_at: Option<DateTime<Utc>>) -> AuthState {
        AuthState::new(
            config(),
            Arc::new(NullProvider),
            Arc::new(NullSink),
            Arc::new(WatermarkStore { revoked_at }),
        )
    }

    fn token(aal: Option<&str>, amr: Vec<AmrEntry>, config: &AssuranceConfig) -> String {
        token_issued_at(aal, amr, Utc::now().timestamp() - 30, config)
    }

    fn token_issued_at(
        aal: Option<&str>,
        amr: Vec<AmrEntry>,
        iat: i64,
        config: &AssuranceConfig,
    ) -> String {
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            aud: config.jwt_audience().to_string(),
            exp: Utc::now().timestamp() + 600,
            iat,
            aal: aal.map(ToString::to_string),
            amr,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret().expose_secret().as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let state = state(None);
        let result = require_auth(&HeaderMap::new(), &state).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn garbage_token_is_unauthenticated() {
        let state = state(None);
        let headers = headers_with("not-a-jwt");
        let result = require_auth(&headers, &state).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn aal2_gate_rejects_aal1() {
        let state = state(None);
        let headers = headers_with(&token(Some("aal1"), vec![], state.config()));
        let result = require_aal2(&headers, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientAssurance)));
    }

    #[tokio::test]
    async fn aal2_gate_accepts_aal2() {
        let state = state(None);
        let headers = headers_with(&token(Some("aal2"), vec![], state.config()));
        let principal = require_aal2(&headers, &state).await.unwrap();
        assert_eq!(principal.level, AssuranceLevel::Aal2);
    }

    #[tokio::test]
    async fn token_issued_before_watermark_is_refused() {
        let state = state(Some(Utc::now() - Duration::minutes(5)));
        let headers = headers_with(&token_issued_at(
            Some("aal2"),
            vec![],
            (Utc::now() - Duration::minutes(10)).timestamp(),
            state.config(),
        ));
        let result = require_aal2(&headers, &state).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn token_issued_after_watermark_passes() {
        let state = state(Some(Utc::now() - Duration::minutes(5)));
        let headers = headers_with(&token(Some("aal2"), vec![], state.config()));
        assert!(require_aal2(&headers, &state).await.is_ok());
    }

    #[tokio::test]
    async fn recovery_session_is_refused_by_require_auth() {
        let state = state(None);
        let amr = vec![AmrEntry {
            method: AuthMethod::Otp,
            timestamp: Utc::now().timestamp(),
        }];
        let headers = headers_with(&token(None, amr, state.config()));

        assert!(matches!(
            require_auth(&headers, &state).await,
            Err(AuthError::RecoverySession)
        ));
        // But authenticate() still resolves it for enrollment flows.
        let principal = authenticate(&headers, &state).await.unwrap();
        assert!(principal.recovery);
    }

    #[tokio::test]
    async fn unknown_assurance_label_fails_closed() {
        let state = state(None);
        let headers = headers_with(&token(Some("aal9"), vec![], state.config()));
        assert!(matches!(
            authenticate(&headers, &state).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            extract_client_ip(&headers).as_deref(),
            Some("203.0.113.7")
        );
    }
}
