//! Step-up MFA endpoints: factor disable, password change, enrollment, and
//! challenge verification.
//!
//! Flow Overview (sensitive mutations):
//! 1) Re-derive the caller's assurance level from the verified token.
//! 2) Verify the password (and a fresh factor challenge for disables).
//! 3) Apply the removal guard over provider-held state.
//! 4) Commit through a guarded single-statement update, then delete the
//!    factor / update the credential at the provider.
//! 5) Revoke every session for the account and move the local revocation
//!    watermark; a failure here is an operation failure, not a warning.
//! 6) Append a best-effort audit record.
//!
//! Security boundaries: the committed portion (steps 4-6) runs on its own
//! task so a client disconnect cannot cancel revocation after the commit.
//! Passwords and codes pass through to the provider without being logged.

pub mod error;
pub mod principal;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

use axum::{Json, extract::Extension, http::HeaderMap};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::assurance::{
    AssuranceLevel, Factor, Operation, RemovalBlock, RemovalDecision, check_removal,
    cooling_hours_remaining, required_level,
};
use crate::audit::{AuditEvent, EventKind, record_best_effort};
use crate::idp::IdpError;

pub use error::AuthError;
pub use state::{AssuranceConfig, AuthState};

use error::ErrorBody;
use principal::{Principal, extract_client_ip};
use storage::DisableOutcome;
use types::{
    ChangePasswordRequest, DisableMfaRequest, EnrollFactorRequest, EnrollFactorResponse,
    MutationResponse, VerifyFactorRequest, VerifyFactorResponse,
};

const MIN_NEW_PASSWORD_LENGTH: usize = 8;

/// Run the committed portion of a flow on its own task so the caller's
/// disconnect cannot cancel it. The handle is still awaited: the response
/// reflects the real outcome.
async fn shielded<F>(flow: F) -> Result<(), AuthError>
where
    F: Future<Output = Result<(), AuthError>> + Send + 'static,
{
    match tokio::spawn(flow).await {
        Ok(result) => result,
        Err(err) => Err(AuthError::Internal(anyhow::Error::new(err))),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/disable",
    request_body = DisableMfaRequest,
    responses(
        (status = 200, description = "Factor disabled; all sessions revoked.", body = MutationResponse),
        (status = 401, description = "Wrong password or code, or no valid session.", body = ErrorBody),
        (status = 403, description = "Session lacks AAL2.", body = ErrorBody),
        (status = 404, description = "Factor not found or not verified.", body = ErrorBody),
        (status = 409, description = "Blocked by the hierarchy or cooling-period rule.", body = ErrorBody),
        (status = 502, description = "Identity provider failure or failed revocation.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn disable_mfa(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<DisableMfaRequest>,
) -> Result<Json<MutationResponse>, AuthError> {
    let principal = principal::require_aal2(&headers, &state).await?;
    let client_ip = extract_client_ip(&headers);

    state
        .provider()
        .verify_password(&principal.email, &payload.password)
        .await?;

    let factors = state.provider().list_factors(principal.account_id).await?;
    let verified: Vec<Factor> = factors.into_iter().filter(Factor::is_verified).collect();
    let Some(target) = verified
        .iter()
        .find(|factor| factor.id == payload.factor_id)
        .cloned()
    else {
        // Also the already-disabled case: never a silent success, never a
        // duplicate audit record.
        return Err(AuthError::FactorNotFound);
    };

    // Fresh challenge at disable time; "session is AAL2" alone is not
    // enough. The grant token is dropped so it cannot replace the caller's
    // session.
    state
        .provider()
        .verify_factor(principal.account_id, target.id, &payload.code)
        .await?;

    // The stored timestamp only feeds the cooling check, which only applies
    // when this is the last verified factor.
    let last_mfa_change = if verified.len() == 1 {
        state
            .store()
            .load(principal.account_id)
            .await
            .map_err(AuthError::Database)?
            .and_then(|m| m.last_mfa_change)
    } else {
        None
    };

    let decision = check_removal(
        &target,
        &verified,
        last_mfa_change,
        state.config().cooling_period_hours(),
        Utc::now(),
    )
    .map_err(AuthError::PolicyViolation)?;

    let state = state.0.clone();
    shielded(async move { commit_disable(&state, &principal, &target, decision, client_ip).await })
        .await?;

    Ok(Json(MutationResponse {
        success: true,
        requires_reauth: true,
    }))
}

async fn commit_disable(
    state: &AuthState,
    principal: &Principal,
    target: &Factor,
    decision: RemovalDecision,
    client_ip: Option<String>,
) -> Result<(), AuthError> {
    let cooling_period_hours = state.config().cooling_period_hours();
    let outcome = state
        .store()
        .record_factor_disabled(principal.account_id, cooling_period_hours)
        .await
        .map_err(AuthError::Database)?;

    let remaining_factors = match outcome {
        DisableOutcome::Committed { remaining_factors } => remaining_factors,
        DisableOutcome::CoolingBlocked => {
            // A concurrent change moved last_mfa_change between the policy
            // check and the commit; re-derive the wait for the response.
            let metadata = state
                .store()
                .load(principal.account_id)
                .await
                .map_err(AuthError::Database)?;
            let hours_remaining = metadata.and_then(|m| m.last_mfa_change).map_or(1, |at| {
                cooling_hours_remaining(at, cooling_period_hours, Utc::now())
            });
            return Err(AuthError::PolicyViolation(RemovalBlock::CoolingPeriod {
                hours_remaining,
            }));
        }
    };

    match state
        .provider()
        .delete_factor(principal.account_id, target.id)
        .await
    {
        Ok(()) => {}
        Err(IdpError::FactorNotFound) => {
            // Already gone at the provider; the committed count matches the
            // desired end state.
            warn!(
                account_id = %principal.account_id,
                factor_id = %target.id,
                "Factor already removed at the provider"
            );
        }
        Err(err) => return Err(AuthError::from(err)),
    }

    state
        .provider()
        .revoke_all_sessions(principal.account_id)
        .await
        .map_err(|err| AuthError::RevocationFailed(anyhow::Error::new(err)))?;

    // Watermark write is part of revocation: without it, tokens we verify
    // locally would outlive the provider-side purge.
    state
        .store()
        .record_sessions_revoked(principal.account_id)
        .await
        .map_err(AuthError::RevocationFailed)?;

    let event = AuditEvent {
        account_id: principal.account_id,
        kind: EventKind::MfaDisabled,
        payload: json!({
            "factor_id": target.id,
            "factor_type": target.factor_type,
            "last_factor": decision.last_verified_factor,
            "remaining_factors": remaining_factors,
            "session_aal": principal.level,
        }),
        client_ip,
    };
    record_best_effort(state.audit().as_ref(), event).await;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions revoked.", body = MutationResponse),
        (status = 400, description = "New password rejected.", body = ErrorBody),
        (status = 401, description = "Wrong current password or no valid session.", body = ErrorBody),
        (status = 403, description = "Session lacks AAL2 while a verified factor is enrolled.", body = ErrorBody),
        (status = 502, description = "Identity provider failure or failed revocation.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MutationResponse>, AuthError> {
    let principal = principal::require_auth(&headers, &state).await?;
    let client_ip = extract_client_ip(&headers);

    if payload.new_password.expose_secret().len() < MIN_NEW_PASSWORD_LENGTH {
        return Err(AuthError::BadRequest(format!(
            "New password must be at least {MIN_NEW_PASSWORD_LENGTH} characters long"
        )));
    }

    // The policy flips to AAL2 the moment any verified factor exists; the
    // factor set comes from the provider, never from the client.
    let factors = state.provider().list_factors(principal.account_id).await?;
    let has_verified_factor = factors.iter().any(Factor::is_verified);
    let required = required_level(Operation::ChangePassword, has_verified_factor);
    if !principal.level.meets(required) {
        return Err(AuthError::InsufficientAssurance);
    }

    state
        .provider()
        .verify_password(&principal.email, &payload.current_password)
        .await?;

    let state = state.0.clone();
    let new_password = payload.new_password;
    shielded(async move {
        commit_password_change(&state, &principal, has_verified_factor, new_password, client_ip)
            .await
    })
    .await?;

    Ok(Json(MutationResponse {
        success: true,
        requires_reauth: true,
    }))
}

async fn commit_password_change(
    state: &AuthState,
    principal: &Principal,
    has_verified_factor: bool,
    new_password: SecretString,
    client_ip: Option<String>,
) -> Result<(), AuthError> {
    state
        .provider()
        .update_password(principal.account_id, &new_password)
        .await?;

    state
        .provider()
        .revoke_all_sessions(principal.account_id)
        .await
        .map_err(|err| AuthError::RevocationFailed(anyhow::Error::new(err)))?;

    state
        .store()
        .record_sessions_revoked(principal.account_id)
        .await
        .map_err(AuthError::RevocationFailed)?;

    let event = AuditEvent {
        account_id: principal.account_id,
        kind: EventKind::PasswordChanged,
        payload: json!({
            "session_aal": principal.level,
            "has_verified_factor": has_verified_factor,
        }),
        client_ip,
    };
    record_best_effort(state.audit().as_ref(), event).await;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll",
    request_body = EnrollFactorRequest,
    responses(
        (status = 201, description = "Pending factor created.", body = EnrollFactorResponse),
        (status = 401, description = "No valid session.", body = ErrorBody),
        (status = 502, description = "Identity provider failure.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn enroll_factor(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<EnrollFactorRequest>,
) -> Result<(axum::http::StatusCode, Json<EnrollFactorResponse>), AuthError> {
    // Recovery sessions may re-enroll factors before their fresh sign-in.
    let principal = principal::authenticate(&headers, &state).await?;

    let enrollment = state
        .provider()
        .begin_enrollment(principal.account_id, payload.factor_type)
        .await?;

    // Pending factors do not touch factor_count; that happens when the
    // enrollment challenge verifies.
    Ok((
        axum::http::StatusCode::CREATED,
        Json(EnrollFactorResponse {
            factor_id: enrollment.factor.id,
            factor_type: enrollment.factor.factor_type,
            status: enrollment.factor.status,
            provisioning_uri: enrollment.provisioning_uri,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/verify",
    request_body = VerifyFactorRequest,
    responses(
        (status = 200, description = "Challenge verified; session stepped up to AAL2.", body = VerifyFactorResponse),
        (status = 401, description = "Wrong code or no valid session.", body = ErrorBody),
        (status = 404, description = "Factor not found.", body = ErrorBody),
        (status = 502, description = "Identity provider failure.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn verify_factor(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<VerifyFactorRequest>,
) -> Result<Json<VerifyFactorResponse>, AuthError> {
    let principal = principal::authenticate(&headers, &state).await?;
    let client_ip = extract_client_ip(&headers);

    let grant = state
        .provider()
        .verify_factor(principal.account_id, payload.factor_id, &payload.code)
        .await?;

    // Bookkeeping after a provider-side grant is committed work too.
    let state_handle = state.0.clone();
    let factor = grant.factor.clone();
    let newly_verified = grant.newly_verified;
    shielded(async move {
        if newly_verified {
            let factor_count = state_handle
                .store()
                .record_factor_enrolled(factor.account_id)
                .await
                .map_err(AuthError::Database)?;
            let event = AuditEvent {
                account_id: factor.account_id,
                kind: EventKind::FactorEnrolled,
                payload: json!({
                    "factor_id": factor.id,
                    "factor_type": factor.factor_type,
                    "factor_count": factor_count,
                }),
                client_ip: client_ip.clone(),
            };
            record_best_effort(state_handle.audit().as_ref(), event).await;
        }

        let event = AuditEvent {
            account_id: factor.account_id,
            kind: EventKind::LoginAal2,
            payload: json!({
                "factor_id": factor.id,
                "factor_type": factor.factor_type,
                "step_up": !newly_verified,
            }),
            client_ip,
        };
        record_best_effort(state_handle.audit().as_ref(), event).await;

        Ok(())
    })
    .await?;

    Ok(Json(VerifyFactorResponse {
        access_token: grant.access_token,
        level: AssuranceLevel::Aal2,
        factor_id: grant.factor.id,
    }))
}
