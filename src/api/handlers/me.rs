//! Guarded account profile endpoint.
//!
//! Every request walks the route guard before any account data is read:
//! missing, invalid, or revoked sessions bounce to sign-in, recovery
//! sessions bounce to credential reset, and an AAL1 session on an account
//! with a verified factor is terminated and sent back through the
//! second-factor prompt.

use axum::{
    Json,
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::api::guard::{self, GuardDecision, SessionClass};
use crate::assurance::Factor;

use super::auth::error::{AuthError, ErrorBody};
use super::auth::principal::extract_bearer_token;
use super::auth::state::AuthState;
use super::auth::types::{FactorView, MeResponse};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Profile for an adequately-assured session", body = MeResponse),
        (status = 303, description = "Redirect to sign-in or credential reset"),
        (status = 500, description = "Account metadata could not be read", body = ErrorBody),
    ),
    tag = "me"
)]
pub async fn me(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let config = state.config();
    let token = extract_bearer_token(&headers);
    let class = guard::classify_session(token.as_deref(), config);

    // A token that predates the account's revocation watermark is not a
    // session, no matter how well it verifies.
    let class = match class {
        SessionClass::Active(principal) => {
            match state.store().sessions_revoked_at(principal.account_id).await {
                Ok(Some(revoked_at)) if principal.issued_at < revoked_at => SessionClass::Invalid,
                Ok(_) => SessionClass::Active(principal),
                Err(err) => {
                    error!("Revocation watermark read failed during route guard: {err:#}");
                    SessionClass::Invalid
                }
            }
        }
        other => other,
    };

    // The factor set drives the policy, so it is read before the decision.
    // If the provider cannot answer, the guard fails closed.
    let factors = match &class {
        SessionClass::Active(principal) => {
            match state.provider().list_factors(principal.account_id).await {
                Ok(factors) => factors,
                Err(err) => {
                    error!("Factor listing failed during route guard: {err}");
                    let deny = GuardDecision::SignIn {
                        prompt_mfa: false,
                        terminate_session: false,
                    };
                    return guard::deny_response(&deny, config)
                        .unwrap_or_else(|| AuthError::Unauthenticated.into_response());
                }
            }
        }
        _ => Vec::new(),
    };
    let has_verified_factor = factors.iter().any(Factor::is_verified);

    let decision = guard::evaluate(&class, has_verified_factor);
    let principal = match decision {
        GuardDecision::Allow(ref principal) => principal.clone(),
        ref deny => {
            // deny_response is total over denying decisions.
            return guard::deny_response(deny, config)
                .unwrap_or_else(|| AuthError::Unauthenticated.into_response());
        }
    };

    let metadata = match state.store().load(principal.account_id).await {
        Ok(metadata) => metadata,
        Err(err) => return AuthError::Database(err).into_response(),
    };

    let response = MeResponse {
        account_id: principal.account_id.to_string(),
        email: principal.email,
        level: principal.level,
        factors: factors
            .into_iter()
            .map(|factor| FactorView {
                id: factor.id,
                factor_type: factor.factor_type,
                status: factor.status,
                enrolled_at: factor.enrolled_at.to_rfc3339(),
            })
            .collect(),
        last_mfa_change: metadata
            .and_then(|m| m.last_mfa_change)
            .map(|at| at.to_rfc3339()),
    };
    Json(response).into_response()
}
