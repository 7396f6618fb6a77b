//! Bearer-token introspection for the frontend session store.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::assurance::decode_access_token;

use super::principal::extract_bearer_token;
use super::state::AuthState;
use super::types::SessionResponse;

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing and undecodable tokens are both "no session" so auth state
    // never leaks to an unauthenticated caller.
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let config = state.config();
    let claims = match decode_access_token(&token, config.jwt_secret(), config.jwt_audience()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Rejected session token: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    // A token issued before the revocation watermark is no session; a
    // watermark read failure is treated the same way.
    match state.store().sessions_revoked_at(claims.sub).await {
        Ok(Some(revoked_at)) if claims.issued_at() < revoked_at => {
            return StatusCode::NO_CONTENT.into_response();
        }
        Ok(_) => {}
        Err(err) => {
            error!("Revocation watermark read failed during introspection: {err:#}");
            return StatusCode::NO_CONTENT.into_response();
        }
    }

    let response = SessionResponse {
        account_id: claims.sub.to_string(),
        email: claims.email.clone(),
        level: claims.effective_level(),
        methods: claims.methods(),
        recovery: claims.is_recovery(),
    };
    (StatusCode::OK, Json(response)).into_response()
}
