//! Error taxonomy for the assurance endpoints.
//!
//! Every rejection names its concrete reason (wrong password, wrong code,
//! stronger factor, remaining wait), with one exception: credential checks
//! stay opaque in contexts where detail would aid account enumeration.
//! Infrastructure failures surface as generic retryable errors and are
//! logged with their full error chain here, never inside response bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::assurance::RemovalBlock;
use crate::idp::IdpError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing or invalid session token")]
    Unauthenticated,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("This operation requires step-up authentication")]
    InsufficientAssurance,

    #[error("Recovery sessions must complete the credential reset flow first")]
    RecoverySession,

    #[error("{0}")]
    BadRequest(String),

    #[error("Factor not found")]
    FactorNotFound,

    #[error("Factor removal blocked by policy")]
    PolicyViolation(RemovalBlock),

    #[error("Session revocation failed")]
    RevocationFailed(#[source] anyhow::Error),

    #[error("Identity provider request failed")]
    Provider(#[source] anyhow::Error),

    #[error("Database request failed")]
    Database(#[source] anyhow::Error),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<IdpError> for AuthError {
    fn from(err: IdpError) -> Self {
        match err {
            IdpError::InvalidCredentials => Self::IncorrectPassword,
            IdpError::InvalidCode => Self::InvalidCode,
            IdpError::FactorNotFound => Self::FactorNotFound,
            IdpError::Unavailable(source) => Self::Provider(source),
        }
    }
}

/// Structured error body; optional fields appear only when they apply.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_aal2: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_factor: Option<&'static str>,
}

impl ErrorBody {
    fn new(error: String, code: &'static str) -> Self {
        Self {
            error,
            code,
            requires_aal2: None,
            hours_remaining: None,
            blocking_factor: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(self.to_string(), "unauthenticated"),
            ),
            Self::IncorrectPassword => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(self.to_string(), "incorrect_password"),
            ),
            Self::InvalidCode => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(self.to_string(), "invalid_code"),
            ),
            Self::InsufficientAssurance => {
                let mut body = ErrorBody::new(self.to_string(), "insufficient_assurance");
                body.requires_aal2 = Some(true);
                (StatusCode::FORBIDDEN, body)
            }
            Self::RecoverySession => (
                StatusCode::FORBIDDEN,
                ErrorBody::new(self.to_string(), "recovery_session"),
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(message, "bad_request"),
            ),
            Self::FactorNotFound => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(self.to_string(), "factor_not_found"),
            ),
            Self::PolicyViolation(block) => {
                let mut body = match &block {
                    RemovalBlock::StrongerFactor { blocking } => {
                        let mut body = ErrorBody::new(
                            format!(
                                "A stronger verified factor ({blocking}) must be removed first"
                            ),
                            "stronger_factor_enrolled",
                        );
                        body.blocking_factor = Some(blocking.as_str());
                        body
                    }
                    RemovalBlock::CoolingPeriod { hours_remaining } => {
                        let mut body = ErrorBody::new(
                            format!(
                                "Your last factor can be removed in {hours_remaining} hour(s)"
                            ),
                            "cooling_period",
                        );
                        body.hours_remaining = Some(*hours_remaining);
                        body
                    }
                };
                // The caller already holds AAL2; stepping up will not help.
                body.requires_aal2 = Some(false);
                (StatusCode::CONFLICT, body)
            }
            Self::RevocationFailed(source) => {
                error!("Session revocation failed: {source:#}");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new(
                        "Session revocation failed; please retry".to_string(),
                        "revocation_failed",
                    ),
                )
            }
            Self::Provider(source) => {
                error!("Identity provider request failed: {source:#}");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new(
                        "Identity provider is unavailable; please retry".to_string(),
                        "provider_unavailable",
                    ),
                )
            }
            Self::Database(source) => {
                error!("Database request failed: {source:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal error; please retry".to_string(), "internal"),
                )
            }
            Self::Internal(source) => {
                error!("Internal error: {source:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal error; please retry".to_string(), "internal"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assurance::FactorType;
    use axum::http::StatusCode;

    #[test]
    fn insufficient_assurance_carries_step_up_flag() {
        let response = AuthError::InsufficientAssurance.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn cooling_period_body_names_the_wait() {
        let block = RemovalBlock::CoolingPeriod { hours_remaining: 5 };
        let response = AuthError::PolicyViolation(block).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn hierarchy_body_names_blocking_factor() {
        let block = RemovalBlock::StrongerFactor {
            blocking: FactorType::HardwareKey,
        };
        let response = AuthError::PolicyViolation(block).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn idp_error_mapping() {
        assert!(matches!(
            AuthError::from(IdpError::InvalidCredentials),
            AuthError::IncorrectPassword
        ));
        assert!(matches!(
            AuthError::from(IdpError::InvalidCode),
            AuthError::InvalidCode
        ));
        assert!(matches!(
            AuthError::from(IdpError::FactorNotFound),
            AuthError::FactorNotFound
        ));
    }

    #[test]
    fn error_body_omits_unset_fields() {
        let body = ErrorBody::new("nope".to_string(), "bad_request");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "nope");
        assert!(json.get("hours_remaining").is_none());
        assert!(json.get("blocking_factor").is_none());
    }
}
