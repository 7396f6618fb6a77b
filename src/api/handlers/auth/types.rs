//! Request and response bodies for the assurance endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::assurance::{AssuranceLevel, AuthMethod, FactorStatus, FactorType};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DisableMfaRequest {
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
    /// Fresh challenge response against the factor being disabled.
    pub code: String,
    pub factor_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    #[schema(value_type = String, format = Password)]
    pub current_password: SecretString,
    #[schema(value_type = String, format = Password)]
    pub new_password: SecretString,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EnrollFactorRequest {
    pub factor_type: FactorType,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyFactorRequest {
    pub factor_id: Uuid,
    pub code: String,
}

/// Response for committed credential changes. `requires_reauth` is always
/// true: every prior session was revoked.
#[derive(Debug, Serialize, ToSchema)]
pub struct MutationResponse {
    pub success: bool,
    pub requires_reauth: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollFactorResponse {
    pub factor_id: Uuid,
    pub factor_type: FactorType,
    pub status: FactorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_uri: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyFactorResponse {
    /// Fresh AAL2 token minted by the provider; replaces the caller's
    /// current token.
    pub access_token: String,
    pub level: AssuranceLevel,
    pub factor_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub account_id: String,
    pub email: String,
    /// Absent when the token's assurance claim cannot be understood.
    #[schema(value_type = Option<String>)]
    pub level: Option<AssuranceLevel>,
    #[schema(value_type = Vec<String>)]
    pub methods: Vec<AuthMethod>,
    pub recovery: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FactorView {
    pub id: Uuid,
    pub factor_type: FactorType,
    pub status: FactorStatus,
    pub enrolled_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub account_id: String,
    pub email: String,
    pub level: AssuranceLevel,
    pub factors: Vec<FactorView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_mfa_change: Option<String>,
}
