//! Factor taxonomy and the fixed strength hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of supported second-factor types, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    HardwareKey,
    AppCode,
    SmsCode,
    EmailCode,
}

impl FactorType {
    /// Strength score used by the hierarchy check. Higher is stronger;
    /// equal scores never block each other.
    #[must_use]
    pub const fn strength(self) -> u8 {
        match self {
            Self::HardwareKey => 4,
            Self::AppCode => 3,
            Self::SmsCode => 2,
            Self::EmailCode => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HardwareKey => "hardware_key",
            Self::AppCode => "app_code",
            Self::SmsCode => "sms_code",
            Self::EmailCode => "email_code",
        }
    }
}

impl std::fmt::Display for FactorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only `Verified` factors count toward assurance or hierarchy decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FactorStatus {
    Pending,
    Verified,
}

/// A second-factor credential as held by the identity provider.
///
/// Factors are fetched fresh from the provider for every decision; the
/// service never trusts a client-reported factor set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Factor {
    pub id: Uuid,
    pub account_id: Uuid,
    pub factor_type: FactorType,
    pub status: FactorStatus,
    pub enrolled_at: DateTime<Utc>,
}

impl Factor {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == FactorStatus::Verified
    }
}
