//! Assurance domain: levels, the operation policy table, factor taxonomy,
//! claims parsing, and the removal guard. No I/O lives here.

pub mod claims;
pub mod factor;
pub mod removal;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use claims::{AccessClaims, AmrEntry, AuthMethod, decode_access_token};
pub use factor::{Factor, FactorStatus, FactorType};
pub use removal::{
    DEFAULT_COOLING_PERIOD_HOURS, RemovalBlock, RemovalDecision, check_removal,
    cooling_hours_remaining,
};

/// Authentication Assurance Level of a session.
///
/// `Aal1` is password only; `Aal2` adds a verified second factor presented
/// this session. The order is total: `Aal1 < Aal2`. Upgrades happen only
/// through a successful factor challenge; there is no implicit downgrade.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AssuranceLevel {
    Aal1,
    Aal2,
}

impl AssuranceLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aal1 => "aal1",
            Self::Aal2 => "aal2",
        }
    }

    #[must_use]
    pub fn meets(self, required: Self) -> bool {
        self >= required
    }
}

impl std::fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guarded operations the policy table knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    AppAccess,
    ChangePassword,
    ChangeEmail,
    ModifyRecords,
    /// Also demands a fresh factor challenge at disable time, enforced by
    /// the endpoint on top of the level returned here.
    DisableFactor,
}

/// Required assurance for an operation, given whether the account holds any
/// verified factor. Accounts that never enrolled a factor stay at AAL1.
#[must_use]
pub const fn required_level(operation: Operation, has_verified_factor: bool) -> AssuranceLevel {
    match operation {
        Operation::DisableFactor => AssuranceLevel::Aal2,
        Operation::AppAccess
        | Operation::ChangePassword
        | Operation::ChangeEmail
        | Operation::ModifyRecords => {
            if has_verified_factor {
                AssuranceLevel::Aal2
            } else {
                AssuranceLevel::Aal1
            }
        }
    }
}
