//! Factor removal guard: hierarchy and cooling-period checks.
//!
//! Flow Overview:
//! 1) Reject when any other verified factor is strictly stronger.
//! 2) When removing the last verified factor, reject while the cooling
//!    period since `last_mfa_change` has not elapsed.
//!
//! Both checks run over server-held state fetched at the moment of disable;
//! the commit re-checks the cooling rule atomically in the datastore.

use chrono::{DateTime, Duration, Utc};

use super::factor::{Factor, FactorType};

pub const DEFAULT_COOLING_PERIOD_HOURS: i64 = 24;

/// Why a factor disable was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalBlock {
    /// Another verified factor outranks the one being disabled.
    StrongerFactor { blocking: FactorType },
    /// The last verified factor cannot be removed yet.
    CoolingPeriod { hours_remaining: i64 },
}

/// A permitted removal, with context the caller records in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalDecision {
    /// True when disabling this factor leaves the account with zero
    /// verified factors.
    pub last_verified_factor: bool,
}

/// Decide whether `target` may be disabled.
///
/// `verified` is the account's full verified factor set (including the
/// target). `last_mfa_change` is the most recent verified-factor count
/// change; `None` means no change was ever recorded, which cannot be more
/// recent than any cooling period.
///
/// # Errors
/// Returns the specific [`RemovalBlock`] that refused the disable.
pub fn check_removal(
    target: &Factor,
    verified: &[Factor],
    last_mfa_change: Option<DateTime<Utc>>,
    cooling_period_hours: i64,
    now: DateTime<Utc>,
) -> Result<RemovalDecision, RemovalBlock> {
    // Hierarchy: a compromised weak factor must not strip a stronger one.
    let blocking = verified
        .iter()
        .filter(|factor| factor.id != target.id)
        .filter(|factor| factor.factor_type.strength() > target.factor_type.strength())
        .max_by_key(|factor| factor.factor_type.strength());

    if let Some(stronger) = blocking {
        return Err(RemovalBlock::StrongerFactor {
            blocking: stronger.factor_type,
        });
    }

    let remaining_after = verified
        .iter()
        .filter(|factor| factor.id != target.id)
        .count();

    if remaining_after == 0 {
        if let Some(changed_at) = last_mfa_change {
            let elapsed = now - changed_at;
            let cooling = Duration::hours(cooling_period_hours);
            if elapsed < cooling {
                return Err(RemovalBlock::CoolingPeriod {
                    hours_remaining: hours_remaining(cooling - elapsed),
                });
            }
        }
    }

    Ok(RemovalDecision {
        last_verified_factor: remaining_after == 0,
    })
}

/// Remaining cooling wait for a change made at `last_mfa_change`, rounded
/// up to whole hours.
#[must_use]
pub fn cooling_hours_remaining(
    last_mfa_change: DateTime<Utc>,
    cooling_period_hours: i64,
    now: DateTime<Utc>,
) -> i64 {
    hours_remaining(Duration::hours(cooling_period_hours) - (now - last_mfa_change))
}

/// Remaining wait rounded up to whole hours, never below 1.
fn hours_remaining(remaining: Duration) -> i64 {
    let seconds = remaining.num_seconds().max(0);
    ((seconds + 3599) / 3600).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assurance::factor::FactorStatus;
    use chrono::Duration;
    use uuid::Uuid;

    fn verified(factor_type: FactorType) -> Factor {
        Factor {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            factor_type,
            status: FactorStatus::Verified,
            enrolled_at: Utc::now() - Duration::days(7),
        }
    }

    #[test]
    fn stronger_factor_blocks_weaker_disable() {
        let totp = verified(FactorType::AppCode);
        let key = verified(FactorType::HardwareKey);
        let set = vec![totp.clone(), key];

        let result = check_removal(&totp, &set, None, 24, Utc::now());
        assert_eq!(
            result,
            Err(RemovalBlock::StrongerFactor {
                blocking: FactorType::HardwareKey
            })
        );
    }

    #[test]
    fn any_stronger_factor_blocks_regardless_of_gap() {
        let sms = verified(FactorType::SmsCode);
        let totp = verified(FactorType::AppCode);
        let set = vec![sms.clone(), totp];

        // SMS sits below TOTP in the hierarchy, so a TOTP factor blocks the
        // SMS disable just like a hardware key would.
        let result = check_removal(&sms, &set, None, 24, Utc::now());
        assert_eq!(
            result,
            Err(RemovalBlock::StrongerFactor {
                blocking: FactorType::AppCode
            })
        );
    }

    #[test]
    fn strongest_factor_disables_past_weaker_ones() {
        let sms = verified(FactorType::SmsCode);
        let totp = verified(FactorType::AppCode);
        let set = vec![sms, totp.clone()];

        let decision = check_removal(&totp, &set, None, 24, Utc::now()).unwrap();
        assert!(!decision.last_verified_factor);
    }

    #[test]
    fn equal_strength_never_blocks() {
        let first = verified(FactorType::AppCode);
        let second = verified(FactorType::AppCode);
        let set = vec![first.clone(), second];

        assert!(check_removal(&first, &set, None, 24, Utc::now()).is_ok());
    }

    #[test]
    fn cooling_period_blocks_last_factor_at_23h() {
        let totp = verified(FactorType::AppCode);
        let set = vec![totp.clone()];
        let now = Utc::now();

        let result = check_removal(&totp, &set, Some(now - Duration::hours(23)), 24, now);
        assert_eq!(
            result,
            Err(RemovalBlock::CoolingPeriod { hours_remaining: 1 })
        );
    }

    #[test]
    fn cooling_period_accepts_last_factor_at_25h() {
        let totp = verified(FactorType::AppCode);
        let set = vec![totp.clone()];
        let now = Utc::now();

        let decision =
            check_removal(&totp, &set, Some(now - Duration::hours(25)), 24, now).unwrap();
        assert!(decision.last_verified_factor);
    }

    #[test]
    fn fresh_enrollment_reports_nearly_full_wait() {
        let totp = verified(FactorType::AppCode);
        let set = vec![totp.clone()];
        let now = Utc::now();

        let result = check_removal(&totp, &set, Some(now - Duration::minutes(10)), 24, now);
        assert_eq!(
            result,
            Err(RemovalBlock::CoolingPeriod {
                hours_remaining: 24
            })
        );
    }

    #[test]
    fn cooling_only_applies_to_last_factor() {
        let sms = verified(FactorType::SmsCode);
        let other = verified(FactorType::SmsCode);
        let set = vec![sms.clone(), other];
        let now = Utc::now();

        // Recent change, but a verified factor remains after the disable.
        assert!(check_removal(&sms, &set, Some(now - Duration::hours(1)), 24, now).is_ok());
    }

    #[test]
    fn missing_change_timestamp_allows_removal() {
        let totp = verified(FactorType::AppCode);
        let set = vec![totp.clone()];

        let decision = check_removal(&totp, &set, None, 24, Utc::now()).unwrap();
        assert!(decision.last_verified_factor);
    }
}
