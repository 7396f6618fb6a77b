//! Route guard for protected page loads.
//!
//! Flow Overview:
//! 1) No session → redirect to sign-in.
//! 2) Recovery session → redirect to the credential-reset flow, regardless
//!    of any claimed assurance level.
//! 3) Derive the effective level from the verified claims.
//! 4) Account holds a verified factor but the session is below AAL2 →
//!    terminate the session and redirect to sign-in with the second-factor
//!    prompt showing immediately. No partial access.
//! 5) Otherwise allow.
//!
//! Every denying branch fails closed with a redirect, including the branch
//! where the assurance level is simply undecodable.

use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::assurance::{AssuranceLevel, decode_access_token};

use super::handlers::auth::principal::Principal;
use super::handlers::auth::state::AssuranceConfig;

/// What the presented token turned out to be.
pub enum SessionClass {
    Missing,
    /// Undecodable token or claims; never treated as a session.
    Invalid,
    Recovery,
    Active(Principal),
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow(GuardedPrincipal),
    SignIn {
        prompt_mfa: bool,
        terminate_session: bool,
    },
    RecoveryReset,
}

/// Principal fields the guarded page needs; keeps `GuardDecision` testable
/// with plain equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardedPrincipal {
    pub account_id: uuid::Uuid,
    pub email: String,
    pub level: AssuranceLevel,
}

pub fn classify_session(token: Option<&str>, config: &AssuranceConfig) -> SessionClass {
    let Some(token) = token else {
        return SessionClass::Missing;
    };
    let claims = match decode_access_token(token, config.jwt_secret(), config.jwt_audience()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Route guard rejected token: {err}");
            return SessionClass::Invalid;
        }
    };
    // Recovery is checked before the level so a recovery token with a
    // bogus assurance claim still routes to reset.
    if claims.is_recovery() {
        return SessionClass::Recovery;
    }
    match Principal::from_claims(&claims) {
        Ok(principal) => SessionClass::Active(principal),
        Err(_) => SessionClass::Invalid,
    }
}

pub fn evaluate(class: &SessionClass, has_verified_factor: bool) -> GuardDecision {
    match class {
        SessionClass::Missing => GuardDecision::SignIn {
            prompt_mfa: false,
            terminate_session: false,
        },
        SessionClass::Invalid => GuardDecision::SignIn {
            prompt_mfa: false,
            terminate_session: true,
        },
        SessionClass::Recovery => GuardDecision::RecoveryReset,
        SessionClass::Active(principal) => {
            if has_verified_factor && !principal.level.meets(AssuranceLevel::Aal2) {
                GuardDecision::SignIn {
                    prompt_mfa: true,
                    terminate_session: true,
                }
            } else {
                GuardDecision::Allow(GuardedPrincipal {
                    account_id: principal.account_id,
                    email: principal.email.clone(),
                    level: principal.level,
                })
            }
        }
    }
}

/// 303 redirect for a denying decision; `None` when access is granted.
pub fn deny_response(decision: &GuardDecision, config: &AssuranceConfig) -> Option<Response> {
    let location = match decision {
        GuardDecision::Allow(_) => return None,
        GuardDecision::SignIn {
            prompt_mfa,
            terminate_session,
        } => config.sign_in_url(*prompt_mfa, *terminate_session),
        GuardDecision::RecoveryReset => config.reset_url(),
    };
    Some((StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::{ExposeSecret, SecretString};
    use uuid::Uuid;

    use crate::assurance::{AccessClaims, AmrEntry, AuthMethod};

    fn config() -> AssuranceConfig {
        AssuranceConfig::new(
            "https://app.example.com".to_string(),
            SecretString::from("guard-test-secret"),
        )
    }

    fn token(aal: Option<&str>, amr: Vec<AmrEntry>, config: &AssuranceConfig) -> String {
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            aud: config.jwt_audience().to_string(),
            exp: Utc::now().timestamp() + 600,
            iat: Utc::now().timestamp() - 30,
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

    #[test]
    fn missing_session_redirects_to_sign_in() {
        let class = classify_session(None, &config());
        assert_eq!(
            evaluate(&class, false),
            GuardDecision::SignIn {
                prompt_mfa: false,
                terminate_session: false
            }
        );
    }

    #[test]
    fn undecodable_token_fails_closed() {
        let class = classify_session(Some("garbage"), &config());
        assert_eq!(
            evaluate(&class, true),
            GuardDecision::SignIn {
                prompt_mfa: false,
                terminate_session: true
            }
        );
    }

    #[test]
    fn recovery_routes_to_reset_regardless_of_claimed_level() {
        let config = config();
        let amr = vec![AmrEntry {
            method: AuthMethod::Otp,
            timestamp: Utc::now().timestamp(),
        }];
        let token = token(Some("aal2"), amr, &config);
        let class = classify_session(Some(&token), &config);
        assert_eq!(evaluate(&class, true), GuardDecision::RecoveryReset);
    }

    #[test]
    fn aal1_with_verified_factor_forces_step_up_sign_in() {
        let config = config();
        let token = token(Some("aal1"), vec![], &config);
        let class = classify_session(Some(&token), &config);
        assert_eq!(
            evaluate(&class, true),
            GuardDecision::SignIn {
                prompt_mfa: true,
                terminate_session: true
            }
        );
    }

    #[test]
    fn aal1_without_factors_is_allowed() {
        let config = config();
        let token = token(Some("aal1"), vec![], &config);
        let class = classify_session(Some(&token), &config);
        assert!(matches!(evaluate(&class, false), GuardDecision::Allow(_)));
    }

    #[test]
    fn aal2_with_factors_is_allowed() {
        let config = config();
        let token = token(Some("aal2"), vec![], &config);
        let class = classify_session(Some(&token), &config);
        match evaluate(&class, true) {
            GuardDecision::Allow(principal) => {
                assert_eq!(principal.level, AssuranceLevel::Aal2);
            }
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[test]
    fn unknown_assurance_label_fails_closed() {
        let config = config();
        let token = token(Some("aal9"), vec![], &config);
        let class = classify_session(Some(&token), &config);
        assert_eq!(
            evaluate(&class, false),
            GuardDecision::SignIn {
                prompt_mfa: false,
                terminate_session: true
            }
        );
    }

    #[test]
    fn deny_responses_are_303_redirects() {
        let config = config();
        let decision = GuardDecision::SignIn {
            prompt_mfa: true,
            terminate_session: true,
        };
        let response = deny_response(&decision, &config).unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://app.example.com/signin?reauth=1&step_up=1"
        );

        let response = deny_response(&GuardDecision::RecoveryReset, &config).unwrap();
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://app.example.com/reset-password"
        );
    }
}
