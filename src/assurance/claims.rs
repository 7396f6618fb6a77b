//! Signed session-claims parsing, the single decode implementation.
//!
//! Every guarded action re-derives the assurance level from the verified
//! token received on the request. The explicit `aal` claim is preferred; the
//! `amr` method list is the fallback. Any token that cannot be verified or
//! whose claims cannot be understood is treated as insufficient; decoding
//! never default-allows.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AssuranceLevel;
use super::factor::FactorType;

/// Authentication methods that can appear in a token's `amr` list.
///
/// The set is closed on purpose: a token carrying an unknown method fails
/// deserialization and the request is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    HardwareKey,
    AppCode,
    SmsCode,
    EmailCode,
    /// One-time possession proof from a recovery link.
    Otp,
}

impl AuthMethod {
    #[must_use]
    pub const fn from_factor(factor_type: FactorType) -> Self {
        match factor_type {
            FactorType::HardwareKey => Self::HardwareKey,
            FactorType::AppCode => Self::AppCode,
            FactorType::SmsCode => Self::SmsCode,
            FactorType::EmailCode => Self::EmailCode,
        }
    }

    /// True for methods that prove possession of an enrolled second factor.
    #[must_use]
    pub const fn is_second_factor(self) -> bool {
        matches!(
            self,
            Self::HardwareKey | Self::AppCode | Self::SmsCode | Self::EmailCode
        )
    }
}

/// One `amr` entry: which method was presented and when (unix seconds).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmrEntry {
    pub method: AuthMethod,
    pub timestamp: i64,
}

/// Claims carried by the platform-issued access token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub aud: String,
    pub exp: i64,
    /// Issue time (unix seconds). Compared against the account's revocation
    /// watermark, so a token without one never decodes.
    pub iat: i64,
    /// Convenience assurance field; may be absent on older tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aal: Option<String>,
    #[serde(default)]
    pub amr: Vec<AmrEntry>,
}

impl AccessClaims {
    /// Issue time as a timestamp. An unrepresentable `iat` maps to the
    /// earliest instant, which every revocation watermark outranks.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Effective assurance level, re-derived on every check.
    ///
    /// Returns `None` when the `aal` claim carries an unknown label; callers
    /// must treat that as insufficient.
    #[must_use]
    pub fn effective_level(&self) -> Option<AssuranceLevel> {
        match self.aal.as_deref() {
            Some("aal2") => Some(AssuranceLevel::Aal2),
            Some("aal1") => Some(AssuranceLevel::Aal1),
            Some(_) => None,
            None => Some(self.derive_level_from_amr()),
        }
    }

    /// AAL2 requires a second-factor method obtained no earlier than the
    /// password method in the same session.
    fn derive_level_from_amr(&self) -> AssuranceLevel {
        let Some(password_at) = self
            .amr
            .iter()
            .filter(|entry| entry.method == AuthMethod::Password)
            .map(|entry| entry.timestamp)
            .max()
        else {
            return AssuranceLevel::Aal1;
        };

        let stepped_up = self
            .amr
            .iter()
            .any(|entry| entry.method.is_second_factor() && entry.timestamp >= password_at);

        if stepped_up {
            AssuranceLevel::Aal2
        } else {
            AssuranceLevel::Aal1
        }
    }

    /// Recovery sessions carry exactly one method and it is `otp`. They are
    /// routed to credential reset regardless of any claimed AAL.
    #[must_use]
    pub fn is_recovery(&self) -> bool {
        matches!(self.amr.as_slice(), [entry] if entry.method == AuthMethod::Otp)
    }

    #[must_use]
    pub fn methods(&self) -> Vec<AuthMethod> {
        self.amr.iter().map(|entry| entry.method).collect()
    }
}

/// Verify and decode an access token.
///
/// # Errors
/// Returns an error for any signature, expiry, audience, or claim-shape
/// problem; callers map all of these to a fail-closed denial.
pub fn decode_access_token(
    token: &str,
    secret: &SecretString,
    audience: &str,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "aud"]);

    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let data = decode::<AccessClaims>(token, &key, &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const AUDIENCE: &str = "authenticated";

    fn secret() -> SecretString {
        SecretString::from("test-signing-secret")
    }

    fn claims(aal: Option<&str>, amr: Vec<AmrEntry>) -> AccessClaims {
        AccessClaims {
            sub: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            aud: AUDIENCE.to_string(),
            exp: Utc::now().timestamp() + 600,
            iat: Utc::now().timestamp() - 30,
            aal: aal.map(ToString::to_string),
            amr,
        }
    }

    fn sign(claims: &AccessClaims, secret: &SecretString) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn explicit_aal_claim_wins() {
        let session = claims(Some("aal2"), vec![]);
        assert_eq!(session.effective_level(), Some(AssuranceLevel::Aal2));

        let session = claims(Some("aal1"), vec![]);
        assert_eq!(session.effective_level(), Some(AssuranceLevel::Aal1));
    }

    #[test]
    fn unknown_aal_label_fails_closed() {
        let session = claims(Some("aal3"), vec![]);
        assert_eq!(session.effective_level(), None);
    }

    #[test]
    fn amr_fallback_requires_factor_after_password() {
        let now = Utc::now().timestamp();
        let session = claims(
            None,
            vec![
                AmrEntry {
                    method: AuthMethod::Password,
                    timestamp: now - 60,
                },
                AmrEntry {
                    method: AuthMethod::AppCode,
                    timestamp: now,
                },
            ],
        );
        assert_eq!(session.effective_level(), Some(AssuranceLevel::Aal2));

        // Factor presented before the password does not count.
        let session = claims(
            None,
            vec![
                AmrEntry {
                    method: AuthMethod::AppCode,
                    timestamp: now - 120,
                },
                AmrEntry {
                    method: AuthMethod::Password,
                    timestamp: now,
                },
            ],
        );
        assert_eq!(session.effective_level(), Some(AssuranceLevel::Aal1));
    }

    #[test]
    fn password_only_is_aal1() {
        let now = Utc::now().timestamp();
        let session = claims(
            None,
            vec![AmrEntry {
                method: AuthMethod::Password,
                timestamp: now,
            }],
        );
        assert_eq!(session.effective_level(), Some(AssuranceLevel::Aal1));
    }

    #[test]
    fn recovery_session_is_exactly_one_otp() {
        let now = Utc::now().timestamp();
        let session = claims(
            None,
            vec![AmrEntry {
                method: AuthMethod::Otp,
                timestamp: now,
            }],
        );
        assert!(session.is_recovery());

        // otp alongside a password login is not a recovery session.
        let session = claims(
            None,
            vec![
                AmrEntry {
                    method: AuthMethod::Password,
                    timestamp: now,
                },
                AmrEntry {
                    method: AuthMethod::Otp,
                    timestamp: now,
                },
            ],
        );
        assert!(!session.is_recovery());
    }

    #[test]
    fn decode_round_trip() {
        let secret = secret();
        let session = claims(Some("aal2"), vec![]);
        let token = sign(&session, &secret);

        let decoded = decode_access_token(&token, &secret, AUDIENCE).unwrap();
        assert_eq!(decoded.sub, session.sub);
        assert_eq!(decoded.aal.as_deref(), Some("aal2"));
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let session = claims(Some("aal2"), vec![]);
        let token = sign(&session, &secret());

        let other = SecretString::from("a-different-secret");
        assert!(decode_access_token(&token, &other, AUDIENCE).is_err());
    }

    #[test]
    fn decode_rejects_wrong_audience() {
        let secret = secret();
        let session = claims(Some("aal2"), vec![]);
        let token = sign(&session, &secret);

        assert!(decode_access_token(&token, &secret, "service-role").is_err());
    }

    #[test]
    fn decode_rejects_expired_token() {
        let secret = secret();
        let mut session = claims(Some("aal2"), vec![]);
        session.exp = Utc::now().timestamp() - 600;
        let token = sign(&session, &secret);

        assert!(decode_access_token(&token, &secret, AUDIENCE).is_err());
    }

    #[test]
    fn decode_rejects_token_without_issue_time() {
        let secret = secret();
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "sub": Uuid::new_v4(),
            "email": "user@example.com",
            "aud": AUDIENCE,
            "exp": now + 600,
            "aal": "aal2",
        });
        let token = encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        )
        .unwrap();

        assert!(decode_access_token(&token, &secret, AUDIENCE).is_err());
    }

    #[test]
    fn unknown_amr_method_fails_decode() {
        let secret = secret();
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "sub": Uuid::new_v4(),
            "email": "user@example.com",
            "aud": AUDIENCE,
            "exp": now + 600,
            "iat": now - 30,
            "amr": [{"method": "carrier_pigeon", "timestamp": now}],
        });
        let token = encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        )
        .unwrap();

        assert!(decode_access_token(&token, &secret, AUDIENCE).is_err());
    }
}
