//! HTTP client for the platform's identity admin API.
//!
//! One `reqwest` client with a hard per-request timeout; a timeout is a
//! failure of that step, never silently retried. Admin calls authenticate
//! with the service key; the service key and user secrets never appear in
//! logs or spans.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use async_trait::async_trait;

use crate::APP_USER_AGENT;
use crate::assurance::{Factor, FactorStatus, FactorType};

use super::{Enrollment, IdentityProvider, IdpError, ProviderStatus, StepUpGrant};

pub struct HttpIdentityProvider {
    base_url: Url,
    service_key: SecretString,
    client: Client,
}

/// Factor shape on the provider wire; `account_id` is implied by the URL.
#[derive(Debug, Deserialize)]
struct WireFactor {
    id: Uuid,
    factor_type: FactorType,
    status: FactorStatus,
    created_at: DateTime<Utc>,
}

impl WireFactor {
    fn into_factor(self, account_id: Uuid) -> Factor {
        Factor {
            id: self.id,
            account_id,
            factor_type: self.factor_type,
            status: self.status,
            enrolled_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireEnrollment {
    factor: WireFactor,
    provisioning_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireGrant {
    factor: WireFactor,
    access_token: String,
    newly_verified: bool,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error when the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(base_url: &str, service_key: SecretString, timeout_seconds: u64) -> Result<Self> {
        let base_url = normalize_base(base_url)?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build identity provider HTTP client")?;

        Ok(Self {
            base_url,
            service_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdpError> {
        self.base_url
            .join(path)
            .map_err(|err| IdpError::Unavailable(anyhow!("invalid endpoint path {path}: {err}")))
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    let mut parsed = Url::parse(base_url)
        .with_context(|| format!("Invalid identity provider URL: {base_url}"))?;
    // Url::join drops the last path segment without a trailing slash.
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> IdpError {
    IdpError::Unavailable(anyhow::Error::new(err).context(format!("{operation} request failed")))
}

fn unexpected_status(operation: &'static str, status: StatusCode) -> IdpError {
    IdpError::Unavailable(anyhow!("{operation} returned unexpected status {status}"))
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_password(&self, email: &str, password: &SecretString) -> Result<(), IdpError> {
        let url = self.endpoint("token?grant_type=password")?;
        let span = info_span!("idp.request", idp.operation = "verify_password");
        async {
            let response = self
                .client
                .post(url)
                .json(&json!({
                    "email": email,
                    "password": password.expose_secret(),
                }))
                .send()
                .await
                .map_err(|err| transport_error("verify_password", err))?;

            match response.status() {
                status if status.is_success() => {
                    // The grant response carries a throwaway AAL1 session.
                    // Drop the body unread so the caller's existing session
                    // is never replaced or downgraded.
                    Ok(())
                }
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Err(IdpError::InvalidCredentials)
                }
                status => Err(unexpected_status("verify_password", status)),
            }
        }
        .instrument(span)
        .await
    }

    async fn list_factors(&self, account_id: Uuid) -> Result<Vec<Factor>, IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}/factors"))?;
        let span = info_span!("idp.request", idp.operation = "list_factors");
        async {
            let response = self
                .client
                .get(url)
                .bearer_auth(self.service_key.expose_secret())
                .send()
                .await
                .map_err(|err| transport_error("list_factors", err))?;

            if !response.status().is_success() {
                return Err(unexpected_status("list_factors", response.status()));
            }

            let factors: Vec<WireFactor> = response
                .json()
                .await
                .map_err(|err| transport_error("list_factors", err))?;

            Ok(factors
                .into_iter()
                .map(|factor| factor.into_factor(account_id))
                .collect())
        }
        .instrument(span)
        .await
    }

    async fn begin_enrollment(
        &self,
        account_id: Uuid,
        factor_type: FactorType,
    ) -> Result<Enrollment, IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}/factors"))?;
        let span = info_span!("idp.request", idp.operation = "begin_enrollment");
        async {
            let response = self
                .client
                .post(url)
                .bearer_auth(self.service_key.expose_secret())
                .json(&json!({ "factor_type": factor_type }))
                .send()
                .await
                .map_err(|err| transport_error("begin_enrollment", err))?;

            if !response.status().is_success() {
                return Err(unexpected_status("begin_enrollment", response.status()));
            }

            let enrollment: WireEnrollment = response
                .json()
                .await
                .map_err(|err| transport_error("begin_enrollment", err))?;

            Ok(Enrollment {
                factor: enrollment.factor.into_factor(account_id),
                provisioning_uri: enrollment.provisioning_uri,
            })
        }
        .instrument(span)
        .await
    }

    async fn verify_factor(
        &self,
        account_id: Uuid,
        factor_id: Uuid,
        code: &str,
    ) -> Result<StepUpGrant, IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}/factors/{factor_id}/verify"))?;
        let span = info_span!("idp.request", idp.operation = "verify_factor");
        async {
            let response = self
                .client
                .post(url)
                .bearer_auth(self.service_key.expose_secret())
                .json(&json!({ "code": code }))
                .send()
                .await
                .map_err(|err| transport_error("verify_factor", err))?;

            match response.status() {
                status if status.is_success() => {
                    let grant: WireGrant = response
                        .json()
                        .await
                        .map_err(|err| transport_error("verify_factor", err))?;
                    Ok(StepUpGrant {
                        factor: grant.factor.into_factor(account_id),
                        access_token: grant.access_token,
                        newly_verified: grant.newly_verified,
                    })
                }
                StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::UNPROCESSABLE_ENTITY => Err(IdpError::InvalidCode),
                StatusCode::NOT_FOUND => Err(IdpError::FactorNotFound),
                status => Err(unexpected_status("verify_factor", status)),
            }
        }
        .instrument(span)
        .await
    }

    async fn delete_factor(&self, account_id: Uuid, factor_id: Uuid) -> Result<(), IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}/factors/{factor_id}"))?;
        let span = info_span!("idp.request", idp.operation = "delete_factor");
        async {
            let response = self
                .client
                .delete(url)
                .bearer_auth(self.service_key.expose_secret())
                .send()
                .await
                .map_err(|err| transport_error("delete_factor", err))?;

            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::NOT_FOUND => Err(IdpError::FactorNotFound),
                status => Err(unexpected_status("delete_factor", status)),
            }
        }
        .instrument(span)
        .await
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}"))?;
        let span = info_span!("idp.request", idp.operation = "update_password");
        async {
            let response = self
                .client
                .put(url)
                .bearer_auth(self.service_key.expose_secret())
                .json(&json!({ "password": new_password.expose_secret() }))
                .send()
                .await
                .map_err(|err| transport_error("update_password", err))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(unexpected_status("update_password", response.status()))
            }
        }
        .instrument(span)
        .await
    }

    async fn revoke_all_sessions(&self, account_id: Uuid) -> Result<(), IdpError> {
        let url = self.endpoint(&format!("admin/users/{account_id}/logout"))?;
        let span = info_span!("idp.request", idp.operation = "revoke_all_sessions");
        async {
            let response = self
                .client
                .post(url)
                .bearer_auth(self.service_key.expose_secret())
                .send()
                .await
                .map_err(|err| transport_error("revoke_all_sessions", err))?;

            // Revoking an account with no live sessions is a no-op success.
            if response.status().is_success() {
                Ok(())
            } else {
                Err(unexpected_status("revoke_all_sessions", response.status()))
            }
        }
        .instrument(span)
        .await
    }

    async fn dependency_status(&self) -> ProviderStatus {
        let Ok(url) = self.endpoint("health") else {
            return ProviderStatus::Error;
        };
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => ProviderStatus::Ok,
            _ => ProviderStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = normalize_base("https://idp.example.com/auth/v1").unwrap();
        assert_eq!(base.path(), "/auth/v1/");
        assert_eq!(
            base.join("admin/users/abc/factors").unwrap().path(),
            "/auth/v1/admin/users/abc/factors"
        );
    }

    #[test]
    fn base_url_with_slash_is_unchanged() {
        let base = normalize_base("https://idp.example.com/auth/v1/").unwrap();
        assert_eq!(base.path(), "/auth/v1/");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(normalize_base("not a url").is_err());
    }

    #[test]
    fn wire_factor_maps_onto_account() {
        let account_id = Uuid::new_v4();
        let wire: WireFactor = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "factor_type": "app_code",
            "status": "verified",
            "created_at": "2026-08-01T00:00:00Z",
        }))
        .unwrap();

        let factor = wire.into_factor(account_id);
        assert_eq!(factor.account_id, account_id);
        assert_eq!(factor.factor_type, FactorType::AppCode);
        assert!(factor.is_verified());
    }
}
