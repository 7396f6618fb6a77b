//! Assurance configuration and shared handler state.

use secrecy::SecretString;
use std::sync::Arc;

use crate::assurance::DEFAULT_COOLING_PERIOD_HOURS;
use crate::audit::AuditSink;
use crate::idp::IdentityProvider;

use super::storage::MfaStore;

const DEFAULT_JWT_AUDIENCE: &str = "authenticated";

#[derive(Clone, Debug)]
pub struct AssuranceConfig {
    frontend_base_url: String,
    jwt_secret: SecretString,
    jwt_audience: String,
    cooling_period_hours: i64,
}

impl AssuranceConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, jwt_secret: SecretString) -> Self {
        Self {
            frontend_base_url,
            jwt_secret,
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_string(),
            cooling_period_hours: DEFAULT_COOLING_PERIOD_HOURS,
        }
    }

    #[must_use]
    pub fn with_jwt_audience(mut self, audience: String) -> Self {
        self.jwt_audience = audience;
        self
    }

    #[must_use]
    pub fn with_cooling_period_hours(mut self, hours: i64) -> Self {
        self.cooling_period_hours = hours;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn jwt_audience(&self) -> &str {
        &self.jwt_audience
    }

    #[must_use]
    pub fn cooling_period_hours(&self) -> i64 {
        self.cooling_period_hours
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Sign-in URL for fail-closed redirects. `prompt_mfa` makes the
    /// frontend show the second-factor prompt immediately; `terminate`
    /// tells it to drop the local session first instead of repairing it.
    #[must_use]
    pub fn sign_in_url(&self, prompt_mfa: bool, terminate: bool) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        let mut url = format!("{base}/signin");
        let mut separator = '?';
        if terminate {
            url.push(separator);
            url.push_str("reauth=1");
            separator = '&';
        }
        if prompt_mfa {
            url.push(separator);
            url.push_str("step_up=1");
        }
        url
    }

    /// Credential-reset flow for recovery sessions.
    #[must_use]
    pub fn reset_url(&self) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/reset-password")
    }
}

pub struct AuthState {
    config: AssuranceConfig,
    provider: Arc<dyn IdentityProvider>,
    audit: Arc<dyn AuditSink>,
    store: Arc<dyn MfaStore>,
}

impl AuthState {
    pub fn new(
        config: AssuranceConfig,
        provider: Arc<dyn IdentityProvider>,
        audit: Arc<dyn AuditSink>,
        store: Arc<dyn MfaStore>,
    ) -> Self {
        Self {
            config,
            provider,
            audit,
            store,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AssuranceConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MfaStore> {
        &self.store
    }
}
