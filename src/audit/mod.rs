//! Append-only security event recording.
//!
//! Audit is best-effort observability, not a gate: an append failure is
//! logged at error level and never rolls back or blocks the security
//! operation that produced it. Only the service's privileged database
//! identity may insert rows; accounts read their own rows through RLS
//! (see `db/sql/01_gardi.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{Instrument, error};
use uuid::Uuid;

/// Security-relevant state changes worth an immutable record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MfaDisabled,
    PasswordChanged,
    FactorEnrolled,
    LoginAal2,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MfaDisabled => "mfa_disabled",
            Self::PasswordChanged => "password_changed",
            Self::FactorEnrolled => "factor_enrolled",
            Self::LoginAal2 => "login_aal2",
        }
    }
}

/// One audit record; the payload carries enough structured context to
/// reconstruct what happened (factor, whether it was the last one, resulting
/// count, session assurance at the time).
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub account_id: Uuid,
    pub kind: EventKind,
    pub payload: Value,
    pub client_ip: Option<String>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event.
    ///
    /// # Errors
    /// Returns an error when the append could not be durably applied.
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Postgres-backed recorder writing to the append-only `security_events`
/// table.
pub struct PgAuditRecorder {
    pool: PgPool,
}

impl PgAuditRecorder {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let payload_text =
            serde_json::to_string(&event.payload).context("failed to serialize audit payload")?;

        let query = r"
            INSERT INTO security_events (account_id, event_type, payload, client_ip)
            VALUES ($1, $2, $3::jsonb, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.account_id)
            .bind(event.kind.as_str())
            .bind(payload_text)
            .bind(event.client_ip.as_deref())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert security event")?;

        Ok(())
    }
}

/// Append an event, swallowing failures after logging them.
pub async fn record_best_effort(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(err) = sink.record(&event).await {
        error!(
            account_id = %event.account_id,
            event_type = event.kind.as_str(),
            "Failed to record security event: {err:#}"
        );
    }
}
