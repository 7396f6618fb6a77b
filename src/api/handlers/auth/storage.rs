//! Storage seam for the `account_mfa` assurance projection.
//!
//! The row is the only cross-request shared mutable state this service
//! owns. All writes are single-statement conditional updates so the
//! datastore's own concurrency control is the only locking involved; the
//! cooling-period rule is re-checked inside the guarded disable statement
//! at commit time. Handlers depend on [`MfaStore`]; [`PgMfaStore`] is the
//! Postgres implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Assurance projection of an account.
#[derive(Clone, Debug)]
pub struct AccountMfa {
    pub factor_count: i32,
    pub last_mfa_change: Option<DateTime<Utc>>,
    /// Local revocation watermark: tokens issued before this instant are
    /// refused even though their signature and expiry still check out.
    pub sessions_revoked_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisableOutcome {
    Committed { remaining_factors: i32 },
    /// The guarded update matched no row: the cooling period was still
    /// running at commit time (a concurrent change moved `last_mfa_change`).
    CoolingBlocked,
}

/// Durable MFA bookkeeping for an account.
#[async_trait]
pub trait MfaStore: Send + Sync {
    async fn load(&self, account_id: Uuid) -> Result<Option<AccountMfa>>;

    /// Bump the verified-factor count after an enrollment completes. Returns
    /// the new count. `last_mfa_change` moves on every count change.
    async fn record_factor_enrolled(&self, account_id: Uuid) -> Result<i32>;

    /// Commit point for a factor disable; re-applies the cooling rule
    /// atomically against the stored state.
    async fn record_factor_disabled(
        &self,
        account_id: Uuid,
        cooling_period_hours: i64,
    ) -> Result<DisableOutcome>;

    /// Move the revocation watermark to now. Called after the provider has
    /// revoked its sessions so locally-verified tokens die with them.
    async fn record_sessions_revoked(&self, account_id: Uuid) -> Result<()>;

    async fn sessions_revoked_at(&self, account_id: Uuid) -> Result<Option<DateTime<Utc>>>;
}

pub struct PgMfaStore {
    pool: PgPool,
}

impl PgMfaStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MfaStore for PgMfaStore {
    async fn load(&self, account_id: Uuid) -> Result<Option<AccountMfa>> {
        let query = "SELECT factor_count, last_mfa_change, sessions_revoked_at \
                     FROM account_mfa WHERE account_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account mfa state")?;

        Ok(row.map(|row| AccountMfa {
            factor_count: row.get("factor_count"),
            last_mfa_change: row.get("last_mfa_change"),
            sessions_revoked_at: row.get("sessions_revoked_at"),
        }))
    }

    async fn record_factor_enrolled(&self, account_id: Uuid) -> Result<i32> {
        let query = r"
            INSERT INTO account_mfa (account_id, factor_count, last_mfa_change)
            VALUES ($1, 1, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET factor_count = account_mfa.factor_count + 1,
                last_mfa_change = NOW()
            RETURNING factor_count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record factor enrollment")?;

        Ok(row.get("factor_count"))
    }

    /// The WHERE clause re-applies the cooling rule atomically: the
    /// decrement only lands when more than one factor remains or the cooling
    /// period has elapsed. An account without a row (never enrolled through
    /// this service) gets a zeroed row, matching the provider-side delete
    /// that follows.
    async fn record_factor_disabled(
        &self,
        account_id: Uuid,
        cooling_period_hours: i64,
    ) -> Result<DisableOutcome> {
        let query = r"
            INSERT INTO account_mfa (account_id, factor_count, last_mfa_change)
            VALUES ($1, 0, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET factor_count = GREATEST(account_mfa.factor_count - 1, 0),
                last_mfa_change = NOW()
            WHERE account_mfa.factor_count > 1
               OR account_mfa.last_mfa_change IS NULL
               OR account_mfa.last_mfa_change <= NOW() - ($2 * INTERVAL '1 hour')
            RETURNING factor_count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(cooling_period_hours)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to commit factor disable")?;

        Ok(match row {
            Some(row) => DisableOutcome::Committed {
                remaining_factors: row.get("factor_count"),
            },
            None => DisableOutcome::CoolingBlocked,
        })
    }

    async fn record_sessions_revoked(&self, account_id: Uuid) -> Result<()> {
        let query = r"
            INSERT INTO account_mfa (account_id, sessions_revoked_at)
            VALUES ($1, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET sessions_revoked_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to move the session revocation watermark")?;

        Ok(())
    }

    async fn sessions_revoked_at(&self, account_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let query = "SELECT sessions_revoked_at FROM account_mfa WHERE account_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load the session revocation watermark")?;

        Ok(row.and_then(|row| row.get("sessions_revoked_at")))
    }
}
