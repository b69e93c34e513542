use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{LedgerTransaction, RevocationLedger};
use crate::error::Result;
use crate::models::TokenRevocation;

/// PostgreSQL-backed revocation ledger
#[derive(Clone)]
pub struct PgRevocationLedger {
    pool: PgPool,
}

impl PgRevocationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationLedger for PgRevocationLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn revocations_since(&self, since: DateTime<Utc>) -> Result<Vec<TokenRevocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, jti, user_id, alert_id, revoked_at
            FROM token_revocations
            WHERE revoked_at >= $1
            ORDER BY revoked_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<TokenRevocation> {
                Ok(TokenRevocation {
                    id: row.try_get("id")?,
                    jti: row.try_get("jti")?,
                    user_id: row.try_get("user_id")?,
                    alert_id: row.try_get("alert_id")?,
                    revoked_at: row.try_get("revoked_at")?,
                })
            })
            .collect()
    }
}

struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_user(&mut self, user_id: &str) -> Result<()> {
        // Transaction-scoped: released by COMMIT/ROLLBACK, never by hand.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_processed_alert(&mut self, alert_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO revoked_alerts (alert_id, processed_at)
            VALUES ($1, NOW())
            ON CONFLICT (alert_id) DO NOTHING
            "#,
        )
        .bind(alert_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn active_session_jtis(&mut self, user_id: &str) -> Result<Vec<String>> {
        let jtis = sqlx::query_scalar::<_, String>(
            r#"
            SELECT jwt_id
            FROM sessions
            WHERE user_id = $1 AND revoked = FALSE
            ORDER BY jwt_id
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(jtis)
    }

    async fn record_revocation(&mut self, revocation: &TokenRevocation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO token_revocations (id, jti, user_id, alert_id, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(revocation.id)
        .bind(&revocation.jti)
        .bind(&revocation.user_id)
        .bind(&revocation.alert_id)
        .bind(revocation.revoked_at)
        .execute(&mut *self.tx)
        .await?;

        debug!(
            jti = %revocation.jti,
            alert_id = %revocation.alert_id,
            "Token revocation recorded"
        );
        Ok(())
    }

    async fn revoke_all_sessions(&mut self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_session(&mut self, user_id: &str, jti: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked = TRUE
            WHERE user_id = $1 AND jwt_id = $2 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
