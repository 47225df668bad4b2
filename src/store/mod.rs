//! Postgres access layer.
//!
//! One transaction per request; the authenticated subject is applied as a
//! transaction-local setting before the first domain statement so the
//! database's row-level-security policies can filter rows.

pub mod models;
pub mod schema;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

/// Connect a pool to the given database URL.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to database")
}

/// Open a unit of work scoped to the authenticated subject.
///
/// Executes `set_config('app.current_subject', $subject, true)` before
/// anything else runs on the transaction. The setting is transaction-local:
/// it vanishes on commit or rollback, so a pooled connection can never leak
/// one request's identity into the next. The caller must pass the subject
/// explicitly — there is no ambient/global fallback.
pub async fn begin_scoped(pool: &PgPool, subject: &str) -> Result<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;
    sqlx::query("SELECT set_config('app.current_subject', $1, true)")
        .bind(subject)
        .execute(&mut *tx)
        .await
        .context("failed to set row-security context")?;
    Ok(tx)
}

/// Trivial round-trip used by the readiness probe.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("database ping failed")?;
    Ok(())
}
