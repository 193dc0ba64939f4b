//! Administrative build/drop of the tracking schema.
//!
//! The tracking store is rebuilt from code rather than migrations; the
//! schema is small and owned entirely by this pipeline. These operations
//! are invoked from the CLI, never from the steady-state loops.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use consentry_core::{Error, Result};

/// DDL statements for the tracking schema, in dependency order.
const SCHEMA_DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS consentry",
    "CREATE TABLE IF NOT EXISTS consentry.ticket (
         id UUID PRIMARY KEY,
         external_key TEXT,
         kind TEXT NOT NULL,
         status TEXT NOT NULL,
         assignee TEXT,
         synced_at TIMESTAMPTZ,
         created_at TIMESTAMPTZ NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS consentry.attachment (
         id UUID PRIMARY KEY,
         source_uid UUID NOT NULL UNIQUE,
         bucket TEXT NOT NULL,
         key TEXT NOT NULL,
         patient_uid UUID,
         referral_uid UUID,
         ticket_id UUID REFERENCES consentry.ticket(id),
         created_at TIMESTAMPTZ NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS consentry.page (
         id UUID PRIMARY KEY,
         attachment_id UUID NOT NULL REFERENCES consentry.attachment(id),
         page_number INT NOT NULL,
         path TEXT NOT NULL,
         blank BOOLEAN NOT NULL,
         created_at TIMESTAMPTZ NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS consentry.error (
         id UUID PRIMARY KEY,
         attachment_id UUID NOT NULL REFERENCES consentry.attachment(id),
         kind TEXT NOT NULL,
         ticket_id UUID REFERENCES consentry.ticket(id),
         created_at TIMESTAMPTZ NOT NULL
     )",
];

/// Create the tracking schema and its tables if absent.
pub async fn build_schema(pool: &PgPool) -> Result<()> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await.map_err(Error::Database)?;

    for ddl in SCHEMA_DDL {
        sqlx::query(ddl)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
    }

    tx.commit().await.map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "admin",
        op = "build_schema",
        "Tracking schema created"
    );
    Ok(())
}

/// Drop the tracking schema and everything in it.
pub async fn drop_schema(pool: &PgPool) -> Result<()> {
    sqlx::query("DROP SCHEMA IF EXISTS consentry CASCADE")
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "admin",
        op = "drop_schema",
        "Tracking schema dropped"
    );
    Ok(())
}
