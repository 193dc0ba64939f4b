//! Ticket repository for the tracking ledger.
//!
//! Local ticket rows mirror external issues. A row is inserted before the
//! external create call; `external_key` is backfilled once the tracker
//! accepts the issue. Rows stuck in `create_failed` are retried at the
//! start of the next batch run.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use consentry_core::{
    Error, Result, Ticket, TicketKind, TICKET_STATUS_CREATE_FAILED, TICKET_STATUS_NEW,
};

/// PostgreSQL repository for tickets.
pub struct PgTicketRepository {
    pool: Pool<Postgres>,
}

impl PgTicketRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_ticket_row(row: sqlx::postgres::PgRow) -> Result<Ticket> {
        let kind_str: String = row.get("kind");
        let kind = kind_str.parse::<TicketKind>().map_err(Error::Internal)?;
        Ok(Ticket {
            id: row.get("id"),
            external_key: row.get("external_key"),
            kind,
            status: row.get("status"),
            assignee: row.get("assignee"),
            synced_at: row.get("synced_at"),
            created_at: row.get("created_at"),
        })
    }

    /// Insert a new local ticket row with no external key yet.
    pub async fn insert(&self, kind: TicketKind) -> Result<Ticket> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO consentry.ticket (id, kind, status, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(kind.to_string())
        .bind(TICKET_STATUS_NEW)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Ticket {
            id,
            external_key: None,
            kind,
            status: TICKET_STATUS_NEW.to_string(),
            assignee: None,
            synced_at: None,
            created_at: now,
        })
    }

    /// Insert a ticket row that already carries an external key.
    ///
    /// Used when the reconciler discovers an externally created issue.
    pub async fn insert_with_external_key(
        &self,
        kind: TicketKind,
        external_key: &str,
        status: &str,
        assignee: Option<&str>,
    ) -> Result<Ticket> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO consentry.ticket
                 (id, external_key, kind, status, assignee, synced_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(external_key)
        .bind(kind.to_string())
        .bind(status)
        .bind(assignee)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Ticket {
            id,
            external_key: Some(external_key.to_string()),
            kind,
            status: status.to_string(),
            assignee: assignee.map(str::to_string),
            synced_at: Some(now),
            created_at: now,
        })
    }

    /// Backfill the external key after a successful tracker create.
    pub async fn set_external_key(&self, id: Uuid, external_key: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE consentry.ticket
             SET external_key = $2, status = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(external_key)
        .bind(TICKET_STATUS_NEW)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TicketNotFound(id));
        }
        Ok(())
    }

    /// Mark a ticket whose external create call failed.
    pub async fn mark_create_failed(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE consentry.ticket SET status = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(TICKET_STATUS_CREATE_FAILED)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TicketNotFound(id));
        }
        Ok(())
    }

    /// All tickets awaiting a retried external create, oldest first.
    pub async fn create_failed(&self) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            "SELECT id, external_key, kind, status, assignee, synced_at, created_at
             FROM consentry.ticket
             WHERE status = $1
             ORDER BY created_at",
        )
        .bind(TICKET_STATUS_CREATE_FAILED)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_ticket_row).collect()
    }

    /// Overwrite status and assignee from the external issue.
    pub async fn update_sync(
        &self,
        id: Uuid,
        status: &str,
        assignee: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE consentry.ticket
             SET status = $2, assignee = $3, synced_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(assignee)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TicketNotFound(id));
        }
        Ok(())
    }

    /// Every ticket with a known external key, oldest first.
    pub async fn with_external_key(&self) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            "SELECT id, external_key, kind, status, assignee, synced_at, created_at
             FROM consentry.ticket
             WHERE external_key IS NOT NULL
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_ticket_row).collect()
    }

    /// The set of external keys already mirrored locally.
    ///
    /// Discovery skips issues whose key appears here.
    pub async fn known_external_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT external_key FROM consentry.ticket WHERE external_key IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|r| r.get("external_key")).collect())
    }

    /// Look up a ticket by id.
    pub async fn get(&self, id: Uuid) -> Result<Ticket> {
        let row = sqlx::query(
            "SELECT id, external_key, kind, status, assignee, synced_at, created_at
             FROM consentry.ticket
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_ticket_row(row),
            None => Err(Error::TicketNotFound(id)),
        }
    }
}
