//! Tracking-ledger attachment repository.
//!
//! The `attachment` table is the dedup ledger: one row per source uid,
//! enforced by a unique constraint. Insertion uses
//! `ON CONFLICT DO NOTHING` plus a follow-up lookup so that concurrent
//! runs agree on a single row.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use consentry_core::{
    Error, ErrorKind, NewPage, Page, ProcessingError, Result, TrackedAttachment,
};

/// PostgreSQL repository for tracked attachments.
pub struct PgAttachmentRepository {
    pool: Pool<Postgres>,
}

impl PgAttachmentRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_attachment_row(row: sqlx::postgres::PgRow) -> TrackedAttachment {
        TrackedAttachment {
            id: row.get("id"),
            source_uid: row.get("source_uid"),
            bucket: row.get("bucket"),
            key: row.get("key"),
            patient_uid: row.get("patient_uid"),
            referral_uid: row.get("referral_uid"),
            ticket_id: row.get("ticket_id"),
            created_at: row.get("created_at"),
        }
    }

    fn parse_page_row(row: sqlx::postgres::PgRow) -> Page {
        Page {
            id: row.get("id"),
            attachment_id: row.get("attachment_id"),
            page_number: row.get("page_number"),
            path: row.get("path"),
            blank: row.get("blank"),
            created_at: row.get("created_at"),
        }
    }

    fn parse_error_row(row: sqlx::postgres::PgRow) -> Result<ProcessingError> {
        let kind_str: String = row.get("kind");
        let kind = kind_str
            .parse::<ErrorKind>()
            .map_err(Error::Internal)?;
        Ok(ProcessingError {
            id: row.get("id"),
            attachment_id: row.get("attachment_id"),
            kind,
            ticket_id: row.get("ticket_id"),
            created_at: row.get("created_at"),
        })
    }

    /// Insert a row for the source uid unless one already exists.
    ///
    /// Returns the tracked row and whether this call created it. The
    /// insert races safely: losers of the conflict fall through to the
    /// lookup and observe the winner's row.
    pub async fn insert_if_absent(
        &self,
        source_uid: Uuid,
        bucket: &str,
        key: &str,
    ) -> Result<(TrackedAttachment, bool)> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO consentry.attachment (id, source_uid, bucket, key, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (source_uid) DO NOTHING
             RETURNING id, source_uid, bucket, key, patient_uid, referral_uid,
                       ticket_id, created_at",
        )
        .bind(id)
        .bind(source_uid)
        .bind(bucket)
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = inserted {
            return Ok((Self::parse_attachment_row(row), true));
        }

        let existing = self.get_by_source_uid(source_uid).await?.ok_or_else(|| {
            Error::Internal(format!(
                "attachment for source uid {} vanished between insert and lookup",
                source_uid
            ))
        })?;
        Ok((existing, false))
    }

    /// Look up a tracked attachment by its source uid.
    pub async fn get_by_source_uid(&self, source_uid: Uuid) -> Result<Option<TrackedAttachment>> {
        let row = sqlx::query(
            "SELECT id, source_uid, bucket, key, patient_uid, referral_uid,
                    ticket_id, created_at
             FROM consentry.attachment
             WHERE source_uid = $1",
        )
        .bind(source_uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_attachment_row))
    }

    /// Look up a tracked attachment by its ledger id.
    pub async fn get(&self, id: Uuid) -> Result<TrackedAttachment> {
        let row = sqlx::query(
            "SELECT id, source_uid, bucket, key, patient_uid, referral_uid,
                    ticket_id, created_at
             FROM consentry.attachment
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_attachment_row)
            .ok_or(Error::AttachmentNotFound(id))
    }

    /// Attachments associated with a ticket, oldest first.
    ///
    /// The FK points from attachment to ticket; this is the explicit
    /// reverse lookup used when an external create is retried.
    pub async fn by_ticket(&self, ticket_id: Uuid) -> Result<Vec<TrackedAttachment>> {
        let rows = sqlx::query(
            "SELECT id, source_uid, bucket, key, patient_uid, referral_uid,
                    ticket_id, created_at
             FROM consentry.attachment
             WHERE ticket_id = $1
             ORDER BY created_at",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_attachment_row).collect())
    }

    /// All source uids already present in the ledger.
    ///
    /// Used to exclude tracked rows from candidate discovery.
    pub async fn tracked_source_uids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT source_uid FROM consentry.attachment")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|r| r.get("source_uid")).collect())
    }

    /// Persist the processing outcome of one attachment atomically.
    ///
    /// Identifiers, pages, and errors land in a single transaction so a
    /// crash mid-write never leaves a half-recorded attachment.
    pub async fn record_outcome(
        &self,
        attachment_id: Uuid,
        identifiers: Option<(Uuid, Uuid)>,
        pages: &[NewPage],
        errors: &[ErrorKind],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        if let Some((patient_uid, referral_uid)) = identifiers {
            Self::set_identifiers_tx(&mut tx, attachment_id, patient_uid, referral_uid).await?;
        }
        Self::add_pages_tx(&mut tx, attachment_id, pages).await?;
        Self::add_errors_tx(&mut tx, attachment_id, errors).await?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(
            subsystem = "db",
            component = "attachments",
            op = "record_outcome",
            attachment_id = %attachment_id,
            page_count = pages.len(),
            error_count = errors.len(),
            "Recorded attachment processing outcome"
        );
        Ok(())
    }

    /// Set the patient/referral identifiers parsed from the object key.
    pub async fn set_identifiers_tx(
        tx: &mut Transaction<'_, Postgres>,
        attachment_id: Uuid,
        patient_uid: Uuid,
        referral_uid: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE consentry.attachment
             SET patient_uid = $2, referral_uid = $3
             WHERE id = $1",
        )
        .bind(attachment_id)
        .bind(patient_uid)
        .bind(referral_uid)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Insert exported pages for an attachment.
    pub async fn add_pages_tx(
        tx: &mut Transaction<'_, Postgres>,
        attachment_id: Uuid,
        pages: &[NewPage],
    ) -> Result<()> {
        let now = Utc::now();
        for page in pages {
            sqlx::query(
                "INSERT INTO consentry.page (id, attachment_id, page_number, path, blank, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::now_v7())
            .bind(attachment_id)
            .bind(page.page_number)
            .bind(&page.path)
            .bind(page.blank)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Insert processing errors for an attachment.
    pub async fn add_errors_tx(
        tx: &mut Transaction<'_, Postgres>,
        attachment_id: Uuid,
        errors: &[ErrorKind],
    ) -> Result<()> {
        let now = Utc::now();
        for kind in errors {
            sqlx::query(
                "INSERT INTO consentry.error (id, attachment_id, kind, created_at)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::now_v7())
            .bind(attachment_id)
            .bind(kind.to_string())
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Insert a single processing error outside a transaction.
    ///
    /// Used by discovery backfill where only one error row exists.
    pub async fn add_error(
        &self,
        attachment_id: Uuid,
        kind: ErrorKind,
        ticket_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO consentry.error (id, attachment_id, kind, ticket_id, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(attachment_id)
        .bind(kind.to_string())
        .bind(ticket_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Associate an attachment with a ticket.
    pub async fn set_ticket(&self, attachment_id: Uuid, ticket_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE consentry.attachment SET ticket_id = $2 WHERE id = $1",
        )
        .bind(attachment_id)
        .bind(ticket_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::AttachmentNotFound(attachment_id));
        }
        Ok(())
    }

    /// Exported pages for an attachment, ordered by page number.
    pub async fn pages_for(&self, attachment_id: Uuid) -> Result<Vec<Page>> {
        let rows = sqlx::query(
            "SELECT id, attachment_id, page_number, path, blank, created_at
             FROM consentry.page
             WHERE attachment_id = $1
             ORDER BY page_number",
        )
        .bind(attachment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_page_row).collect())
    }

    /// Processing errors recorded for an attachment, oldest first.
    pub async fn errors_for(&self, attachment_id: Uuid) -> Result<Vec<ProcessingError>> {
        let rows = sqlx::query(
            "SELECT id, attachment_id, kind, ticket_id, created_at
             FROM consentry.error
             WHERE attachment_id = $1
             ORDER BY created_at",
        )
        .bind(attachment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_error_row).collect()
    }

    /// Link every error row of an attachment to its fault ticket.
    pub async fn link_errors_to_ticket(&self, attachment_id: Uuid, ticket_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE consentry.error SET ticket_id = $2 WHERE attachment_id = $1",
        )
        .bind(attachment_id)
        .bind(ticket_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
