//! Read-only queries against the upstream clinical record store.
//!
//! The source store belongs to another system. Nothing here writes to it;
//! discovery and patient linkage are both plain SELECTs against its
//! public tables.

use chrono::NaiveDate;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use consentry_core::{Error, Result, SourceAttachment};

/// Raw patient identity columns from the patient → person join.
///
/// Fields are optional because the upstream schema allows nulls; the
/// linker decides whether a partial identity is usable.
#[derive(Debug, Clone)]
pub struct PatientIdentity {
    pub first_name: Option<String>,
    pub family_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Read-only repository over the source store.
pub struct PgSourceRepository {
    pool: Pool<Postgres>,
}

impl PgSourceRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// New candidate attachments: exact title match, not yet tracked,
    /// oldest uid order, bounded by `limit`.
    pub async fn candidate_attachments(
        &self,
        title: &str,
        excluded: &[Uuid],
        limit: i64,
    ) -> Result<Vec<SourceAttachment>> {
        let rows = sqlx::query(
            "SELECT uid, attachment_title, attachment_url
             FROM attachment
             WHERE attachment_title = $1
               AND uid <> ALL($2)
             ORDER BY uid
             LIMIT $3",
        )
        .bind(title)
        .bind(excluded)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SourceAttachment {
                uid: row.get("uid"),
                title: row.get("attachment_title"),
                url: row.get("attachment_url"),
            })
            .collect())
    }

    /// Resolve a patient uid to identity columns via the person table.
    ///
    /// Returns `None` when either row is missing.
    pub async fn patient_identity(&self, patient_uid: Uuid) -> Result<Option<PatientIdentity>> {
        let row = sqlx::query(
            "SELECT pe.person_first_name, pe.person_family_name, pa.patient_date_of_birth
             FROM patient pa
             JOIN person pe ON pe.uid = pa.person_uid
             WHERE pa.uid = $1",
        )
        .bind(patient_uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| PatientIdentity {
            first_name: row.get("person_first_name"),
            family_name: row.get("person_family_name"),
            date_of_birth: row.get("patient_date_of_birth"),
        }))
    }
}
