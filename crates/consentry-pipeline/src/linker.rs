//! Patient linkage against the source store.
//!
//! A consent form belongs to a patient; the review table shows that
//! patient's name and date of birth. A missing patient or person row, or
//! a null identity column, means the form cannot be safely attributed
//! and must route to a fault ticket instead of the review table.

use tracing::debug;
use uuid::Uuid;

use consentry_core::{PatientDetails, Result};
use consentry_db::{PatientIdentity, PgSourceRepository};

/// Resolves patient uids to display identities.
pub struct PatientLinker {
    source: PgSourceRepository,
}

impl PatientLinker {
    pub fn new(source: PgSourceRepository) -> Self {
        Self { source }
    }

    /// Resolve a patient uid to a complete identity.
    ///
    /// Returns `None` when the patient or person row is missing or any
    /// identity column is null. The caller records that as a linkage
    /// error; it is never fatal to the run.
    pub async fn resolve(&self, patient_uid: Uuid) -> Result<Option<PatientDetails>> {
        let identity = self.source.patient_identity(patient_uid).await?;
        let details = identity.and_then(format_identity);
        debug!(
            subsystem = "pipeline",
            component = "linker",
            op = "resolve",
            patient_uid = %patient_uid,
            linked = details.is_some(),
            "Resolved patient identity"
        );
        Ok(details)
    }
}

/// Format raw identity columns for the review table.
///
/// Name is `"{first} {last}"` upper-cased; date of birth is ISO
/// `YYYY-MM-DD`. Any null column yields `None`.
fn format_identity(identity: PatientIdentity) -> Option<PatientDetails> {
    let first = identity.first_name?;
    let family = identity.family_name?;
    let dob = identity.date_of_birth?;
    Some(PatientDetails {
        name: format!("{} {}", first, family).to_uppercase(),
        date_of_birth: dob.format("%Y-%m-%d").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn identity(
        first: Option<&str>,
        family: Option<&str>,
        dob: Option<NaiveDate>,
    ) -> PatientIdentity {
        PatientIdentity {
            first_name: first.map(str::to_string),
            family_name: family.map(str::to_string),
            date_of_birth: dob,
        }
    }

    #[test]
    fn complete_identity_formats_name_and_dob() {
        let details = format_identity(identity(
            Some("Ada"),
            Some("Lovelace"),
            NaiveDate::from_ymd_opt(1815, 12, 10),
        ))
        .unwrap();
        assert_eq!(details.name, "ADA LOVELACE");
        assert_eq!(details.date_of_birth, "1815-12-10");
    }

    #[test]
    fn missing_name_column_is_unlinkable() {
        let dob = NaiveDate::from_ymd_opt(1990, 1, 2);
        assert!(format_identity(identity(None, Some("Lovelace"), dob)).is_none());
        assert!(format_identity(identity(Some("Ada"), None, dob)).is_none());
    }

    #[test]
    fn missing_dob_is_unlinkable() {
        assert!(format_identity(identity(Some("Ada"), Some("Lovelace"), None)).is_none());
    }

    #[test]
    fn dob_pads_single_digit_fields() {
        let details = format_identity(identity(
            Some("Grace"),
            Some("Hopper"),
            NaiveDate::from_ymd_opt(1906, 12, 9),
        ))
        .unwrap();
        assert_eq!(details.date_of_birth, "1906-12-09");
    }
}
