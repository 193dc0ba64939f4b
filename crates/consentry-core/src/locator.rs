//! Storage locator parsing.
//!
//! Source rows carry their object-store location as a single
//! `bucket/key` string, and the key embeds the patient and referral
//! identifiers. Both are parsed eagerly into typed values; anything
//! malformed is reported as [`Error::MalformedLocator`] so the caller
//! can record it against the attachment instead of aborting the run.

use uuid::Uuid;

use crate::error::{Error, Result};

/// A parsed `bucket/key` object-store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocator {
    pub bucket: String,
    pub key: String,
}

impl StorageLocator {
    /// Parse a `bucket/key` string. The key may itself contain slashes;
    /// only the first separator splits.
    pub fn parse(raw: &str) -> Result<Self> {
        let (bucket, key) = raw
            .split_once('/')
            .ok_or_else(|| Error::MalformedLocator(raw.to_string()))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(Error::MalformedLocator(raw.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl std::fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Extract the patient and referral UUIDs embedded in an object key.
///
/// Keys are named `{patient_uid}_{referral_uid}` with an optional
/// trailing suffix after further underscores. Both leading segments
/// must parse as UUIDs.
pub fn key_identifiers(key: &str) -> Result<(Uuid, Uuid)> {
    let mut segments = key.split('_');
    let patient = segments
        .next()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::MalformedLocator(key.to_string()))?;
    let referral = segments
        .next()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::MalformedLocator(key.to_string()))?;
    Ok((patient, referral))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_slash() {
        let loc = StorageLocator::parse("consent-forms/abc/def.pdf").unwrap();
        assert_eq!(loc.bucket, "consent-forms");
        assert_eq!(loc.key, "abc/def.pdf");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(matches!(
            StorageLocator::parse("no-separator"),
            Err(Error::MalformedLocator(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_bucket_or_key() {
        assert!(StorageLocator::parse("/key-only").is_err());
        assert!(StorageLocator::parse("bucket-only/").is_err());
        assert!(StorageLocator::parse("/").is_err());
    }

    #[test]
    fn locator_display_round_trips() {
        let loc = StorageLocator::parse("bucket/some_key.pdf").unwrap();
        assert_eq!(loc.to_string(), "bucket/some_key.pdf");
    }

    #[test]
    fn key_identifiers_extracts_both_uuids() {
        let patient = Uuid::new_v4();
        let referral = Uuid::new_v4();
        let key = format!("{}_{}", patient, referral);
        assert_eq!(key_identifiers(&key).unwrap(), (patient, referral));
    }

    #[test]
    fn key_identifiers_allows_trailing_suffix() {
        let patient = Uuid::new_v4();
        let referral = Uuid::new_v4();
        let key = format!("{}_{}_form.pdf", patient, referral);
        assert_eq!(key_identifiers(&key).unwrap(), (patient, referral));
    }

    #[test]
    fn key_identifiers_rejects_single_segment() {
        let key = Uuid::new_v4().to_string();
        assert!(matches!(
            key_identifiers(&key),
            Err(Error::MalformedLocator(_))
        ));
    }

    #[test]
    fn key_identifiers_rejects_non_uuid_segments() {
        assert!(key_identifiers("patient_referral").is_err());
        let key = format!("{}_not-a-uuid", Uuid::new_v4());
        assert!(key_identifiers(&key).is_err());
    }
}
