//! Core data models for consentry.
//!
//! These types are shared across all consentry crates and represent
//! the core domain entities of the ingestion and reconciliation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// SOURCE STORE
// =============================================================================

/// An attachment row as read from the upstream clinical record store.
///
/// The source store is read-only; discovery selects rows by exact title
/// and filters out anything already present in the tracking ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttachment {
    pub uid: Uuid,
    pub title: String,
    /// Storage locator in `bucket/key` form.
    pub url: String,
}

/// Patient identity resolved through the patient → person join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    /// `"{first} {last}"`, upper-cased.
    pub name: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date_of_birth: String,
}

// =============================================================================
// TRACKING LEDGER
// =============================================================================

/// An attachment row in the tracking ledger.
///
/// `source_uid` is unique; a second discovery of the same source row
/// short-circuits against the existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedAttachment {
    pub id: Uuid,
    pub source_uid: Uuid,
    pub bucket: String,
    pub key: String,
    pub patient_uid: Option<Uuid>,
    pub referral_uid: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A rasterized page persisted for a tracked attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub attachment_id: Uuid,
    /// 1-based page number.
    pub page_number: i32,
    /// Filesystem path of the exported PNG.
    pub path: String,
    pub blank: bool,
    pub created_at: DateTime<Utc>,
}

/// Page data prior to insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPage {
    pub page_number: i32,
    pub path: String,
    pub blank: bool,
}

/// A processing failure recorded against an attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingError {
    pub id: Uuid,
    pub attachment_id: Uuid,
    pub kind: ErrorKind,
    pub ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Classification of per-attachment processing failures.
///
/// Any recorded kind makes the attachment Errored; the remaining pipeline
/// steps are skipped and the attachment routes to a fault ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Download,
    ImageConversion,
    ImageExport,
    LinkingToParticipant,
    MalformedLocator,
    /// A reviewer flagged the attachment after inspection; recorded when
    /// an externally created fault issue is discovered.
    InspectionFault,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::ImageConversion => write!(f, "image_conversion"),
            Self::ImageExport => write!(f, "image_export"),
            Self::LinkingToParticipant => write!(f, "linking_to_participant"),
            Self::MalformedLocator => write!(f, "malformed_locator"),
            Self::InspectionFault => write!(f, "inspection_fault"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "download" => Ok(Self::Download),
            "image_conversion" => Ok(Self::ImageConversion),
            "image_export" => Ok(Self::ImageExport),
            "linking_to_participant" => Ok(Self::LinkingToParticipant),
            "malformed_locator" => Ok(Self::MalformedLocator),
            "inspection_fault" => Ok(Self::InspectionFault),
            _ => Err(format!("Invalid error kind: {}", s)),
        }
    }
}

// =============================================================================
// TICKETS
// =============================================================================

/// Which external issue a local ticket row mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    /// Batch review issue covering every ready attachment in a run.
    Review,
    /// Per-attachment fault issue for errored attachments.
    Fault,
}

impl std::fmt::Display for TicketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Review => write!(f, "review"),
            Self::Fault => write!(f, "fault"),
        }
    }
}

impl std::str::FromStr for TicketKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "review" => Ok(Self::Review),
            "fault" => Ok(Self::Fault),
            _ => Err(format!("Invalid ticket kind: {}", s)),
        }
    }
}

/// Local mirror of an external issue.
///
/// `id` is assigned before the external create call; `external_key` stays
/// NULL until the tracker accepts the issue. A create failure leaves the
/// row in status [`TICKET_STATUS_CREATE_FAILED`] for the next run to retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub external_key: Option<String>,
    pub kind: TicketKind,
    pub status: String,
    pub assignee: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Status of a freshly created ticket, before any reconciliation pass.
pub const TICKET_STATUS_NEW: &str = "new";

/// Status of a ticket whose external create call failed.
pub const TICKET_STATUS_CREATE_FAILED: &str = "create_failed";

/// Status recorded when the external issue no longer exists.
pub const TICKET_STATUS_NOT_FOUND: &str = "not found";

// =============================================================================
// INGEST STATE MACHINE
// =============================================================================

/// Per-attachment processing state.
///
/// Transitions run strictly forward. Once Errored, remaining steps are
/// skipped apart from ledger bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    New,
    Fetching,
    Rendering,
    Exporting,
    Linking,
    Ready,
    Errored,
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Errored)
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Fetching => write!(f, "fetching"),
            Self::Rendering => write!(f, "rendering"),
            Self::Exporting => write!(f, "exporting"),
            Self::Linking => write!(f, "linking"),
            Self::Ready => write!(f, "ready"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn error_kind_display_round_trips() {
        let kinds = [
            ErrorKind::Download,
            ErrorKind::ImageConversion,
            ErrorKind::ImageExport,
            ErrorKind::LinkingToParticipant,
            ErrorKind::MalformedLocator,
            ErrorKind::InspectionFault,
        ];
        for kind in kinds {
            let parsed = ErrorKind::from_str(&kind.to_string()).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn error_kind_from_str_rejects_unknown() {
        assert!(ErrorKind::from_str("upload").is_err());
        assert!(ErrorKind::from_str("").is_err());
    }

    #[test]
    fn error_kind_from_str_case_insensitive() {
        assert_eq!(
            ErrorKind::from_str("IMAGE_CONVERSION").unwrap(),
            ErrorKind::ImageConversion
        );
    }

    #[test]
    fn ticket_kind_display_round_trips() {
        for kind in [TicketKind::Review, TicketKind::Fault] {
            assert_eq!(TicketKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn ticket_kind_from_str_rejects_unknown() {
        assert!(TicketKind::from_str("incident").is_err());
    }

    #[test]
    fn ingest_state_terminality() {
        assert!(IngestState::Ready.is_terminal());
        assert!(IngestState::Errored.is_terminal());
        assert!(!IngestState::New.is_terminal());
        assert!(!IngestState::Fetching.is_terminal());
        assert!(!IngestState::Rendering.is_terminal());
        assert!(!IngestState::Exporting.is_terminal());
        assert!(!IngestState::Linking.is_terminal());
    }

    #[test]
    fn error_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LinkingToParticipant).unwrap();
        assert_eq!(json, "\"linking_to_participant\"");
    }

    #[test]
    fn ticket_status_constants_are_distinct() {
        assert_ne!(TICKET_STATUS_NEW, TICKET_STATUS_CREATE_FAILED);
        assert_ne!(TICKET_STATUS_NEW, TICKET_STATUS_NOT_FOUND);
        assert_ne!(TICKET_STATUS_CREATE_FAILED, TICKET_STATUS_NOT_FOUND);
    }
}
