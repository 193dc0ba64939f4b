//! # consentry-tracker
//!
//! Issue tracker integration for the consentry pipeline: a typed REST
//! client for issue creation, attachment upload, reads, and JQL search,
//! plus the reconciler that mirrors external ticket state into the
//! tracking ledger.

pub mod client;
pub mod reconcile;
pub mod types;

pub use client::{fault_creation_url, FaultLink, TrackerClient, TrackerConfig};
pub use reconcile::{attachment_id_from_summary, fault_summary, ReconcileReport, Reconciler};
pub use types::{IssueState, IssueSummary, NewIssue};
