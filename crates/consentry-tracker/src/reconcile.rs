//! Ticket reconciliation against the external tracker.
//!
//! Two duties: mirror status and assignee changes for tickets we already
//! track, and discover fault issues that reviewers created directly on
//! the tracker from a review table's prefilled links. The tracker is the
//! source of truth for both; local rows are overwritten, never merged.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use consentry_core::{Error, ErrorKind, Result, TicketKind, TICKET_STATUS_NOT_FOUND};
use consentry_db::{PgAttachmentRepository, PgTicketRepository};

use crate::client::TrackerClient;

/// Counters from a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tickets whose status or assignee changed this pass.
    pub changed: usize,
    /// Tickets whose external issue no longer exists.
    pub missing: usize,
    /// Tickets examined in total.
    pub examined: usize,
}

/// Syncs local ticket rows with the external tracker.
pub struct Reconciler {
    client: TrackerClient,
    tickets: PgTicketRepository,
    attachments: PgAttachmentRepository,
}

impl Reconciler {
    pub fn new(
        client: TrackerClient,
        tickets: PgTicketRepository,
        attachments: PgAttachmentRepository,
    ) -> Self {
        Self {
            client,
            tickets,
            attachments,
        }
    }

    /// Overwrite every tracked ticket with the tracker's current state.
    ///
    /// A ticket whose external issue answers 404 is marked `not found`
    /// and keeps its row; history stays queryable even after the issue
    /// is gone.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for ticket in self.tickets.with_external_key().await? {
            let Some(key) = ticket.external_key.as_deref() else {
                continue;
            };
            report.examined += 1;

            match self.client.get_issue(key).await? {
                Some(state) => {
                    let changed =
                        state.status != ticket.status || state.assignee != ticket.assignee;
                    self.tickets
                        .update_sync(ticket.id, &state.status, state.assignee.as_deref())
                        .await?;
                    if changed {
                        report.changed += 1;
                    }
                }
                None => {
                    self.tickets
                        .update_sync(ticket.id, TICKET_STATUS_NOT_FOUND, None)
                        .await?;
                    report.missing += 1;
                }
            }
        }

        info!(
            subsystem = "tracker",
            component = "reconciler",
            op = "reconcile",
            examined = report.examined,
            changed = report.changed,
            missing = report.missing,
            "Reconciled tracked tickets"
        );
        Ok(report)
    }

    /// Pull reviewer-created fault issues into the local ledger.
    ///
    /// The search is scoped by the caller's JQL. Issues already tracked
    /// are skipped. The originating attachment id is parsed out of the
    /// issue summary; summaries that do not follow the convention are
    /// logged and skipped, never fatal. Returns the number of newly
    /// tracked tickets.
    pub async fn discover_fault_tickets(&self, jql: &str) -> Result<usize> {
        let known: HashSet<String> = self
            .tickets
            .known_external_keys()
            .await?
            .into_iter()
            .collect();

        let mut discovered = 0;
        for hit in self.client.search(jql).await? {
            if known.contains(&hit.key) {
                continue;
            }

            let Some(attachment_id) = attachment_id_from_summary(&hit.summary) else {
                warn!(
                    subsystem = "tracker",
                    component = "reconciler",
                    op = "discover_fault_tickets",
                    issue_key = %hit.key,
                    summary = %hit.summary,
                    "Issue summary carries no attachment id, skipping"
                );
                continue;
            };

            let attachment = match self.attachments.get(attachment_id).await {
                Ok(attachment) => attachment,
                Err(Error::AttachmentNotFound(_)) => {
                    warn!(
                        subsystem = "tracker",
                        component = "reconciler",
                        op = "discover_fault_tickets",
                        issue_key = %hit.key,
                        attachment_id = %attachment_id,
                        "Issue references an untracked attachment, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let ticket = self
                .tickets
                .insert_with_external_key(
                    TicketKind::Fault,
                    &hit.key,
                    &hit.status,
                    hit.assignee.as_deref(),
                )
                .await?;
            self.attachments.set_ticket(attachment.id, ticket.id).await?;
            self.attachments
                .add_error(attachment.id, ErrorKind::InspectionFault, Some(ticket.id))
                .await?;

            info!(
                subsystem = "tracker",
                component = "reconciler",
                op = "discover_fault_tickets",
                issue_key = %hit.key,
                attachment_id = %attachment.id,
                ticket_id = %ticket.id,
                "Tracked externally created fault ticket"
            );
            discovered += 1;
        }

        Ok(discovered)
    }
}

/// Summary line for a fault issue raised against an attachment.
///
/// The `" File "` marker lets discovery recover the attachment id from
/// issues reviewers create through the prefilled links.
pub fn fault_summary(attachment_id: Uuid) -> String {
    format!("Consent form fault File {}", attachment_id)
}

/// Parse the originating attachment id out of a fault issue summary.
///
/// Fault summaries end with `" File {attachment_id}"`; anything after
/// the marker that is not a UUID disqualifies the summary.
pub fn attachment_id_from_summary(summary: &str) -> Option<Uuid> {
    let (_, rest) = summary.split_once(" File ")?;
    Uuid::parse_str(rest.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_with_file_marker_parses() {
        let id = Uuid::new_v4();
        let summary = format!("Consent form fault File {}", id);
        assert_eq!(attachment_id_from_summary(&summary), Some(id));
    }

    #[test]
    fn fault_summary_round_trips_through_parser() {
        let id = Uuid::new_v4();
        assert_eq!(attachment_id_from_summary(&fault_summary(id)), Some(id));
    }

    #[test]
    fn summary_tolerates_trailing_whitespace() {
        let id = Uuid::new_v4();
        let summary = format!("Fault File {} ", id);
        assert_eq!(attachment_id_from_summary(&summary), Some(id));
    }

    #[test]
    fn summary_without_marker_is_skipped() {
        assert_eq!(attachment_id_from_summary("Unrelated issue"), None);
    }

    #[test]
    fn summary_with_garbage_after_marker_is_skipped() {
        assert_eq!(
            attachment_id_from_summary("Fault File not-a-uuid"),
            None
        );
    }

    #[test]
    fn marker_requires_surrounding_spaces() {
        let id = Uuid::new_v4();
        let summary = format!("FaultFile {}", id);
        assert_eq!(attachment_id_from_summary(&summary), None);
    }
}
