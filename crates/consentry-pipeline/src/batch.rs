//! Batch aggregation of ingested attachments into tracker issues.
//!
//! One run takes a bounded set of new candidates, ingests each, and
//! raises exactly one review issue for the ready attachments plus one
//! fault issue per errored attachment. Local ticket rows are written
//! before any external call; rows whose external create failed are
//! retried at the start of the next run, so a tracker outage delays
//! issues without losing them.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use consentry_core::defaults::{
    CANDIDATE_TITLE, CROP_H, CROP_TARGET_WIDTH, CROP_W, CROP_X, CROP_Y,
    FAULT_LINK_ISSUE_TYPE_ID, ISSUE_TYPE_FAULT, ISSUE_TYPE_REVIEW,
};
use consentry_core::{Error, ErrorKind, PatientDetails, Result, TicketKind, TrackedAttachment};
use consentry_db::{PgAttachmentRepository, PgSourceRepository, PgTicketRepository};
use consentry_render::{crop_region, encode_png, CropRegion};
use consentry_tracker::{fault_creation_url, fault_summary, FaultLink, NewIssue, TrackerClient};

use crate::ingest::Ingestor;
use crate::linker::PatientLinker;

const REVIEW_TABLE_HEADER: [&str; 5] = ["id", "name", "dob", "image", "fault link"];

/// Settings for batch aggregation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub project_key: String,
    pub assignee: String,
    /// Tracker base URL, used for prefilled fault-creation links.
    pub tracker_base_url: String,
    /// Numeric project id for prefilled links; optional because the
    /// tracker UI can prompt for the project instead.
    pub project_id: Option<String>,
}

/// Counters from one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Tickets whose failed external create was retried successfully.
    pub retried: usize,
    /// Candidates taken from the source store.
    pub processed: usize,
    /// Attachments that made it into the review issue.
    pub ready: usize,
    /// Attachments routed to fault issues.
    pub errored: usize,
    /// Candidates another run had already tracked.
    pub deduped: usize,
    /// External key of the review issue, when one was created.
    pub review_key: Option<String>,
}

/// One row of the review table plus its thumbnail source.
struct ReviewItem {
    attachment_id: Uuid,
    bucket: String,
    key: String,
    patient: Option<PatientDetails>,
    first_page_path: Option<String>,
}

/// Drives ingest runs and turns their outcomes into tracker issues.
pub struct BatchAggregator {
    source: PgSourceRepository,
    attachments: PgAttachmentRepository,
    tickets: PgTicketRepository,
    linker: PatientLinker,
    ingestor: Ingestor,
    tracker: TrackerClient,
    config: BatchConfig,
}

impl BatchAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: PgSourceRepository,
        attachments: PgAttachmentRepository,
        tickets: PgTicketRepository,
        linker: PatientLinker,
        ingestor: Ingestor,
        tracker: TrackerClient,
        config: BatchConfig,
    ) -> Self {
        Self {
            source,
            attachments,
            tickets,
            linker,
            ingestor,
            tracker,
            config,
        }
    }

    /// Run one batch: retry pending creates, ingest up to `limit` new
    /// candidates, and raise the resulting issues.
    pub async fn run(&self, limit: i64) -> Result<BatchReport> {
        let retried = self.retry_failed_creates().await?;

        let excluded = self.attachments.tracked_source_uids().await?;
        let candidates = self
            .source
            .candidate_attachments(CANDIDATE_TITLE, &excluded, limit)
            .await?;

        let mut ready_items = Vec::new();
        let mut errored = 0;
        let mut deduped = 0;

        for candidate in &candidates {
            let result = self.ingestor.ingest(candidate).await?;
            if result.deduped {
                deduped += 1;
                continue;
            }

            if result.is_ready() {
                let first_page_path = result
                    .pages
                    .iter()
                    .find(|p| p.page_number == 1)
                    .map(|p| p.path.clone());
                ready_items.push(ReviewItem {
                    attachment_id: result.attachment.id,
                    bucket: result.attachment.bucket.clone(),
                    key: result.attachment.key.clone(),
                    patient: result.patient.clone(),
                    first_page_path,
                });
            } else {
                let ticket = self.tickets.insert(TicketKind::Fault).await?;
                self.attachments
                    .set_ticket(result.attachment.id, ticket.id)
                    .await?;
                self.attachments
                    .link_errors_to_ticket(result.attachment.id, ticket.id)
                    .await?;
                self.create_fault_for(ticket.id, &result.attachment, &result.errors)
                    .await?;
                errored += 1;
            }
        }

        let review_key = if ready_items.is_empty() {
            None
        } else {
            let ticket = self.tickets.insert(TicketKind::Review).await?;
            for item in &ready_items {
                self.attachments
                    .set_ticket(item.attachment_id, ticket.id)
                    .await?;
            }
            self.create_review_for_items(ticket.id, &ready_items).await?
        };

        let report = BatchReport {
            retried,
            processed: candidates.len(),
            ready: ready_items.len(),
            errored,
            deduped,
            review_key,
        };
        info!(
            subsystem = "pipeline",
            component = "batch",
            op = "run",
            retried = report.retried,
            processed = report.processed,
            ready = report.ready,
            errored = report.errored,
            deduped = report.deduped,
            review_key = report.review_key.as_deref().unwrap_or("-"),
            "Batch run complete"
        );
        Ok(report)
    }

    /// Re-create external issues for tickets stuck in `create_failed`.
    async fn retry_failed_creates(&self) -> Result<usize> {
        let mut retried = 0;

        for ticket in self.tickets.create_failed().await? {
            let linked = self.attachments.by_ticket(ticket.id).await?;

            let created = match ticket.kind {
                TicketKind::Fault => {
                    let Some(attachment) = linked.first() else {
                        warn!(
                            subsystem = "pipeline",
                            component = "batch",
                            op = "retry_failed_creates",
                            ticket_id = %ticket.id,
                            "Pending fault ticket has no linked attachment, skipping"
                        );
                        continue;
                    };
                    let errors: Vec<ErrorKind> = self
                        .attachments
                        .errors_for(attachment.id)
                        .await?
                        .into_iter()
                        .map(|e| e.kind)
                        .collect();
                    self.create_fault_for(ticket.id, attachment, &errors)
                        .await?
                        .is_some()
                }
                TicketKind::Review => {
                    let mut items = Vec::with_capacity(linked.len());
                    for attachment in &linked {
                        items.push(self.stored_review_item(attachment).await?);
                    }
                    self.create_review_for_items(ticket.id, &items)
                        .await?
                        .is_some()
                }
            };

            if created {
                retried += 1;
            }
        }
        Ok(retried)
    }

    /// Rebuild a review row from the ledger for a retried create.
    async fn stored_review_item(&self, attachment: &TrackedAttachment) -> Result<ReviewItem> {
        let patient = match attachment.patient_uid {
            Some(uid) => self.linker.resolve(uid).await?,
            None => None,
        };
        let first_page_path = self
            .attachments
            .pages_for(attachment.id)
            .await?
            .into_iter()
            .find(|p| p.page_number == 1)
            .map(|p| p.path);
        Ok(ReviewItem {
            attachment_id: attachment.id,
            bucket: attachment.bucket.clone(),
            key: attachment.key.clone(),
            patient,
            first_page_path,
        })
    }

    /// Create the external fault issue for a local ticket row.
    ///
    /// A tracker failure marks the row `create_failed` and returns
    /// `None`; the batch keeps moving.
    async fn create_fault_for(
        &self,
        ticket_id: Uuid,
        attachment: &TrackedAttachment,
        errors: &[ErrorKind],
    ) -> Result<Option<String>> {
        let issue = fault_issue(&self.config, attachment, errors);
        match self.tracker.create_issue(&issue).await {
            Ok(key) => {
                self.tickets.set_external_key(ticket_id, &key).await?;
                Ok(Some(key))
            }
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "batch",
                    op = "create_fault_for",
                    ticket_id = %ticket_id,
                    attachment_id = %attachment.id,
                    error = %e,
                    "Fault issue create failed, will retry next run"
                );
                self.tickets.mark_create_failed(ticket_id).await?;
                Ok(None)
            }
        }
    }

    /// Create the external review issue and upload its thumbnails.
    async fn create_review_for_items(
        &self,
        ticket_id: Uuid,
        items: &[ReviewItem],
    ) -> Result<Option<String>> {
        let mut rows = Vec::with_capacity(items.len());
        let mut crops = Vec::new();

        for item in items {
            rows.push(review_row(&self.config, item)?);
            if let Some(path) = &item.first_page_path {
                match crop_thumbnail(path) {
                    Ok(bytes) => crops.push((format!("{}.png", item.attachment_id), bytes)),
                    Err(e) => warn!(
                        subsystem = "pipeline",
                        component = "batch",
                        op = "create_review_for_items",
                        attachment_id = %item.attachment_id,
                        error = %e,
                        "Failed to build thumbnail, row keeps its image reference"
                    ),
                }
            }
        }

        let issue = review_issue(&self.config, markup_table(&REVIEW_TABLE_HEADER, &rows));
        match self.tracker.create_issue(&issue).await {
            Ok(key) => {
                self.tickets.set_external_key(ticket_id, &key).await?;
                for (filename, bytes) in crops {
                    if let Err(e) = self.tracker.add_png_attachment(&key, &filename, bytes).await {
                        warn!(
                            subsystem = "pipeline",
                            component = "batch",
                            op = "create_review_for_items",
                            issue_key = %key,
                            filename = %filename,
                            error = %e,
                            "Thumbnail upload failed, continuing"
                        );
                    }
                }
                Ok(Some(key))
            }
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "batch",
                    op = "create_review_for_items",
                    ticket_id = %ticket_id,
                    error = %e,
                    "Review issue create failed, will retry next run"
                );
                self.tickets.mark_create_failed(ticket_id).await?;
                Ok(None)
            }
        }
    }
}

/// Render rows into pipe markup: `||`-separated header, `|`-separated
/// body rows, one line each.
pub fn markup_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("||{}||", header.join("||")));
    for row in rows {
        lines.push(format!("|{}|", row.join("|")));
    }
    lines.join("\n")
}

fn review_row(config: &BatchConfig, item: &ReviewItem) -> Result<Vec<String>> {
    let (name, dob) = item
        .patient
        .as_ref()
        .map(|p| (p.name.clone(), p.date_of_birth.clone()))
        .unwrap_or_default();
    let link = fault_creation_url(
        &config.tracker_base_url,
        &FaultLink {
            reporter: config.assignee.clone(),
            assignee: config.assignee.clone(),
            issue_type_id: FAULT_LINK_ISSUE_TYPE_ID.to_string(),
            project_id: config.project_id.clone(),
            summary: fault_summary(item.attachment_id),
            description: format!(
                "Something has gone wrong with this file.\nOriginal location {}/{}",
                item.bucket, item.key
            ),
        },
    )?;
    Ok(vec![
        item.attachment_id.to_string(),
        name,
        dob,
        format!("!{}.png!", item.attachment_id),
        format!("[Fault|{}]", link),
    ])
}

fn fault_issue(
    config: &BatchConfig,
    attachment: &TrackedAttachment,
    errors: &[ErrorKind],
) -> NewIssue {
    let kinds = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    NewIssue {
        project_key: config.project_key.clone(),
        summary: format!("Consent form error for file {}", attachment.id),
        description: format!(
            "Processing failed with: {}.\nOriginal location {}/{}",
            kinds, attachment.bucket, attachment.key
        ),
        issue_type: ISSUE_TYPE_FAULT.to_string(),
        assignee: Some(config.assignee.clone()),
    }
}

fn review_issue(config: &BatchConfig, description: String) -> NewIssue {
    NewIssue {
        project_key: config.project_key.clone(),
        summary: format!("Consent form inspection {}", Utc::now().format("%Y-%m-%d")),
        description,
        issue_type: ISSUE_TYPE_REVIEW.to_string(),
        assignee: Some(config.assignee.clone()),
    }
}

/// Load an exported page and cut the review thumbnail out of it.
fn crop_thumbnail(path: &str) -> Result<Vec<u8>> {
    let img = image::open(path)
        .map_err(|e| Error::Render(format!("Failed to load page image {}: {}", path, e)))?
        .into_luma8();
    let region = CropRegion {
        x: CROP_X,
        y: CROP_Y,
        w: CROP_W,
        h: CROP_H,
    };
    let crop = crop_region(&img, &region, CROP_TARGET_WIDTH)?;
    encode_png(&crop)
}
