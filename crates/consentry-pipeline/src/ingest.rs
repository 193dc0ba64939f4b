//! Per-attachment ingest orchestration.
//!
//! Each source attachment walks the state machine
//! `New → Fetching → Rendering → Exporting → Linking → {Ready | Errored}`.
//! Any recorded error makes the remaining stages no-ops; only the final
//! bookkeeping still runs, so an errored attachment is tracked exactly
//! like a successful one. The downloaded document is deleted only after
//! a fully clean run and kept on disk otherwise for inspection.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempPath;
use tracing::{debug, info, warn};

use consentry_core::{
    key_identifiers, Error, ErrorKind, IngestState, NewPage, PatientDetails, Result,
    SourceAttachment, StorageLocator, TrackedAttachment,
};
use consentry_db::PgAttachmentRepository;
use consentry_render::{export_pages, render, PageRaster, RenderOptions};

use crate::blob::BlobStore;
use crate::linker::PatientLinker;

/// Settings for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub render: RenderOptions,
    /// Root directory of the exported page image store.
    pub image_store_dir: PathBuf,
}

/// Outcome of ingesting one source attachment.
#[derive(Debug, Clone)]
pub struct IngestedAttachment {
    pub attachment: TrackedAttachment,
    pub state: IngestState,
    /// Resolved patient identity; `None` when linkage failed or the
    /// attachment was already tracked.
    pub patient: Option<PatientDetails>,
    /// Exported pages, in page order.
    pub pages: Vec<NewPage>,
    /// Errors accumulated across the stages, in occurrence order.
    pub errors: Vec<ErrorKind>,
    /// Whether an earlier run had already tracked this source uid.
    pub deduped: bool,
}

impl IngestedAttachment {
    pub fn is_ready(&self) -> bool {
        self.state == IngestState::Ready
    }
}

/// Walks source attachments through fetch, render, export, and linkage.
pub struct Ingestor {
    blob: Arc<dyn BlobStore>,
    attachments: PgAttachmentRepository,
    linker: PatientLinker,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        attachments: PgAttachmentRepository,
        linker: PatientLinker,
        options: IngestOptions,
    ) -> Self {
        Self {
            blob,
            attachments,
            linker,
            options,
        }
    }

    /// Ingest one source attachment.
    ///
    /// Per-attachment failures are recorded, never propagated; the only
    /// errors this returns are tracking-store failures, which abort the
    /// run because bookkeeping can no longer be trusted.
    pub async fn ingest(&self, source: &SourceAttachment) -> Result<IngestedAttachment> {
        let mut errors: Vec<ErrorKind> = Vec::new();

        let locator = match StorageLocator::parse(&source.url) {
            Ok(locator) => Some(locator),
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "ingest",
                    op = "ingest",
                    source_uid = %source.uid,
                    error = %e,
                    "Attachment url is not a bucket/key locator"
                );
                errors.push(ErrorKind::MalformedLocator);
                None
            }
        };

        // The raw url is preserved as the key when it does not parse.
        let (bucket, key) = locator
            .as_ref()
            .map(|l| (l.bucket.as_str(), l.key.as_str()))
            .unwrap_or(("", source.url.as_str()));
        let (record, inserted) = self
            .attachments
            .insert_if_absent(source.uid, bucket, key)
            .await?;

        if !inserted {
            debug!(
                subsystem = "pipeline",
                component = "ingest",
                op = "ingest",
                source_uid = %source.uid,
                attachment_id = %record.id,
                "Source attachment already tracked, returning stored outcome"
            );
            return self.stored_outcome(record).await;
        }

        let document = self
            .fetch_stage(&locator, &record, &mut errors)
            .await;
        let rasters = self.render_stage(document.as_ref(), &record, &mut errors).await;
        let pages = self.export_stage(&rasters, &record, &mut errors);

        let identifiers = match locator.as_ref().map(|l| key_identifiers(&l.key)) {
            Some(Ok(identifiers)) => Some(identifiers),
            Some(Err(e)) => {
                warn!(
                    subsystem = "pipeline",
                    component = "ingest",
                    op = "ingest",
                    attachment_id = %record.id,
                    error = %e,
                    "Object key does not carry patient and referral identifiers"
                );
                errors.push(ErrorKind::MalformedLocator);
                None
            }
            None => None,
        };

        let patient = self
            .linking_stage(identifiers, &record, &mut errors)
            .await?;

        self.attachments
            .record_outcome(record.id, identifiers, &pages, &errors)
            .await?;

        let state = if errors.is_empty() {
            IngestState::Ready
        } else {
            IngestState::Errored
        };

        match document {
            Some(path) if state == IngestState::Ready => {
                // Dropping the handle removes the file.
                drop(path);
            }
            Some(path) => {
                if let Ok(kept) = path.keep() {
                    warn!(
                        subsystem = "pipeline",
                        component = "ingest",
                        op = "ingest",
                        attachment_id = %record.id,
                        path = %kept.display(),
                        "Keeping downloaded document for inspection"
                    );
                }
            }
            None => {}
        }

        let mut record = record;
        if let Some((patient_uid, referral_uid)) = identifiers {
            record.patient_uid = Some(patient_uid);
            record.referral_uid = Some(referral_uid);
        }

        info!(
            subsystem = "pipeline",
            component = "ingest",
            op = "ingest",
            source_uid = %source.uid,
            attachment_id = %record.id,
            state = %state,
            page_count = pages.len(),
            error_count = errors.len(),
            "Ingested source attachment"
        );

        Ok(IngestedAttachment {
            attachment: record,
            state,
            patient,
            pages,
            errors,
            deduped: false,
        })
    }

    async fn fetch_stage(
        &self,
        locator: &Option<StorageLocator>,
        record: &TrackedAttachment,
        errors: &mut Vec<ErrorKind>,
    ) -> Option<TempPath> {
        if !errors.is_empty() {
            return None;
        }
        let locator = locator.as_ref()?;

        debug!(
            subsystem = "pipeline",
            component = "ingest",
            op = "ingest",
            attachment_id = %record.id,
            state = %IngestState::Fetching,
            "Fetching source document"
        );
        match self.blob.fetch(locator).await.and_then(write_temp) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "ingest",
                    op = "ingest",
                    attachment_id = %record.id,
                    error = %e,
                    "Failed to fetch source document"
                );
                errors.push(ErrorKind::Download);
                None
            }
        }
    }

    async fn render_stage(
        &self,
        document: Option<&TempPath>,
        record: &TrackedAttachment,
        errors: &mut Vec<ErrorKind>,
    ) -> Vec<PageRaster> {
        if !errors.is_empty() {
            return Vec::new();
        }
        let Some(path) = document else {
            return Vec::new();
        };

        debug!(
            subsystem = "pipeline",
            component = "ingest",
            op = "ingest",
            attachment_id = %record.id,
            state = %IngestState::Rendering,
            "Rasterizing document"
        );
        match render(path, &self.options.render).await {
            Ok(rasters) => rasters,
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "ingest",
                    op = "ingest",
                    attachment_id = %record.id,
                    error = %e,
                    "Failed to rasterize document"
                );
                errors.push(ErrorKind::ImageConversion);
                Vec::new()
            }
        }
    }

    fn export_stage(
        &self,
        rasters: &[PageRaster],
        record: &TrackedAttachment,
        errors: &mut Vec<ErrorKind>,
    ) -> Vec<NewPage> {
        if !errors.is_empty() || rasters.is_empty() {
            return Vec::new();
        }

        debug!(
            subsystem = "pipeline",
            component = "ingest",
            op = "ingest",
            attachment_id = %record.id,
            state = %IngestState::Exporting,
            "Exporting page images"
        );
        match export_pages(rasters, record.id, &self.options.image_store_dir) {
            Ok(outcome) => {
                for _ in 0..outcome.failed_pages {
                    errors.push(ErrorKind::ImageExport);
                }
                outcome.pages
            }
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "ingest",
                    op = "ingest",
                    attachment_id = %record.id,
                    error = %e,
                    "Failed to export page images"
                );
                errors.push(ErrorKind::ImageExport);
                Vec::new()
            }
        }
    }

    async fn linking_stage(
        &self,
        identifiers: Option<(uuid::Uuid, uuid::Uuid)>,
        record: &TrackedAttachment,
        errors: &mut Vec<ErrorKind>,
    ) -> Result<Option<PatientDetails>> {
        if !errors.is_empty() {
            return Ok(None);
        }
        let Some((patient_uid, _)) = identifiers else {
            return Ok(None);
        };

        debug!(
            subsystem = "pipeline",
            component = "ingest",
            op = "ingest",
            attachment_id = %record.id,
            state = %IngestState::Linking,
            "Linking to patient"
        );
        let patient = self.linker.resolve(patient_uid).await?;
        if patient.is_none() {
            errors.push(ErrorKind::LinkingToParticipant);
        }
        Ok(patient)
    }

    /// Load the persisted outcome of an already-tracked attachment.
    async fn stored_outcome(&self, record: TrackedAttachment) -> Result<IngestedAttachment> {
        let pages = self
            .attachments
            .pages_for(record.id)
            .await?
            .into_iter()
            .map(|page| NewPage {
                page_number: page.page_number,
                path: page.path,
                blank: page.blank,
            })
            .collect::<Vec<_>>();
        let errors = self
            .attachments
            .errors_for(record.id)
            .await?
            .into_iter()
            .map(|error| error.kind)
            .collect::<Vec<_>>();

        let state = if errors.is_empty() {
            IngestState::Ready
        } else {
            IngestState::Errored
        };
        Ok(IngestedAttachment {
            attachment: record,
            state,
            patient: None,
            pages,
            errors,
            deduped: true,
        })
    }
}

/// Spill fetched bytes into a named temp file for the rasterizer.
fn write_temp(bytes: Vec<u8>) -> Result<TempPath> {
    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| Error::Storage(format!("Failed to create temp file: {}", e)))?;
    file.write_all(&bytes)
        .map_err(|e| Error::Storage(format!("Failed to write temp file: {}", e)))?;
    file.flush()
        .map_err(|e| Error::Storage(format!("Failed to flush temp file: {}", e)))?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use consentry_core::defaults;

    #[test]
    fn write_temp_persists_bytes() {
        let path = write_temp(b"%PDF-1.4 content".to_vec()).unwrap();
        let read_back = std::fs::read(&path).unwrap();
        assert_eq!(read_back, b"%PDF-1.4 content");
    }

    #[test]
    fn temp_path_is_removed_on_drop() {
        let path = write_temp(b"data".to_vec()).unwrap();
        let location = path.to_path_buf();
        drop(path);
        assert!(!location.exists());
    }

    #[test]
    fn kept_temp_path_survives() {
        let path = write_temp(b"data".to_vec()).unwrap();
        let location = path.keep().unwrap();
        assert!(location.exists());
        std::fs::remove_file(location).unwrap();
    }

    #[test]
    fn ingest_options_carry_render_defaults() {
        let options = IngestOptions {
            render: RenderOptions::default(),
            image_store_dir: PathBuf::from("/var/lib/consentry/images"),
        };
        assert_eq!(options.render.dpi, defaults::RENDER_DPI);
    }
}
