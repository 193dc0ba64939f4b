//! Page export to the image store.
//!
//! Each attachment owns a directory under the store root; pages are
//! written independently so one bad page never discards its siblings.

use std::path::Path;

use tracing::warn;
use uuid::Uuid;

use consentry_core::{NewPage, Result};

use crate::renderer::PageRaster;

/// Result of exporting an attachment's pages.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Successfully written pages, in page order.
    pub pages: Vec<NewPage>,
    /// Number of pages that failed to write.
    pub failed_pages: usize,
}

impl ExportOutcome {
    /// Whether every page was written.
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0
    }
}

/// Write an attachment's page rasters as PNGs under the store root.
///
/// The per-attachment directory is created idempotently; re-running an
/// export overwrites previous files rather than failing. Individual page
/// failures are counted and logged, and the remaining pages still export.
/// Only a failure to create the directory itself aborts.
pub fn export_pages(
    rasters: &[PageRaster],
    attachment_id: Uuid,
    store_dir: &Path,
) -> Result<ExportOutcome> {
    let attachment_dir = store_dir.join(attachment_id.to_string());
    std::fs::create_dir_all(&attachment_dir)?;

    let mut pages = Vec::with_capacity(rasters.len());
    let mut failed_pages = 0;

    for raster in rasters {
        let filename = format!("{}_{}.png", attachment_id, raster.number);
        let path = attachment_dir.join(&filename);

        match raster.image.save(&path) {
            Ok(()) => pages.push(NewPage {
                page_number: raster.number,
                path: path.to_string_lossy().to_string(),
                blank: raster.blank,
            }),
            Err(e) => {
                warn!(
                    subsystem = "render",
                    component = "exporter",
                    op = "export_pages",
                    attachment_id = %attachment_id,
                    page_number = raster.number,
                    error = %e,
                    "Failed to write page, continuing with remaining pages"
                );
                failed_pages += 1;
            }
        }
    }

    Ok(ExportOutcome {
        pages,
        failed_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn raster(number: i32, blank: bool) -> PageRaster {
        PageRaster {
            number,
            image: GrayImage::from_pixel(10, 14, Luma([200])),
            blank,
        }
    }

    #[test]
    fn exports_all_pages_with_expected_names() {
        let dir = tempfile::tempdir().unwrap();
        let attachment_id = Uuid::new_v4();
        let rasters = vec![raster(1, false), raster(2, true)];

        let outcome = export_pages(&rasters, attachment_id, dir.path()).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.pages.len(), 2);

        let expected_first = dir
            .path()
            .join(attachment_id.to_string())
            .join(format!("{}_1.png", attachment_id));
        assert_eq!(outcome.pages[0].path, expected_first.to_string_lossy());
        assert!(expected_first.exists());
        assert!(!outcome.pages[0].blank);
        assert!(outcome.pages[1].blank);
    }

    #[test]
    fn export_is_idempotent_over_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let attachment_id = Uuid::new_v4();
        let rasters = vec![raster(1, false)];

        export_pages(&rasters, attachment_id, dir.path()).unwrap();
        let outcome = export_pages(&rasters, attachment_id, dir.path()).unwrap();
        assert!(outcome.is_complete());
    }

    #[test]
    fn export_with_no_pages_yields_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = export_pages(&[], Uuid::new_v4(), dir.path()).unwrap();
        assert!(outcome.pages.is_empty());
        assert!(outcome.is_complete());
    }

    #[test]
    fn unwritable_store_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the store directory should be makes create_dir_all fail.
        let blocker = dir.path().join("store");
        std::fs::write(&blocker, b"occupied").unwrap();

        let result = export_pages(&[raster(1, false)], Uuid::new_v4(), &blocker);
        assert!(result.is_err());
    }
}
