//! Document rasterization via pdftoppm.
//!
//! Pipeline: PDF on disk → pdftoppm (grayscale PNGs into a temp dir) →
//! pages loaded in filename order → blank flagging and orientation fixes.
//! Any rasterizer failure is an [`Error::Render`]; the caller records it
//! against the attachment and keeps the batch moving.

use std::fs;
use std::path::Path;

use image::imageops;
use image::GrayImage;
use tokio::process::Command;
use tracing::debug;

use consentry_core::defaults::{BLANK_STDDEV, RENDER_CMD_TIMEOUT_SECS, RENDER_DPI};
use consentry_core::{Error, Result};

/// Options controlling rasterization and blank detection.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Resolution passed to pdftoppm.
    pub dpi: u32,
    /// Intensity standard deviation below which a page is flagged blank.
    pub blank_stddev: f64,
    /// Timeout for the pdftoppm invocation in seconds.
    pub timeout_secs: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: RENDER_DPI,
            blank_stddev: BLANK_STDDEV,
            timeout_secs: RENDER_CMD_TIMEOUT_SECS,
        }
    }
}

/// A single rasterized page.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// 1-based page number.
    pub number: i32,
    pub image: GrayImage,
    pub blank: bool,
}

/// Run a command that outputs to files rather than stdout.
async fn run_cmd_status(cmd: &mut Command, timeout_secs: u64) -> Result<()> {
    let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Render(format!("pdftoppm timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Render(format!("Failed to execute pdftoppm: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Render(format!(
            "pdftoppm failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Rasterize a PDF into grayscale pages.
///
/// Pages come back in document order with blank flags set and landscape
/// pages rotated to portrait. Zero rendered pages is an error; an
/// unreadable document must not silently become an empty attachment.
pub async fn render(pdf_path: &Path, options: &RenderOptions) -> Result<Vec<PageRaster>> {
    let img_dir = tempfile::TempDir::new()
        .map_err(|e| Error::Render(format!("Failed to create temp dir: {}", e)))?;
    let img_prefix = img_dir.path().join("page").to_string_lossy().to_string();

    debug!(
        subsystem = "render",
        component = "renderer",
        op = "render",
        dpi = options.dpi,
        "Rasterizing document pages"
    );

    run_cmd_status(
        Command::new("pdftoppm")
            .arg("-png")
            .arg("-gray")
            .arg("-r")
            .arg(options.dpi.to_string())
            .arg(pdf_path)
            .arg(&img_prefix),
        options.timeout_secs,
    )
    .await?;

    // Sorted by name for correct page order; pdftoppm zero-pads numbers.
    let mut page_files: Vec<std::path::PathBuf> = Vec::new();
    let entries = fs::read_dir(img_dir.path())
        .map_err(|e| Error::Render(format!("Failed to read temp dir: {}", e)))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::Render(format!("Failed to read dir entry: {}", e)))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            page_files.push(path);
        }
    }
    page_files.sort();

    if page_files.is_empty() {
        return Err(Error::Render("No pages rendered from document".to_string()));
    }

    let mut rasters = Vec::with_capacity(page_files.len());
    for (i, path) in page_files.iter().enumerate() {
        let img = image::open(path)
            .map_err(|e| Error::Render(format!("Failed to load rendered page: {}", e)))?
            .into_luma8();
        let img = rotate_if_landscape(img);
        let blank = is_blank(&img, options.blank_stddev);
        rasters.push(PageRaster {
            number: (i + 1) as i32,
            image: img,
            blank,
        });
    }

    debug!(
        subsystem = "render",
        component = "renderer",
        op = "render",
        page_count = rasters.len(),
        "Rasterized document pages"
    );
    Ok(rasters)
}

/// Rotate a landscape page 90 degrees counter-clockwise into portrait.
pub fn rotate_if_landscape(img: GrayImage) -> GrayImage {
    if img.width() > img.height() {
        imageops::rotate270(&img)
    } else {
        img
    }
}

/// Whether a page's intensity variation falls below the blank threshold.
pub fn is_blank(img: &GrayImage, threshold: f64) -> bool {
    intensity_stddev(img) < threshold
}

/// Standard deviation of pixel intensities on the 8-bit scale.
pub fn intensity_stddev(img: &GrayImage) -> f64 {
    let pixels = img.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|p| f64::from(*p)).sum::<f64>() / n;
    let variance = pixels
        .iter()
        .map(|p| {
            let d = f64::from(*p) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn uniform_image(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    fn checkerboard(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn uniform_page_has_zero_stddev() {
        let img = uniform_image(50, 70, 255);
        assert_eq!(intensity_stddev(&img), 0.0);
    }

    #[test]
    fn uniform_page_is_blank() {
        let img = uniform_image(50, 70, 255);
        assert!(is_blank(&img, BLANK_STDDEV));
    }

    #[test]
    fn high_contrast_page_is_not_blank() {
        let img = checkerboard(50, 70);
        assert!(!is_blank(&img, BLANK_STDDEV));
        assert!(intensity_stddev(&img) > 100.0);
    }

    #[test]
    fn empty_image_has_zero_stddev() {
        let img = GrayImage::new(0, 0);
        assert_eq!(intensity_stddev(&img), 0.0);
    }

    #[test]
    fn landscape_pages_rotate_to_portrait() {
        let img = uniform_image(100, 60, 128);
        let rotated = rotate_if_landscape(img);
        assert_eq!(rotated.width(), 60);
        assert_eq!(rotated.height(), 100);
    }

    #[test]
    fn portrait_pages_are_untouched() {
        let img = uniform_image(60, 100, 128);
        let same = rotate_if_landscape(img.clone());
        assert_eq!(same, img);
    }

    #[test]
    fn rotation_is_counter_clockwise() {
        // Landscape 2x1: left pixel dark, right pixel light. After a
        // counter-clockwise quarter turn, the right column becomes the
        // top row.
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([255]));
        let rotated = rotate_if_landscape(img);
        assert_eq!(rotated.get_pixel(0, 0), &Luma([255]));
        assert_eq!(rotated.get_pixel(0, 1), &Luma([0]));
    }

    #[test]
    fn render_options_defaults() {
        let options = RenderOptions::default();
        assert_eq!(options.dpi, RENDER_DPI);
        assert!((options.blank_stddev - BLANK_STDDEV).abs() < f64::EPSILON);
        assert_eq!(options.timeout_secs, RENDER_CMD_TIMEOUT_SECS);
    }

    #[tokio::test]
    async fn render_fails_on_missing_document() {
        let result = render(
            Path::new("/nonexistent/document.pdf"),
            &RenderOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::Render(_))));
    }
}
