//! Fractional crops for review-table thumbnails.
//!
//! The review ticket embeds a small crop of page 1 for each attachment.
//! Crop boxes are expressed as fractions of the page so the same region
//! works at any render DPI.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat};

use consentry_core::{Error, Result};

/// A fractional crop box. All fields are in `[0, 1]` relative to the
/// page dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl CropRegion {
    /// Validate that the region describes a non-empty box inside the
    /// unit square.
    fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.x) || !in_unit(self.y) || !in_unit(self.w) || !in_unit(self.h) {
            return Err(Error::InvalidInput(format!(
                "crop region out of range: x={} y={} w={} h={}",
                self.x, self.y, self.w, self.h
            )));
        }
        if self.w == 0.0 || self.h == 0.0 {
            return Err(Error::InvalidInput(
                "crop region has zero width or height".to_string(),
            ));
        }
        Ok(())
    }
}

/// Crop a fractional region out of a page and scale it to `target_width`.
///
/// Extents past the page edge are clamped to the edge. Output height
/// preserves the aspect ratio of the clamped crop.
pub fn crop_region(img: &GrayImage, region: &CropRegion, target_width: u32) -> Result<GrayImage> {
    region.validate()?;
    if target_width == 0 {
        return Err(Error::InvalidInput("target width must be positive".to_string()));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::InvalidInput("cannot crop an empty image".to_string()));
    }

    let (width, height) = (f64::from(img.width()), f64::from(img.height()));
    // An origin of exactly 1.0 lands on the edge; pull it back one pixel
    // so the crop view stays inside the image.
    let x0 = ((region.x * width).floor() as u32).min(img.width() - 1);
    let y0 = ((region.y * height).floor() as u32).min(img.height() - 1);
    let crop_w = ((region.w * width).round() as u32).min(img.width() - x0).max(1);
    let crop_h = ((region.h * height).round() as u32).min(img.height() - y0).max(1);

    let cropped = imageops::crop_imm(img, x0, y0, crop_w, crop_h).to_image();

    let target_height =
        ((f64::from(crop_h) * f64::from(target_width)) / f64::from(crop_w)).round() as u32;
    let target_height = target_height.max(1);

    Ok(imageops::resize(
        &cropped,
        target_width,
        target_height,
        FilterType::Triangle,
    ))
}

/// Encode a grayscale image as PNG bytes for upload.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| Error::Render(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([128]))
    }

    #[test]
    fn crop_output_matches_target_width() {
        let img = page(400, 600);
        let region = CropRegion {
            x: 0.5,
            y: 0.5,
            w: 0.25,
            h: 0.25,
        };
        let out = crop_region(&img, &region, 150).unwrap();
        assert_eq!(out.width(), 150);
    }

    #[test]
    fn crop_preserves_aspect_ratio() {
        let img = page(400, 600);
        // 0.25 * 400 = 100 wide, 0.25 * 600 = 150 tall. At width 150
        // the height must scale to 225.
        let region = CropRegion {
            x: 0.0,
            y: 0.0,
            w: 0.25,
            h: 0.25,
        };
        let out = crop_region(&img, &region, 150).unwrap();
        assert_eq!(out.width(), 150);
        assert_eq!(out.height(), 225);
    }

    #[test]
    fn crop_clamps_extents_past_the_edge() {
        let img = page(100, 100);
        // Origin near the corner with a box extending past both edges.
        let region = CropRegion {
            x: 0.9,
            y: 0.9,
            w: 0.5,
            h: 0.5,
        };
        let out = crop_region(&img, &region, 20).unwrap();
        assert_eq!(out.width(), 20);
        // Clamped to a 10x10 crop, so the aspect stays square.
        assert_eq!(out.height(), 20);
    }

    #[test]
    fn crop_rejects_out_of_range_fractions() {
        let img = page(100, 100);
        let bad = [
            CropRegion { x: -0.1, y: 0.0, w: 0.5, h: 0.5 },
            CropRegion { x: 0.0, y: 1.5, w: 0.5, h: 0.5 },
            CropRegion { x: 0.0, y: 0.0, w: 2.0, h: 0.5 },
        ];
        for region in bad {
            assert!(matches!(
                crop_region(&img, &region, 100),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn crop_rejects_zero_sized_regions() {
        let img = page(100, 100);
        let region = CropRegion {
            x: 0.5,
            y: 0.5,
            w: 0.0,
            h: 0.25,
        };
        assert!(crop_region(&img, &region, 100).is_err());
    }

    #[test]
    fn crop_rejects_zero_target_width() {
        let img = page(100, 100);
        let region = CropRegion {
            x: 0.0,
            y: 0.0,
            w: 0.5,
            h: 0.5,
        };
        assert!(crop_region(&img, &region, 0).is_err());
    }

    #[test]
    fn encode_png_emits_signature() {
        let img = page(10, 10);
        let bytes = encode_png(&img).unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
