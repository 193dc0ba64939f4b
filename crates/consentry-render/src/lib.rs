//! # consentry-render
//!
//! Document rasterization and image operations for the consentry
//! pipeline: pdftoppm-backed page rendering, blank-page detection,
//! orientation normalization, page export, and thumbnail crops.

pub mod crop;
pub mod exporter;
pub mod renderer;

pub use crop::{crop_region, encode_png, CropRegion};
pub use exporter::{export_pages, ExportOutcome};
pub use renderer::{render, PageRaster, RenderOptions};
