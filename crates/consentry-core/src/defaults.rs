//! Centralized default constants for the consentry pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates and the CLI should reference these constants instead
//! of defining their own magic numbers.

// =============================================================================
// RENDERING
// =============================================================================

/// Rasterization resolution passed to pdftoppm (dots per inch).
pub const RENDER_DPI: u32 = 200;

/// Per-command timeout for the external rasterizer (seconds).
pub const RENDER_CMD_TIMEOUT_SECS: u64 = 180;

/// Intensity standard deviation below which a grayscale page is
/// flagged blank (8-bit scale).
pub const BLANK_STDDEV: f64 = 10.0;

// =============================================================================
// CROPPING
// =============================================================================

/// Fractional x origin of the review-table thumbnail crop.
pub const CROP_X: f64 = 0.5;

/// Fractional y origin of the review-table thumbnail crop.
pub const CROP_Y: f64 = 0.5;

/// Fractional width of the review-table thumbnail crop.
pub const CROP_W: f64 = 0.25;

/// Fractional height of the review-table thumbnail crop.
pub const CROP_H: f64 = 0.25;

/// Output width in pixels for review-table thumbnails.
pub const CROP_TARGET_WIDTH: u32 = 150;

// =============================================================================
// BATCH PROCESSING
// =============================================================================

/// Maximum candidate attachments taken per batch run.
pub const BATCH_LIMIT: i64 = 10;

/// Exact source title selecting consent-form candidates.
pub const CANDIDATE_TITLE: &str = "record-of-discussion-form.pdf";

// =============================================================================
// ISSUE TRACKER
// =============================================================================

/// Timeout for tracker REST requests in seconds.
pub const TRACKER_TIMEOUT_SECS: u64 = 30;

/// Page size for paginated issue searches.
pub const SEARCH_PAGE_SIZE: i64 = 100;

/// Issue type name for batch review issues.
pub const ISSUE_TYPE_REVIEW: &str = "Task";

/// Issue type name for per-attachment fault issues.
pub const ISSUE_TYPE_FAULT: &str = "Fault";

/// Numeric issue type id used in prefilled fault-creation links.
pub const FAULT_LINK_ISSUE_TYPE_ID: &str = "3";

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Timeout for blob fetches in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_box_stays_inside_unit_square() {
        // Runtime check needed for floating point arithmetic
        assert!(CROP_X + CROP_W <= 1.0 + f64::EPSILON);
        assert!(CROP_Y + CROP_H <= 1.0 + f64::EPSILON);
    }

    #[test]
    fn blank_threshold_within_eight_bit_range() {
        assert!(BLANK_STDDEV > 0.0);
        assert!(BLANK_STDDEV < 255.0);
    }

    #[test]
    fn batch_limit_positive() {
        const {
            assert!(BATCH_LIMIT > 0);
            assert!(SEARCH_PAGE_SIZE > 0);
        }
    }
}
