//! Structured logging schema and field name constants for consentry.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools can query by standardized field names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, attachment routed to a fault ticket |
//! | INFO  | Run lifecycle, ticket creation, reconciliation summaries |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-page iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "render", "pipeline", "tracker", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "ingestor", "batch", "reconciler", "pool", "blob_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "ingest", "render", "create_issue", "reconcile"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tracked attachment UUID being operated on.
pub const ATTACHMENT_ID: &str = "attachment_id";

/// Source store UID of the attachment.
pub const SOURCE_UID: &str = "source_uid";

/// Local ticket UUID.
pub const TICKET_ID: &str = "ticket_id";

/// External issue key (e.g. "CONSENT-123").
pub const ISSUE_KEY: &str = "issue_key";

/// Object storage bucket.
pub const BUCKET: &str = "bucket";

/// Object storage key.
pub const OBJECT_KEY: &str = "object_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of pages rendered or exported.
pub const PAGE_COUNT: &str = "page_count";

/// Number of attachments processed in a run.
pub const ATTACHMENT_COUNT: &str = "attachment_count";

/// Number of tickets created or updated.
pub const TICKET_COUNT: &str = "ticket_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Processing error kind recorded against an attachment.
pub const ERROR_KIND: &str = "error_kind";
