//! # consentry-db
//!
//! PostgreSQL layer for the consentry pipeline.
//!
//! This crate provides:
//! - Connection pool management (tracking store and source store)
//! - The dedup ledger repositories (attachments, pages, errors, tickets)
//! - Read-only discovery and patient-identity queries against the
//!   upstream clinical record store
//! - Administrative schema build/drop for the tracking store
//!
//! ## Example
//!
//! ```rust,ignore
//! use consentry_db::{create_pool, PgAttachmentRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool("postgres://localhost/consentry").await?;
//!     let attachments = PgAttachmentRepository::new(pool);
//!
//!     let (tracked, inserted) = attachments
//!         .insert_if_absent(uuid::Uuid::new_v4(), "consent-forms", "some_key.pdf")
//!         .await?;
//!     println!("tracked {} (new: {})", tracked.id, inserted);
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod attachments;
pub mod pool;
pub mod source;
pub mod test_fixtures;
pub mod tickets;

pub use attachments::PgAttachmentRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use source::{PatientIdentity, PgSourceRepository};
pub use tickets::PgTicketRepository;
