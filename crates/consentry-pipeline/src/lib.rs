//! # consentry-pipeline
//!
//! Ingest orchestration for the consentry pipeline: blob store
//! backends, the per-attachment ingest state machine, patient linkage,
//! and the batch aggregator that turns ingest outcomes into review and
//! fault tickets.

pub mod batch;
pub mod blob;
pub mod ingest;
pub mod linker;

pub use batch::{markup_table, BatchAggregator, BatchConfig, BatchReport};
pub use blob::{BlobStore, FsBlobStore, S3BlobStore, S3Config, S3Credentials};
pub use ingest::{IngestOptions, IngestedAttachment, Ingestor};
pub use linker::PatientLinker;
