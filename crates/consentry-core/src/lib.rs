//! # consentry-core
//!
//! Core types, errors, and shared constants for the consentry pipeline.
//!
//! This crate provides the foundational data structures that the other
//! consentry crates depend on.

pub mod defaults;
pub mod error;
pub mod locator;
pub mod logging;
pub mod models;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use locator::{key_identifiers, StorageLocator};
pub use models::*;
