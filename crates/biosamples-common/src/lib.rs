//! BioSamples Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the BioSamples pipelines.
//!
//! # Overview
//!
//! - **Types**: samples, their attributes, external references and
//!   relationships, and the amendments curators apply to them
//! - **Hashing**: stable content hashes for amendments
//! - **Error Handling**: common error and result types
//! - **Logging**: tracing bootstrap shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use biosamples_common::types::{Amendment, Attribute, Patch};
//! use chrono::Utc;
//!
//! fn curate() -> biosamples_common::Result<Amendment> {
//!     let patch = Patch::attribute(
//!         Some(Attribute::new("Organism", "9606")),
//!         Some(Attribute::new("Organism", "Homo sapiens")),
//!     )?;
//!     Ok(Amendment::new("SAMEA1", patch, "self.BiosampleCuration", Utc::now()))
//! }
//! ```

pub mod error;
pub mod hash;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BioSamplesError, Result};
