//! Concrete pipelines built on the runner

pub mod accession;
pub mod curated_view;
pub mod source;

pub use accession::{register_existing, AccessionTask};
pub use curated_view::CuratedViewTask;
pub use source::{AmendmentSource, InMemoryAmendmentSource, JsonLines};
