//! Accession allocation and the sample store it claims against

pub mod allocator;
pub mod store;

pub use allocator::{AccessionAllocator, AllocatorConfig};
pub use store::{InMemorySampleStore, InsertOutcome, SampleStore};
