//! Patch resolution: the curated view of a sample

pub mod resolver;

pub use resolver::{
    apply_patch, order_amendments, resolve, resolve_for_domains, resolve_with_changes,
    Resolution,
};
