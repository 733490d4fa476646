//! Domain types shared by every BioSamples pipeline

pub mod amendment;
pub mod sample;

pub use amendment::{Amendment, Patch, PatchOperation};
pub use sample::{Attribute, ExternalReference, Relationship, Sample};
