//! Amendments: timestamped, domain-scoped pre/post patches to a sample

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::{Attribute, ExternalReference, Relationship};
use crate::error::{BioSamplesError, Result};
use crate::hash::ContentHasher;

/// What an amendment does to the entry it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOperation {
    /// pre absent, post present
    Addition,
    /// pre present, post absent
    Deletion,
    /// both present
    Replacement,
    /// neither present; only reachable through deserialization
    Empty,
}

impl PatchOperation {
    fn of<T>(pre: &Option<T>, post: &Option<T>) -> Self {
        match (pre, post) {
            (None, Some(_)) => PatchOperation::Addition,
            (Some(_), None) => PatchOperation::Deletion,
            (Some(_), Some(_)) => PatchOperation::Replacement,
            (None, None) => PatchOperation::Empty,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOperation::Addition => "addition",
            PatchOperation::Deletion => "deletion",
            PatchOperation::Replacement => "replacement",
            PatchOperation::Empty => "empty",
        }
    }
}

/// A pre-image/post-image pair over one kind of sample entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum Patch {
    Attribute {
        #[serde(default)]
        pre: Option<Attribute>,
        #[serde(default)]
        post: Option<Attribute>,
    },
    ExternalReference {
        #[serde(default)]
        pre: Option<ExternalReference>,
        #[serde(default)]
        post: Option<ExternalReference>,
    },
    Relationship {
        #[serde(default)]
        pre: Option<Relationship>,
        #[serde(default)]
        post: Option<Relationship>,
    },
}

impl Patch {
    pub fn attribute(pre: Option<Attribute>, post: Option<Attribute>) -> Result<Self> {
        Self::Attribute { pre, post }.validated()
    }

    pub fn external_reference(
        pre: Option<ExternalReference>,
        post: Option<ExternalReference>,
    ) -> Result<Self> {
        Self::ExternalReference { pre, post }.validated()
    }

    pub fn relationship(pre: Option<Relationship>, post: Option<Relationship>) -> Result<Self> {
        Self::Relationship { pre, post }.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.operation() == PatchOperation::Empty {
            return Err(BioSamplesError::InvalidAmendment(
                "must specify a pre and/or post image".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn operation(&self) -> PatchOperation {
        match self {
            Patch::Attribute { pre, post } => PatchOperation::of(pre, post),
            Patch::ExternalReference { pre, post } => PatchOperation::of(pre, post),
            Patch::Relationship { pre, post } => PatchOperation::of(pre, post),
        }
    }

    fn hash_into(&self, hasher: &mut ContentHasher) {
        match self {
            Patch::Attribute { pre, post } => {
                hasher.field("attribute");
                for image in [pre, post] {
                    match image {
                        Some(a) => hasher
                            .optional(Some(&a.attribute_type))
                            .field(&a.value)
                            .optional(a.unit.as_deref())
                            .optional(a.iri.as_deref()),
                        None => hasher.optional(None),
                    };
                }
            },
            Patch::ExternalReference { pre, post } => {
                hasher.field("externalReference");
                for image in [pre, post] {
                    match image {
                        Some(r) => {
                            hasher.optional(Some(&r.url));
                            hasher.field(&r.duo.len().to_string());
                            for code in &r.duo {
                                hasher.field(code);
                            }
                        },
                        None => {
                            hasher.optional(None);
                        },
                    }
                }
            },
            Patch::Relationship { pre, post } => {
                hasher.field("relationship");
                for image in [pre, post] {
                    match image {
                        Some(r) => hasher
                            .optional(Some(&r.source))
                            .field(&r.relationship_type)
                            .field(&r.target),
                        None => hasher.optional(None),
                    };
                }
            },
        }
    }
}

/// A patch owned by a curation domain, created at a point in time.
///
/// Amendments are immutable once created. For one sample they are totally
/// ordered by `created`, then by content hash, then by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amendment {
    /// Accession of the sample this amendment belongs to
    pub sample: String,
    pub patch: Patch,
    pub domain: String,
    pub created: DateTime<Utc>,
}

impl Amendment {
    pub fn new(
        sample: impl Into<String>,
        patch: Patch,
        domain: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            sample: sample.into(),
            patch,
            domain: domain.into(),
            created,
        }
    }

    /// SHA-256 over the patch content only; the same edit made by two
    /// domains hashes identically.
    pub fn content_hash(&self) -> String {
        let mut hasher = ContentHasher::new();
        self.patch.hash_into(&mut hasher);
        hasher.finish()
    }

    pub fn operation(&self) -> PatchOperation {
        self.patch.operation()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch_rejected() {
        assert!(Patch::attribute(None, None).is_err());
        assert!(Patch::external_reference(None, None).is_err());
        assert!(Patch::relationship(None, None).is_err());
    }

    #[test]
    fn test_patch_operation() {
        let a = Attribute::new("Organism", "9606");
        let b = Attribute::new("Organism", "Homo sapiens");
        assert_eq!(
            Patch::attribute(None, Some(a.clone())).unwrap().operation(),
            PatchOperation::Addition
        );
        assert_eq!(
            Patch::attribute(Some(a.clone()), None).unwrap().operation(),
            PatchOperation::Deletion
        );
        assert_eq!(
            Patch::attribute(Some(a), Some(b)).unwrap().operation(),
            PatchOperation::Replacement
        );
    }

    #[test]
    fn test_content_hash_ignores_domain_and_time() {
        let patch = Patch::attribute(None, Some(Attribute::new("Sex", "female"))).unwrap();
        let first = Amendment::new("SAMEA1", patch.clone(), "self.domainA", Utc::now());
        let second = Amendment::new(
            "SAMEA1",
            patch,
            "self.domainB",
            Utc::now() + chrono::Duration::seconds(30),
        );
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[test]
    fn test_content_hash_separates_pre_and_post() {
        let a = Attribute::new("Sex", "female");
        let add = Patch::attribute(None, Some(a.clone())).unwrap();
        let delete = Patch::attribute(Some(a), None).unwrap();
        let now = Utc::now();
        assert_ne!(
            Amendment::new("SAMEA1", add, "d", now).content_hash(),
            Amendment::new("SAMEA1", delete, "d", now).content_hash()
        );
    }

    #[test]
    fn test_amendment_json_shape() {
        let patch = Patch::external_reference(
            Some(ExternalReference::new("https://example.org/1")),
            Some(ExternalReference::new("https://example.org/2").with_duo("DUO:0000005")),
        )
        .unwrap();
        let amendment = Amendment::new("SAMEA1", patch, "self.curation", Utc::now());

        let json = serde_json::to_value(&amendment).unwrap();
        assert_eq!(json["patch"]["target"], "externalReference");
        assert_eq!(json["patch"]["post"]["duo"][0], "DUO:0000005");

        let back: Amendment = serde_json::from_value(json).unwrap();
        assert_eq!(back, amendment);
    }
}
