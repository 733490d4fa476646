//! Sample records and the entries an amendment can touch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A typed key/value characteristic of a sample.
///
/// Equality is structural: two attributes are the same only when type, value,
/// unit and ontology IRI all match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
}

impl Attribute {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
            unit: None,
            iri: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_iri(mut self, iri: impl Into<String>) -> Self {
        self.iri = Some(iri.into());
        self
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.attribute_type, self.value)
    }
}

/// Link to a record held by another archive, with optional data-use tags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalReference {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub duo: BTreeSet<String>,
}

impl ExternalReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duo: BTreeSet::new(),
        }
    }

    pub fn with_duo(mut self, code: impl Into<String>) -> Self {
        self.duo.insert(code.into());
        self
    }
}

impl std::fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Directed, typed link between two samples.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Accession of the owning sample; empty until the sample is accessioned
    #[serde(default)]
    pub source: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub target: String,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        relationship_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            relationship_type: relationship_type.into(),
            target: target.into(),
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -{}-> {}", self.source, self.relationship_type, self.target)
    }
}

/// A biological sample record.
///
/// Samples are values: pipelines never mutate one in place, they build the
/// next state and hand it on. The accession is the identity; it is absent
/// only for samples that have not yet been through accessioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: BTreeSet<Attribute>,
    #[serde(default)]
    pub external_references: BTreeSet<ExternalReference>,
    #[serde(default)]
    pub relationships: BTreeSet<Relationship>,
}

impl Sample {
    pub fn new(name: impl Into<String>, update: DateTime<Utc>) -> Self {
        Self {
            accession: None,
            name: name.into(),
            domain: None,
            update,
            reviewed: None,
            attributes: BTreeSet::new(),
            external_references: BTreeSet::new(),
            relationships: BTreeSet::new(),
        }
    }

    pub fn with_accession(mut self, accession: impl Into<String>) -> Self {
        self.accession = Some(accession.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    pub fn with_external_reference(mut self, reference: ExternalReference) -> Self {
        self.external_references.insert(reference);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.insert(relationship);
        self
    }

    /// Identifier used to key pipeline work: the accession, or the name for
    /// samples that have not been accessioned yet.
    pub fn identifier(&self) -> &str {
        self.accession.as_deref().unwrap_or(&self.name)
    }

    /// All attributes of the given type, in sorted order.
    pub fn attributes_of_type<'a>(
        &'a self,
        attribute_type: &'a str,
    ) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.attributes
            .iter()
            .filter(move |a| a.attribute_type == attribute_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Sample {
        Sample::new("liver biopsy", Utc.with_ymd_and_hms(2024, 1, 18, 9, 0, 0).unwrap())
            .with_accession("SAMEA1")
            .with_attribute(Attribute::new("Organism", "9606"))
            .with_attribute(Attribute::new("Age", "42").with_unit("year"))
            .with_external_reference(ExternalReference::new("https://www.ebi.ac.uk/ena/ERS1"))
    }

    #[test]
    fn test_attribute_equality_is_structural() {
        let plain = Attribute::new("Organism", "Homo sapiens");
        let with_iri = Attribute::new("Organism", "Homo sapiens")
            .with_iri("http://purl.obolibrary.org/obo/NCBITaxon_9606");

        assert_ne!(plain, with_iri);
        assert_eq!(plain, Attribute::new("Organism", "Homo sapiens"));
    }

    #[test]
    fn test_identifier_falls_back_to_name() {
        let unaccessioned = Sample::new("draft", Utc::now());
        assert_eq!(unaccessioned.identifier(), "draft");
        assert_eq!(sample().identifier(), "SAMEA1");
    }

    #[test]
    fn test_attributes_of_type() {
        let s = sample().with_attribute(Attribute::new("Organism", "Homo sapiens"));
        let values: Vec<_> = s.attributes_of_type("Organism").map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["9606", "Homo sapiens"]);
    }

    #[test]
    fn test_sample_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["accession"], "SAMEA1");
        assert!(json.get("externalReferences").is_some());
        assert!(json.get("reviewed").is_none());
        assert_eq!(json["attributes"][0]["type"], "Age");
        assert_eq!(json["attributes"][0]["unit"], "year");

        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
