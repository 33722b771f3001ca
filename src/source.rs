//! Source-side records read from entity components.
//!
//! Three component payloads are parsed here: the primary descriptive metadata
//! (`metadata.json`), the optional relationship graph (`graph.json` or the
//! graph database), and referenced-file descriptors (`*.ref.json`).

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::RetrievalError;

/// A field that may be published either as a single string or a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OneOrMany(pub Vec<String>);

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => OneOrMany(Vec::new()),
            Some(Raw::One(s)) => OneOrMany(vec![s]),
            Some(Raw::Many(v)) => OneOrMany(v),
        })
    }
}

impl OneOrMany {
    /// Non-empty, trimmed values in source order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}

/// Primary descriptive metadata for one entity (Dublin Core flavoured).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SourceMetadataRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub creator: OneOrMany,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default, alias = "date")]
    pub created: Option<String>,
    #[serde(default)]
    pub rights: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "subject")]
    pub subjects: OneOrMany,
    #[serde(default, alias = "place", alias = "coverage")]
    pub places: OneOrMany,
    #[serde(default)]
    pub identifier: Option<String>,
    /// Canonical access URI; may hold [`ACCESS_URL_PLACEHOLDER`].
    #[serde(default)]
    pub access_url: Option<String>,
    #[serde(default, alias = "provenance")]
    pub source: Option<String>,
}

/// Value publishers put in `access_url` when the URI should be generated.
pub const ACCESS_URL_PLACEHOLDER: &str = "PLACEHOLDER";

impl SourceMetadataRecord {
    pub fn parse(bytes: &[u8], what: &str) -> Result<Self, RetrievalError> {
        serde_json::from_slice(bytes).map_err(|e| RetrievalError::malformed(what, e))
    }
}

/// One typed entity in a relationship graph.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphEntity {
    pub code: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

/// A directed, typed relation between two graph entities (by code).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "predicate")]
    pub relation_type: String,
}

/// Auxiliary graph of entities and relations scoped to one source entity.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RelationshipGraph {
    #[serde(default)]
    pub entities: Vec<GraphEntity>,
    #[serde(default, alias = "relations")]
    pub relationships: Vec<GraphRelation>,
}

impl RelationshipGraph {
    pub fn parse(bytes: &[u8], what: &str) -> Result<Self, RetrievalError> {
        serde_json::from_slice(bytes).map_err(|e| RetrievalError::malformed(what, e))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn entity(&self, code: &str) -> Option<&GraphEntity> {
        self.entities.iter().find(|e| e.code == code)
    }

    /// Union of two graphs. Entities already present (by code) keep the
    /// first definition; relations are de-duplicated.
    pub fn merge(mut self, other: RelationshipGraph) -> RelationshipGraph {
        for entity in other.entities {
            if self.entity(&entity.code).is_none() {
                self.entities.push(entity);
            }
        }
        for rel in other.relationships {
            if !self.relationships.contains(&rel) {
                self.relationships.push(rel);
            }
        }
        self
    }
}

/// Descriptor of a file referenced by an entity (`*.ref.json`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RefDescriptor {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub ocr: Option<String>,
}

impl RefDescriptor {
    pub fn parse(bytes: &[u8], what: &str) -> Result<Self, RetrievalError> {
        serde_json::from_slice(bytes).map_err(|e| RetrievalError::malformed(what, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_accepts_string_or_list() {
        let one: SourceMetadataRecord =
            serde_json::from_str(r#"{"title":"T","creator":"Ada"}"#).unwrap();
        assert_eq!(one.creator.0, vec!["Ada"]);

        let many: SourceMetadataRecord =
            serde_json::from_str(r#"{"creator":["Ada","  ","Grace"]}"#).unwrap();
        assert_eq!(many.creator.values().collect::<Vec<_>>(), vec!["Ada", "Grace"]);

        let none: SourceMetadataRecord = serde_json::from_str(r#"{"creator":null}"#).unwrap();
        assert!(none.creator.0.is_empty());
    }

    #[test]
    fn aliases_accepted() {
        let r: SourceMetadataRecord = serde_json::from_str(
            r#"{"date":"1901","subject":"Maps","coverage":["Ohio"],"provenance":"Gift"}"#,
        )
        .unwrap();
        assert_eq!(r.created.as_deref(), Some("1901"));
        assert_eq!(r.subjects.0, vec!["Maps"]);
        assert_eq!(r.places.0, vec!["Ohio"]);
        assert_eq!(r.source.as_deref(), Some("Gift"));
    }

    #[test]
    fn malformed_metadata_is_retrieval_error() {
        let err = SourceMetadataRecord::parse(b"{not json", "metadata.json").unwrap_err();
        assert!(matches!(err, RetrievalError::Malformed { .. }));
    }

    #[test]
    fn graph_merge_keeps_first_definition() {
        let a: RelationshipGraph = serde_json::from_str(
            r#"{"entities":[{"code":"p1","type":"person","label":"Ada"}],
                "relationships":[{"source":"p1","target":"p2","type":"knows"}]}"#,
        )
        .unwrap();
        let b: RelationshipGraph = serde_json::from_str(
            r#"{"entities":[{"code":"p1","type":"person","label":"Other"},
                            {"code":"p2","type":"person","label":"Grace"}],
                "relations":[{"source":"p1","target":"p2","predicate":"knows"}]}"#,
        )
        .unwrap();
        let merged = a.merge(b);
        assert_eq!(merged.entities.len(), 2);
        assert_eq!(merged.entity("p1").unwrap().label.as_deref(), Some("Ada"));
        assert_eq!(merged.relationships.len(), 1);
    }
}
