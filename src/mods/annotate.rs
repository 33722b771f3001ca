//! Relationship-graph annotations.
//!
//! Turns the typed entities of a [`RelationshipGraph`] into subject, subject
//! name, and note entries. How much is emitted depends on [`AnnotationMode`]:
//!
//! | Entity type | `minimal` | `full` |
//! |-------------|-----------|--------|
//! | person / organization | subject name | subject name |
//! | place | geographic subject | geographic subject |
//! | concept | topical subject | topical subject |
//! | date | temporal subject | temporal subject |
//! | anything else | | topical subject, if labelled |
//! | scalar properties | | one note each |
//! | relations | | one note each, if both ends resolve |

use serde::Deserialize;
use serde_json::Value;

use super::document::{NameEntry, NameKind, Note, Subject};
use crate::source::{GraphEntity, RelationshipGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationMode {
    #[default]
    Full,
    Minimal,
    Skip,
}

/// Entries extracted from one graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub subjects: Vec<Subject>,
    pub names: Vec<NameEntry>,
    pub notes: Vec<Note>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.names.is_empty() && self.notes.is_empty()
    }
}

/// Property keys that may stand in for a missing entity label.
const LABEL_KEYS: &[&str] = &["label", "name"];

pub fn annotate(graph: &RelationshipGraph, mode: AnnotationMode) -> Annotations {
    let mut out = Annotations::default();
    if mode == AnnotationMode::Skip {
        return out;
    }

    for entity in &graph.entities {
        let (label, label_key) = display_label(entity);
        match entity.entity_type.to_ascii_lowercase().as_str() {
            "person" => out
                .names
                .push(NameEntry::subject(NameKind::Personal, &label)),
            "organization" => out
                .names
                .push(NameEntry::subject(NameKind::Corporate, &label)),
            "place" => out.subjects.push(Subject::Geographic(label.clone())),
            "concept" => out.subjects.push(Subject::Topic(label.clone())),
            "date" => out.subjects.push(Subject::Temporal(label.clone())),
            _ if mode == AnnotationMode::Full && label_key != LabelSource::Code => {
                out.subjects.push(Subject::Topic(label.clone()))
            }
            _ => {}
        }

        if mode == AnnotationMode::Full {
            for (key, value) in &entity.properties {
                if matches!(label_key, LabelSource::Property(k) if k == key) {
                    continue;
                }
                if let Some(text) = scalar_text(value, graph) {
                    out.notes
                        .push(Note::typed("graph", format!("{}: {}: {}", label, key, text)));
                }
            }
        }
    }

    if mode == AnnotationMode::Full {
        for rel in &graph.relationships {
            let (Some(source), Some(target)) = (graph.entity(&rel.source), graph.entity(&rel.target))
            else {
                continue;
            };
            out.notes.push(Note::typed(
                "relation",
                format!(
                    "{} → {} → {}",
                    display_label(source).0,
                    rel.relation_type,
                    display_label(target).0
                ),
            ));
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelSource<'a> {
    Label,
    Property(&'a str),
    Code,
}

/// The entity's label, falling back to a label-like property, then its code.
fn display_label(entity: &GraphEntity) -> (String, LabelSource<'_>) {
    if let Some(label) = entity.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        return (label.to_string(), LabelSource::Label);
    }
    for key in LABEL_KEYS {
        let found = entity.properties.iter().find(|(k, _)| k.as_str() == *key);
        if let Some((k, Value::String(s))) = found {
            if !s.trim().is_empty() {
                return (s.trim().to_string(), LabelSource::Property(k.as_str()));
            }
        }
    }
    (entity.code.clone(), LabelSource::Code)
}

/// Render a property value as note text, resolving one level of entity
/// references (`{"type": "entity_ref", "code": "..."}`).
fn scalar_text(value: &Value, graph: &RelationshipGraph) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("entity_ref") => {
            let code = obj.get("code").and_then(Value::as_str)?;
            Some(
                graph
                    .entity(code)
                    .map(|e| display_label(e).0)
                    .unwrap_or_else(|| code.to_string()),
            )
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> RelationshipGraph {
        serde_json::from_str(
            r#"{
              "entities": [
                {"code":"p1","type":"person","label":"Ada Lovelace",
                 "properties":{"born":{"type":"entity_ref","code":"d1"},
                               "mentor":{"type":"entity_ref","code":"zz"},
                               "letters":42,"tags":["x"]}},
                {"code":"o1","type":"Organization","properties":{"name":"Royal Society"}},
                {"code":"pl1","type":"place","label":"London"},
                {"code":"c1","type":"concept","label":"Computing"},
                {"code":"d1","type":"date","label":"1815"},
                {"code":"x1","type":"document","label":"Notes on the Engine"},
                {"code":"x2","type":"artifact"}
              ],
              "relationships": [
                {"source":"p1","target":"pl1","type":"lived_in"},
                {"source":"p1","target":"missing","type":"knows"}
              ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn skip_yields_nothing() {
        assert!(annotate(&graph(), AnnotationMode::Skip).is_empty());
    }

    #[test]
    fn minimal_maps_typed_entities_only() {
        let a = annotate(&graph(), AnnotationMode::Minimal);
        assert_eq!(a.names.len(), 2);
        assert!(a.names.iter().all(|n| n.subject));
        assert_eq!(a.names[1].name_part, "Royal Society");
        assert_eq!(a.names[1].kind, NameKind::Corporate);
        assert_eq!(
            a.subjects,
            vec![
                Subject::Geographic("London".to_string()),
                Subject::Topic("Computing".to_string()),
                Subject::Temporal("1815".to_string()),
            ]
        );
        assert!(a.notes.is_empty());
    }

    #[test]
    fn full_adds_other_labelled_entities() {
        let a = annotate(&graph(), AnnotationMode::Full);
        assert!(a
            .subjects
            .contains(&Subject::Topic("Notes on the Engine".to_string())));
        // Unlabelled entity of an unknown type is not emitted.
        assert!(!a.subjects.contains(&Subject::Topic("x2".to_string())));
    }

    #[test]
    fn full_property_notes_resolve_references() {
        let a = annotate(&graph(), AnnotationMode::Full);
        let texts: Vec<&str> = a
            .notes
            .iter()
            .filter(|n| n.kind == "graph")
            .map(|n| n.text.as_str())
            .collect();
        assert!(texts.contains(&"Ada Lovelace: born: 1815"));
        assert!(texts.contains(&"Ada Lovelace: mentor: zz"));
        assert!(texts.contains(&"Ada Lovelace: letters: 42"));
        // Arrays are not scalar; the label-source property is not repeated.
        assert!(!texts.iter().any(|t| t.contains("tags")));
        assert!(!texts.iter().any(|t| t.starts_with("Royal Society: name")));
    }

    #[test]
    fn relation_notes_need_both_ends() {
        let a = annotate(&graph(), AnnotationMode::Full);
        let relations: Vec<&str> = a
            .notes
            .iter()
            .filter(|n| n.kind == "relation")
            .map(|n| n.text.as_str())
            .collect();
        assert_eq!(relations, vec!["Ada Lovelace → lived_in → London"]);
    }
}
