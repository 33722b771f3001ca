//! Typed model of one MODS record.
//!
//! A [`NormalizedDocument`] is built once per visited entity by the
//! crosswalk, extended by the annotator and linker, then rendered. Optional
//! MODS sections are `Option`/`Vec` fields rather than loose maps, so an
//! absent section is always an explicit choice of the builder.

use super::vocab::ResourceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleKind {
    Primary,
    Alternative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    pub kind: TitleKind,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Personal,
    Corporate,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameKind::Personal => "personal",
            NameKind::Corporate => "corporate",
        }
    }
}

/// A `<name>` entry. Subject names are rendered inside `<subject>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub kind: NameKind,
    pub name_part: String,
    pub role: Option<String>,
    /// `true` when the name is what the record is *about*, not who made it.
    pub subject: bool,
}

impl NameEntry {
    pub fn with_role(kind: NameKind, name_part: &str, role: &str) -> Self {
        Self {
            kind,
            name_part: name_part.to_string(),
            role: Some(role.to_string()),
            subject: false,
        }
    }

    pub fn subject(kind: NameKind, name_part: &str) -> Self {
        Self {
            kind,
            name_part: name_part.to_string(),
            role: None,
            subject: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginInfo {
    /// Copied verbatim from the source; encoded as W3CDTF and marked key date.
    pub date_created: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Rendered as the `type` attribute.
    pub kind: String,
    pub text: String,
}

impl Note {
    pub fn typed(kind: &str, text: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Topic(String),
    Geographic(String),
    Temporal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: &str, value: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationUrl {
    pub url: String,
    pub usage: Option<String>,
    pub access: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCondition {
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedType {
    Host,
    Constituent,
}

impl RelatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedType::Host => "host",
            RelatedType::Constituent => "constituent",
        }
    }
}

/// A `<relatedItem>` cross-reference to a parent, child, or attached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedItem {
    pub relation: RelatedType,
    pub display_label: String,
    pub title: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub url: Option<String>,
    pub physical_form: Option<String>,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub content_source: String,
    pub creation_date: String,
    pub record_identifier: String,
    pub origin: String,
    pub description_standard: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub titles: Vec<TitleInfo>,
    pub names: Vec<NameEntry>,
    pub resource_type: Option<ResourceType>,
    pub origin: Option<OriginInfo>,
    pub language: Option<String>,
    pub abstract_text: Option<String>,
    pub notes: Vec<Note>,
    pub subjects: Vec<Subject>,
    pub identifiers: Vec<Identifier>,
    pub location: Vec<LocationUrl>,
    pub access_conditions: Vec<AccessCondition>,
    pub related_items: Vec<RelatedItem>,
    pub record_info: RecordInfo,
}

impl NormalizedDocument {
    /// Creator and repository names, excluding subject names.
    pub fn creator_names(&self) -> impl Iterator<Item = &NameEntry> {
        self.names.iter().filter(|n| !n.subject)
    }

    pub fn subject_names(&self) -> impl Iterator<Item = &NameEntry> {
        self.names.iter().filter(|n| n.subject)
    }
}
