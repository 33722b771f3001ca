//! Source metadata → MODS crosswalk.
//!
//! [`crosswalk`] is a pure function of its inputs: the same record, manifest,
//! description, and context always produce the same document. When the
//! primary metadata record is absent it produces the degraded
//! "incomplete record" document instead of failing.

use chrono::{DateTime, SecondsFormat, Utc};

use super::document::*;
use super::vocab::{language_code, ResourceType};
use crate::models::{EntityManifest, METADATA_COMPONENT};
use crate::source::{SourceMetadataRecord, ACCESS_URL_PLACEHOLDER};
use crate::text::{non_empty, normalize_whitespace, truncate_at_word};

/// Description standard cited in every record's `recordInfo`.
pub const DESCRIPTION_STANDARD: &str = "dacs";

/// Fixed inputs that are the same for every entity in one export job.
#[derive(Debug, Clone)]
pub struct CrosswalkContext {
    pub institution: String,
    pub view_base_url: String,
    pub store_base_url: String,
    /// Long-form text is truncated at this many characters.
    pub long_text_limit: usize,
    pub exported_at: DateTime<Utc>,
}

impl CrosswalkContext {
    pub fn view_url(&self, pi: &str) -> String {
        format!("{}/{}", self.view_base_url.trim_end_matches('/'), pi)
    }

    /// Retrieval URL for any content fingerprint, including manifests.
    pub fn content_url(&self, cid: &str) -> String {
        format!("{}/cat/{}", self.store_base_url.trim_end_matches('/'), cid)
    }

    fn exported_at_str(&self) -> String {
        self.exported_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Map one entity into a [`NormalizedDocument`].
///
/// `description` is the separate long-form description component, if any.
pub fn crosswalk(
    record: Option<&SourceMetadataRecord>,
    manifest: &EntityManifest,
    description: Option<&str>,
    ctx: &CrosswalkContext,
) -> NormalizedDocument {
    match record {
        Some(record) => full_document(record, manifest, description, ctx),
        None => degraded_document(manifest, ctx),
    }
}

fn full_document(
    record: &SourceMetadataRecord,
    manifest: &EntityManifest,
    description: Option<&str>,
    ctx: &CrosswalkContext,
) -> NormalizedDocument {
    let abstract_text = non_empty(record.description.as_deref()).map(str::to_string);

    NormalizedDocument {
        titles: vec![title_info(record)],
        names: names(record),
        resource_type: Some(
            non_empty(record.resource_type.as_deref())
                .map(ResourceType::from_dcmi)
                .unwrap_or(ResourceType::Text),
        ),
        origin: non_empty(record.created.as_deref()).map(|d| OriginInfo {
            date_created: d.to_string(),
        }),
        language: non_empty(record.language.as_deref()).map(language_code),
        notes: notes(record, manifest, abstract_text.as_deref(), description, ctx),
        abstract_text,
        subjects: subjects(record),
        identifiers: identifiers(record, manifest, ctx),
        location: location(manifest, ctx),
        access_conditions: non_empty(record.rights.as_deref())
            .map(|r| AccessCondition {
                kind: "use and reproduction".to_string(),
                text: r.to_string(),
            })
            .into_iter()
            .collect(),
        related_items: Vec::new(),
        record_info: RecordInfo {
            content_source: ctx.institution.clone(),
            creation_date: manifest.ts.clone(),
            record_identifier: manifest.pi.clone(),
            origin: format!(
                "Converted from {} (manifest version {}) by mods-export",
                METADATA_COMPONENT, manifest.ver
            ),
            description_standard: DESCRIPTION_STANDARD.to_string(),
        },
    }
}

fn title_info(record: &SourceMetadataRecord) -> TitleInfo {
    TitleInfo {
        kind: TitleKind::Primary,
        title: non_empty(record.title.as_deref())
            .unwrap_or("[Untitled]")
            .to_string(),
    }
}

fn names(record: &SourceMetadataRecord) -> Vec<NameEntry> {
    let mut names: Vec<NameEntry> = record
        .creator
        .values()
        .map(|c| NameEntry::with_role(NameKind::Personal, c, "creator"))
        .collect();
    if let Some(institution) = non_empty(record.institution.as_deref()) {
        names.push(NameEntry::with_role(
            NameKind::Corporate,
            institution,
            "repository",
        ));
    }
    names
}

fn subjects(record: &SourceMetadataRecord) -> Vec<Subject> {
    let topics = record.subjects.values().map(|s| Subject::Topic(s.to_string()));
    let places = record
        .places
        .values()
        .map(|p| Subject::Geographic(p.to_string()));
    topics.chain(places).collect()
}

fn identifiers(
    record: &SourceMetadataRecord,
    manifest: &EntityManifest,
    ctx: &CrosswalkContext,
) -> Vec<Identifier> {
    let local = non_empty(record.identifier.as_deref()).unwrap_or(manifest.pi.as_str());
    let uri = match non_empty(record.access_url.as_deref()) {
        Some(url) if url != ACCESS_URL_PLACEHOLDER => url.to_string(),
        _ => ctx.view_url(&manifest.pi),
    };
    vec![
        Identifier::new("local", local),
        Identifier::new("pi", manifest.pi.clone()),
        Identifier::new("uri", uri),
    ]
}

fn location(manifest: &EntityManifest, ctx: &CrosswalkContext) -> Vec<LocationUrl> {
    vec![
        LocationUrl {
            url: ctx.view_url(&manifest.pi),
            usage: Some("primary display".to_string()),
            access: Some("object in context".to_string()),
            note: Some("view".to_string()),
        },
        LocationUrl {
            url: ctx.content_url(&manifest.manifest_cid),
            usage: None,
            access: Some("raw object".to_string()),
            note: Some("manifest".to_string()),
        },
    ]
}

fn notes(
    record: &SourceMetadataRecord,
    manifest: &EntityManifest,
    abstract_text: Option<&str>,
    description: Option<&str>,
    ctx: &CrosswalkContext,
) -> Vec<Note> {
    let mut notes = vec![Note::typed(
        "version",
        format!(
            "Version {} of {} (manifest {})",
            manifest.ver, manifest.pi, manifest.manifest_cid
        ),
    )];

    // Long description is only worth a note when it adds to the abstract.
    if let Some(long) = non_empty(description) {
        let same = abstract_text
            .map(|a| normalize_whitespace(a) == normalize_whitespace(long))
            .unwrap_or(false);
        if !same {
            notes.push(Note::typed(
                "content",
                truncate_at_word(long, ctx.long_text_limit),
            ));
        }
    }

    if let Some(source) = non_empty(record.source.as_deref()) {
        notes.push(Note::typed("source", source));
    }
    notes
}

fn degraded_document(manifest: &EntityManifest, ctx: &CrosswalkContext) -> NormalizedDocument {
    NormalizedDocument {
        titles: vec![TitleInfo {
            kind: TitleKind::Alternative,
            title: format!("Incomplete record: {}", manifest.pi),
        }],
        names: Vec::new(),
        resource_type: None,
        origin: None,
        language: None,
        abstract_text: None,
        notes: vec![
            Note::typed(
                "admin",
                format!(
                    "This record is incomplete: entity {} (manifest version {}) has no {} component.",
                    manifest.pi, manifest.ver, METADATA_COMPONENT
                ),
            ),
            Note::typed(
                "action",
                format!(
                    "Add a {} component with descriptive metadata to this entity and re-run the export.",
                    METADATA_COMPONENT
                ),
            ),
        ],
        subjects: Vec::new(),
        identifiers: vec![
            Identifier::new("pi", manifest.pi.clone()),
            Identifier::new("manifest-cid", manifest.manifest_cid.clone()),
        ],
        location: vec![LocationUrl {
            url: ctx.content_url(&manifest.manifest_cid),
            usage: None,
            access: Some("raw object".to_string()),
            note: Some("manifest".to_string()),
        }],
        access_conditions: Vec::new(),
        related_items: Vec::new(),
        record_info: RecordInfo {
            content_source: ctx.institution.clone(),
            creation_date: ctx.exported_at_str(),
            record_identifier: manifest.pi.clone(),
            origin: format!(
                "Generated via graceful degradation from manifest {} at export time",
                manifest.manifest_cid
            ),
            description_standard: DESCRIPTION_STANDARD.to_string(),
        },
    }
}
