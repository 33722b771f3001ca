//! Cross-references to the parent entity, child entities, and attached files.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;

use super::crosswalk::CrosswalkContext;
use super::document::{Identifier, Note, RelatedItem, RelatedType};
use crate::models::{EntityManifest, REF_SUFFIX};
use crate::source::RefDescriptor;
use crate::text::{non_empty, truncate_at_word};

/// Which components become `relatedItem` entries, by glob on component name.
#[derive(Debug, Clone)]
pub struct ComponentFilter {
    set: GlobSet,
}

impl ComponentFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            set: build_globset(patterns)?,
        })
    }

    pub fn selects(&self, component: &str) -> bool {
        self.set.is_match(component)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub components: ComponentFilter,
    pub include_ocr: bool,
}

/// Build the `relatedItem` entries for one entity.
///
/// `descriptors` holds the parsed `*.ref.json` components that could be
/// fetched, keyed by component name. A selected descriptor component that is
/// missing from the map is still linked, by its content URL.
pub fn link(
    manifest: &EntityManifest,
    descriptors: &HashMap<String, RefDescriptor>,
    opts: &LinkOptions,
    ctx: &CrosswalkContext,
) -> Vec<RelatedItem> {
    let mut items = Vec::new();

    if let Some(parent) = non_empty(manifest.parent_pi.as_deref()) {
        items.push(entity_item(RelatedType::Host, "Parent entity", parent, ctx));
    }

    for (name, cid) in &manifest.components {
        if !opts.components.selects(name) {
            continue;
        }
        let item = match descriptors.get(name) {
            Some(desc) if name.ends_with(REF_SUFFIX) => descriptor_item(name, cid, desc, opts, ctx),
            _ => RelatedItem {
                relation: RelatedType::Constituent,
                display_label: "File".to_string(),
                title: Some(name.clone()),
                identifiers: vec![Identifier::new("cid", cid.clone())],
                url: Some(ctx.content_url(cid)),
                physical_form: None,
                notes: Vec::new(),
            },
        };
        items.push(item);
    }

    for child in manifest.children() {
        if let Some(child) = non_empty(Some(child)) {
            items.push(entity_item(RelatedType::Constituent, "Child entity", child, ctx));
        }
    }

    items
}

fn entity_item(relation: RelatedType, label: &str, pi: &str, ctx: &CrosswalkContext) -> RelatedItem {
    RelatedItem {
        relation,
        display_label: label.to_string(),
        title: None,
        identifiers: vec![Identifier::new("pi", pi)],
        url: Some(ctx.view_url(pi)),
        physical_form: None,
        notes: Vec::new(),
    }
}

fn descriptor_item(
    name: &str,
    cid: &str,
    desc: &RefDescriptor,
    opts: &LinkOptions,
    ctx: &CrosswalkContext,
) -> RelatedItem {
    let title = non_empty(desc.filename.as_deref())
        .unwrap_or_else(|| name.trim_end_matches(REF_SUFFIX))
        .to_string();
    let url = non_empty(desc.url.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| ctx.content_url(cid));

    let mut notes = Vec::new();
    if let Some(size) = desc.size {
        notes.push(Note::typed("size", crate::text::format_bytes(size)));
    }
    if opts.include_ocr {
        if let Some(ocr) = non_empty(desc.ocr.as_deref()) {
            notes.push(Note::typed("ocr", truncate_at_word(ocr, ctx.long_text_limit)));
        }
    }

    RelatedItem {
        relation: RelatedType::Constituent,
        display_label: "File".to_string(),
        title: Some(title),
        identifiers: vec![Identifier::new("cid", cid)],
        url: Some(url),
        physical_form: non_empty(desc.mime_type.as_deref()).map(str::to_string),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn ctx() -> CrosswalkContext {
        CrosswalkContext {
            institution: "Lib".to_string(),
            view_base_url: "https://view.test".to_string(),
            store_base_url: "https://store.test".to_string(),
            long_text_limit: 20,
            exported_at: Utc::now(),
        }
    }

    fn opts(include_ocr: bool) -> LinkOptions {
        LinkOptions {
            components: ComponentFilter::new(&["*.jpg".to_string(), "*.ref.json".to_string()])
                .unwrap(),
            include_ocr,
        }
    }

    fn manifest() -> EntityManifest {
        let mut components = BTreeMap::new();
        components.insert("metadata.json".to_string(), "bafyMeta".to_string());
        components.insert("page1.jpg".to_string(), "bafyJpg".to_string());
        components.insert("scan.ref.json".to_string(), "bafyRef".to_string());
        EntityManifest {
            pi: "01C".to_string(),
            ver: 1,
            manifest_cid: "bafyM".to_string(),
            ts: String::new(),
            components,
            parent_pi: Some("01P".to_string()),
            children_pi: Some(vec!["01K1".to_string(), "01K2".to_string()]),
        }
    }

    #[test]
    fn links_parent_files_and_children() {
        let items = link(&manifest(), &HashMap::new(), &opts(false), &ctx());
        let labels: Vec<(&str, &str)> = items
            .iter()
            .map(|i| (i.relation.as_str(), i.display_label.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("host", "Parent entity"),
                ("constituent", "File"),
                ("constituent", "File"),
                ("constituent", "Child entity"),
                ("constituent", "Child entity"),
            ]
        );
        assert_eq!(items[0].url.as_deref(), Some("https://view.test/01P"));
        assert_eq!(items[1].url.as_deref(), Some("https://store.test/cat/bafyJpg"));
        // metadata.json is not selected by the filter.
        assert!(!items
            .iter()
            .any(|i| i.title.as_deref() == Some("metadata.json")));
    }

    #[test]
    fn descriptor_supplies_title_url_and_ocr() {
        let mut descriptors = HashMap::new();
        descriptors.insert(
            "scan.ref.json".to_string(),
            RefDescriptor {
                url: Some("https://files.test/scan.tif".to_string()),
                filename: Some("scan.tif".to_string()),
                mime_type: Some("image/tiff".to_string()),
                size: Some(2048),
                ocr: Some("Lorem ipsum dolor sit amet consectetur".to_string()),
            },
        );
        let items = link(&manifest(), &descriptors, &opts(true), &ctx());
        let scan = items
            .iter()
            .find(|i| i.title.as_deref() == Some("scan.tif"))
            .unwrap();
        assert_eq!(scan.url.as_deref(), Some("https://files.test/scan.tif"));
        assert_eq!(scan.physical_form.as_deref(), Some("image/tiff"));
        let ocr = scan.notes.iter().find(|n| n.kind == "ocr").unwrap();
        assert!(ocr.text.ends_with(crate::text::TRUNCATION_MARKER));

        let items = link(&manifest(), &descriptors, &opts(false), &ctx());
        let scan = items
            .iter()
            .find(|i| i.title.as_deref() == Some("scan.tif"))
            .unwrap();
        assert!(scan.notes.iter().all(|n| n.kind != "ocr"));
    }

    #[test]
    fn bad_glob_is_rejected() {
        assert!(ComponentFilter::new(&["[".to_string()]).is_err());
    }
}
