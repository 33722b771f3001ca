//! Serialize a [`NormalizedDocument`] to a `<mods>` XML fragment.
//!
//! Fragments carry no namespace declarations; they inherit them from the
//! `<modsCollection>` wrapper emitted by [`crate::writer::CollectionWriter`].

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::document::*;
use crate::text::xml_safe;

pub const MODS_VERSION: &str = "3.8";

/// Thin wrapper so every element helper shares one error type.
struct Xml {
    writer: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let values: Vec<_> = attrs.iter().map(|(_, v)| xml_safe(v)).collect();
        let el = BytesStart::new(name).with_attributes(
            attrs
                .iter()
                .zip(&values)
                .map(|((k, _), v)| (*k, &**v)),
        );
        self.writer.write_event(Event::Start(el))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text_el(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attrs)?;
        self.writer.write_event(Event::Text(BytesText::new(&xml_safe(text))))?;
        self.end(name)
    }

    fn into_string(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

/// Render one record. The result starts with `<mods` and ends with `</mods>`.
pub fn render(doc: &NormalizedDocument) -> Result<String> {
    let mut x = Xml::new();
    x.start("mods", &[("version", MODS_VERSION)])?;

    for t in &doc.titles {
        match t.kind {
            TitleKind::Primary => x.start("titleInfo", &[])?,
            TitleKind::Alternative => x.start("titleInfo", &[("type", "alternative")])?,
        }
        x.text_el("title", &[], &t.title)?;
        x.end("titleInfo")?;
    }

    for n in doc.creator_names() {
        name(&mut x, n)?;
    }

    if let Some(rt) = doc.resource_type {
        x.text_el("typeOfResource", &[], rt.as_str())?;
    }

    if let Some(origin) = &doc.origin {
        x.start("originInfo", &[])?;
        x.text_el(
            "dateCreated",
            &[("encoding", "w3cdtf"), ("keyDate", "yes")],
            &origin.date_created,
        )?;
        x.end("originInfo")?;
    }

    if let Some(lang) = &doc.language {
        x.start("language", &[])?;
        x.text_el(
            "languageTerm",
            &[("type", "code"), ("authority", "iso639-2b")],
            lang,
        )?;
        x.end("language")?;
    }

    if let Some(abs) = &doc.abstract_text {
        x.text_el("abstract", &[], abs)?;
    }

    for n in &doc.notes {
        note(&mut x, n)?;
    }

    for s in &doc.subjects {
        x.start("subject", &[])?;
        match s {
            Subject::Topic(t) => x.text_el("topic", &[], t)?,
            Subject::Geographic(g) => x.text_el("geographic", &[], g)?,
            Subject::Temporal(t) => x.text_el("temporal", &[], t)?,
        }
        x.end("subject")?;
    }
    for n in doc.subject_names() {
        x.start("subject", &[])?;
        name(&mut x, n)?;
        x.end("subject")?;
    }

    for id in &doc.identifiers {
        x.text_el("identifier", &[("type", &id.kind)], &id.value)?;
    }

    if !doc.location.is_empty() {
        x.start("location", &[])?;
        for loc in &doc.location {
            let mut attrs: Vec<(&str, &str)> = Vec::new();
            if let Some(u) = &loc.usage {
                attrs.push(("usage", u));
            }
            if let Some(a) = &loc.access {
                attrs.push(("access", a));
            }
            if let Some(n) = &loc.note {
                attrs.push(("note", n));
            }
            x.text_el("url", &attrs, &loc.url)?;
        }
        x.end("location")?;
    }

    for ac in &doc.access_conditions {
        x.text_el("accessCondition", &[("type", &ac.kind)], &ac.text)?;
    }

    for item in &doc.related_items {
        related_item(&mut x, item)?;
    }

    let ri = &doc.record_info;
    x.start("recordInfo", &[])?;
    x.text_el("recordContentSource", &[], &ri.content_source)?;
    x.text_el("recordCreationDate", &[("encoding", "w3cdtf")], &ri.creation_date)?;
    x.text_el("recordIdentifier", &[], &ri.record_identifier)?;
    x.text_el("recordOrigin", &[], &ri.origin)?;
    x.text_el("descriptionStandard", &[], &ri.description_standard)?;
    x.end("recordInfo")?;

    x.end("mods")?;
    x.into_string()
}

fn name(x: &mut Xml, n: &NameEntry) -> Result<()> {
    x.start("name", &[("type", n.kind.as_str())])?;
    x.text_el("namePart", &[], &n.name_part)?;
    if let Some(role) = &n.role {
        x.start("role", &[])?;
        x.text_el("roleTerm", &[("type", "text")], role)?;
        x.end("role")?;
    }
    x.end("name")
}

fn note(x: &mut Xml, n: &Note) -> Result<()> {
    x.text_el("note", &[("type", &n.kind)], &n.text)
}

fn related_item(x: &mut Xml, item: &RelatedItem) -> Result<()> {
    x.start(
        "relatedItem",
        &[
            ("type", item.relation.as_str()),
            ("displayLabel", &item.display_label),
        ],
    )?;
    if let Some(title) = &item.title {
        x.start("titleInfo", &[])?;
        x.text_el("title", &[], title)?;
        x.end("titleInfo")?;
    }
    if let Some(form) = &item.physical_form {
        x.start("physicalDescription", &[])?;
        x.text_el("internetMediaType", &[], form)?;
        x.end("physicalDescription")?;
    }
    for n in &item.notes {
        note(x, n)?;
    }
    for id in &item.identifiers {
        x.text_el("identifier", &[("type", &id.kind)], &id.value)?;
    }
    if let Some(url) = &item.url {
        x.start("location", &[])?;
        x.text_el("url", &[], url)?;
        x.end("location")?;
    }
    x.end("relatedItem")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::crosswalk::{crosswalk, CrosswalkContext};
    use crate::models::EntityManifest;
    use chrono::Utc;

    fn ctx() -> CrosswalkContext {
        CrosswalkContext {
            institution: "Lib & Co".to_string(),
            view_base_url: "https://view.test".to_string(),
            store_base_url: "https://store.test".to_string(),
            long_text_limit: 100,
            exported_at: Utc::now(),
        }
    }

    fn manifest() -> EntityManifest {
        serde_json::from_str(r#"{"pi":"01R","ver":2,"manifest_cid":"bafyM","ts":"2025-01-01T00:00:00Z"}"#)
            .unwrap()
    }

    #[test]
    fn renders_escaped_fragment() {
        let record = serde_json::from_str(
            r#"{"title":"Fish <&> Chips","creator":"Ada","type":"Sound","subjects":["Food"]}"#,
        )
        .unwrap();
        let doc = crosswalk(Some(&record), &manifest(), None, &ctx());
        let xml = render(&doc).unwrap();
        assert!(xml.starts_with("<mods version=\"3.8\">"));
        assert!(xml.trim_end().ends_with("</mods>"));
        assert!(xml.contains("Fish &lt;&amp;&gt; Chips"));
        assert!(xml.contains("<typeOfResource>sound recording</typeOfResource>"));
        assert!(xml.contains("<recordContentSource>Lib &amp; Co</recordContentSource>"));
        assert!(xml.contains("<roleTerm type=\"text\">creator</roleTerm>"));
        assert!(xml.contains("<note type=\"version\">"));
    }

    #[test]
    fn subject_names_render_inside_subject() {
        let mut doc = crosswalk(None, &manifest(), None, &ctx());
        doc.names.push(NameEntry::subject(NameKind::Personal, "Grace Hopper"));
        let xml = render(&doc).unwrap();
        let subject_at = xml.find("<subject>").unwrap();
        let name_at = xml.find("Grace Hopper").unwrap();
        assert!(subject_at < name_at);
    }

    #[test]
    fn degraded_document_renders() {
        let doc = crosswalk(None, &manifest(), None, &ctx());
        let xml = render(&doc).unwrap();
        assert!(xml.contains("<titleInfo type=\"alternative\">"));
        assert!(xml.contains("Incomplete record: 01R"));
        assert!(xml.contains("<recordOrigin>Generated via graceful degradation"));
    }

    #[test]
    fn form_feed_in_title_is_not_emitted() {
        let record = serde_json::from_str(
            r#"{"title":"Page one\fPage two","description":"bell\u0007 here"}"#,
        )
        .unwrap();
        let mut doc = crosswalk(Some(&record), &manifest(), None, &ctx());
        doc.location[0].note = Some("tab\u{0B}note".to_string());
        let xml = render(&doc).unwrap();
        assert!(xml.contains("<title>Page one Page two</title>"));
        assert!(xml.contains("bell here"));
        assert!(xml.contains("note=\"tab note\""));
        assert!(!xml.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')));
    }
}
