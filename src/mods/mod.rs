//! MODS target schema: document model, crosswalk, graph annotation,
//! cross-reference linking, and XML rendering.
//!
//! ```text
//! metadata.json ──▶ crosswalk ──▶ NormalizedDocument ──▶ render ──▶ <mods> fragment
//!                                   ▲            ▲
//!                     graph ──▶ annotate      link ◀── manifest + *.ref.json
//! ```

pub mod annotate;
pub mod crosswalk;
pub mod document;
pub mod link;
pub mod render;
pub mod vocab;

pub use annotate::{annotate, AnnotationMode, Annotations};
pub use crosswalk::{crosswalk, CrosswalkContext};
pub use document::NormalizedDocument;
pub use link::{link, ComponentFilter, LinkOptions};
pub use render::render;

impl NormalizedDocument {
    /// Fold graph annotations into the document.
    pub fn apply_annotations(&mut self, annotations: Annotations) {
        self.subjects.extend(annotations.subjects);
        self.names.extend(annotations.names);
        self.notes.extend(annotations.notes);
    }
}
