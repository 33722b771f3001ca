//! Streaming `<modsCollection>` writer.
//!
//! The writer holds at most one record fragment at a time and pushes it
//! straight to a [`Sink`]. Every write awaits the sink, so a slow sink
//! suspends the producer instead of growing a buffer here: memory use is
//! constant in the number of records.
//!
//! ```text
//! open()   → <?xml ...?><modsCollection ...>
//! write()  → <mods ID="..."> ... <note type="hierarchy">...</note></mods>   (× N)
//! close()  → </modsCollection>
//! ```

use async_trait::async_trait;
use quick_xml::escape::escape;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::error::SinkError;
use crate::models::TraversalNode;
use crate::text::{estimate_bytes, xml_safe};

pub const COLLECTION_HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<modsCollection xmlns=\"http://www.loc.gov/mods/v3\" ",
    "xmlns:xlink=\"http://www.w3.org/1999/xlink\" ",
    "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
    "xsi:schemaLocation=\"http://www.loc.gov/mods/v3 http://www.loc.gov/standards/mods/v3/mods-3-8.xsd\">\n",
);

pub const COLLECTION_FOOTER: &str = "</modsCollection>\n";

/// Ordered byte sink with backpressure.
///
/// `write` must not return until the sink has accepted the bytes; a sink
/// that is not ready keeps the future pending.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    async fn close(&mut self) -> std::io::Result<()>;
    /// Human-readable location for the summary (e.g. a file path).
    fn location(&self) -> String;
}

/// [`Sink`] over any tokio [`AsyncWrite`]; backpressure comes from `poll_write`.
pub struct IoSink<W> {
    inner: W,
    location: String,
}

impl<W> IoSink<W> {
    pub fn new(inner: W, location: impl Into<String>) -> Self {
        Self {
            inner,
            location: location.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Sink for IoSink<W> {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes).await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

/// Create (or truncate) `path` as a buffered file sink, creating parent directories.
pub async fn file_sink(path: &Path) -> Result<IoSink<BufWriter<tokio::fs::File>>, SinkError> {
    let open_err = |source| SinkError::Open {
        location: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(open_err)?;
    }
    let file = tokio::fs::File::create(path).await.map_err(open_err)?;
    Ok(IoSink::new(BufWriter::new(file), path.display().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Pending,
    Open,
    Closed,
}

pub struct CollectionWriter<S> {
    sink: S,
    state: WriterState,
    records: u64,
    bytes: u64,
}

impl<S: Sink> CollectionWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: WriterState::Pending,
            records: 0,
            bytes: 0,
        }
    }

    /// Emit the XML declaration and the opening `<modsCollection>` tag.
    pub async fn open(&mut self) -> Result<(), SinkError> {
        if self.state != WriterState::Pending {
            return Ok(());
        }
        self.sink
            .write(COLLECTION_HEADER.as_bytes())
            .await
            .map_err(SinkError::Write)?;
        self.bytes += estimate_bytes(COLLECTION_HEADER);
        self.state = WriterState::Open;
        Ok(())
    }

    /// Append one rendered `<mods>` fragment, tagged with `record_id` and a
    /// hierarchy note describing `position`.
    pub async fn write(
        &mut self,
        record_id: &str,
        fragment: &str,
        position: &TraversalNode,
    ) -> Result<(), SinkError> {
        if self.state != WriterState::Open {
            return Err(SinkError::NotOpen);
        }
        let fragment = xml_safe(fragment);
        let mut record = inject_record_metadata(&fragment, record_id, &hierarchy_note(position));
        if !record.ends_with('\n') {
            record.push('\n');
        }
        self.sink
            .write(record.as_bytes())
            .await
            .map_err(SinkError::Write)?;
        self.records += 1;
        self.bytes += estimate_bytes(&record);
        Ok(())
    }

    /// Emit the footer and close the sink.
    ///
    /// Safe to call more than once, and after a failed [`open`](Self::open):
    /// the footer is only written when the header was.
    pub async fn close(&mut self) -> Result<(), SinkError> {
        match self.state {
            WriterState::Closed => Ok(()),
            WriterState::Pending => {
                self.state = WriterState::Closed;
                self.sink.close().await.map_err(SinkError::Close)
            }
            WriterState::Open => {
                self.state = WriterState::Closed;
                self.sink
                    .write(COLLECTION_FOOTER.as_bytes())
                    .await
                    .map_err(SinkError::Write)?;
                self.bytes += estimate_bytes(COLLECTION_FOOTER);
                self.sink.close().await.map_err(SinkError::Close)
            }
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn location(&self) -> String {
        self.sink.location()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// XML `ID` for an entity's record: `rec-` plus the identifier, with `_`
/// doubled and every other byte outside `[A-Za-z0-9.-]` written as `_XX`
/// hex. Distinct identifiers always give distinct IDs.
pub fn record_id_for(pi: &str) -> String {
    let mut id = String::with_capacity(pi.len() + 4);
    id.push_str("rec-");
    for &b in pi.as_bytes() {
        match b {
            b'_' => id.push_str("__"),
            b if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' => id.push(b as char),
            b => id.push_str(&format!("_{:02X}", b)),
        }
    }
    id
}

fn hierarchy_note(node: &TraversalNode) -> String {
    format!(
        "<note type=\"hierarchy\">Depth: {} | Parent: {} | Path: {}</note>",
        node.depth,
        escape(&*xml_safe(node.parent_pi.as_deref().unwrap_or("none"))),
        escape(&*xml_safe(&node.path.join(" > "))),
    )
}

/// Add `ID="..."` to the fragment's root element and insert `note` before
/// its closing tag. A self-closing root is expanded.
fn inject_record_metadata(fragment: &str, record_id: &str, note: &str) -> String {
    let fragment = fragment.trim();
    let id_attr = format!(" ID=\"{}\"", escape(record_id));

    let Some(tag_end) = fragment.find('>') else {
        return fragment.to_string();
    };
    let self_closing = fragment[..tag_end].ends_with('/');
    let attr_at = if self_closing { tag_end - 1 } else { tag_end };

    let mut out = String::with_capacity(fragment.len() + id_attr.len() + note.len() + 16);
    out.push_str(&fragment[..attr_at]);
    out.push_str(&id_attr);

    if self_closing {
        let name: String = fragment[1..attr_at]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/')
            .collect();
        out.push('>');
        out.push_str(note);
        out.push_str(&format!("</{}>", name));
        out.push_str(&fragment[tag_end + 1..]);
        return out;
    }

    match fragment.rfind("</") {
        Some(close_at) if close_at > tag_end => {
            out.push_str(&fragment[attr_at..close_at]);
            out.push_str("  ");
            out.push_str(note);
            out.push('\n');
            out.push_str(&fragment[close_at..]);
        }
        _ => out.push_str(&fragment[attr_at..]),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn node() -> TraversalNode {
        TraversalNode::root("A").child("B&C")
    }

    #[test]
    fn injects_id_and_note() {
        let out = inject_record_metadata("<mods version=\"3.8\">\n  <x/>\n</mods>", "rec-1", "<note/>");
        assert!(out.starts_with("<mods version=\"3.8\" ID=\"rec-1\">"));
        assert!(out.contains("<note/>\n</mods>"));
    }

    #[test]
    fn expands_self_closing_root() {
        let out = inject_record_metadata("<mods/>", "rec-1", "<note/>");
        assert_eq!(out, "<mods ID=\"rec-1\"><note/></mods>");
    }

    #[test]
    fn record_ids_are_xml_safe() {
        assert_eq!(record_id_for("01ABC"), "rec-01ABC");
        assert_eq!(record_id_for("a/b c"), "rec-a_2Fb_20c");
        assert_eq!(record_id_for("coll_001"), "rec-coll__001");
    }

    #[test]
    fn record_ids_are_distinct() {
        let pis = ["coll/001", "coll_001", "coll_2F001", "coll__001", "coll 001", "çoll"];
        let ids: std::collections::HashSet<String> = pis.iter().map(|p| record_id_for(p)).collect();
        assert_eq!(ids.len(), pis.len());
    }

    #[test]
    fn hierarchy_note_is_escaped() {
        let note = hierarchy_note(&node());
        assert_eq!(
            note,
            "<note type=\"hierarchy\">Depth: 1 | Parent: A | Path: A &gt; B&amp;C</note>"
        );
        let root = hierarchy_note(&TraversalNode::root("A"));
        assert!(root.contains("Depth: 0 | Parent: none"));
    }

    #[tokio::test]
    async fn control_characters_never_reach_the_sink() {
        let mut writer = CollectionWriter::new(IoSink::new(Vec::<u8>::new(), "memory"));
        writer.open().await.unwrap();
        let position = TraversalNode::root("R\u{0}").child("K\u{0C}1");
        writer
            .write(
                &record_id_for(&position.pi),
                "<mods version=\"3.8\">\n  <note>one\u{0C}two</note>\n</mods>",
                &position,
            )
            .await
            .unwrap();
        writer.close().await.unwrap();

        let out = String::from_utf8(writer.into_sink().inner).unwrap();
        assert!(!out.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')));
        assert!(out.contains("<note>one two</note>"));
        assert!(out.contains("Parent: R | Path: R &gt; K 1"));
        assert!(out.contains("ID=\"rec-K_0C1\""));
    }

    #[tokio::test]
    async fn writes_header_records_footer() {
        let mut writer = CollectionWriter::new(IoSink::new(Vec::<u8>::new(), "memory"));
        writer.open().await.unwrap();
        writer
            .write("rec-B", "<mods version=\"3.8\">\n</mods>", &node())
            .await
            .unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(writer.records_written(), 1);
        let bytes = writer.bytes_written();
        let out = String::from_utf8(writer.into_sink().inner).unwrap();
        assert_eq!(bytes, out.len() as u64);
        assert!(out.starts_with(COLLECTION_HEADER));
        assert!(out.ends_with(COLLECTION_FOOTER));
        assert_eq!(out.matches("</modsCollection>").count(), 1);
        assert!(out.contains("ID=\"rec-B\""));
    }

    #[tokio::test]
    async fn write_before_open_fails() {
        let mut writer = CollectionWriter::new(IoSink::new(Vec::<u8>::new(), "memory"));
        let err = writer.write("rec", "<mods></mods>", &node()).await.unwrap_err();
        assert!(matches!(err, SinkError::NotOpen));
        // Closing a never-opened writer emits nothing.
        writer.close().await.unwrap();
        assert!(writer.into_sink().inner.is_empty());
    }

    #[tokio::test]
    async fn slow_reader_applies_backpressure() {
        // A 64-byte pipe: writes can only complete as fast as the reader drains it.
        let (tx, mut rx) = tokio::io::duplex(64);
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            let mut buf = [0u8; 16];
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                let n = rx.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            out
        });

        let mut writer = CollectionWriter::new(IoSink::new(tx, "pipe"));
        writer.open().await.unwrap();
        let fragment = format!("<mods>{}</mods>", "x".repeat(500));
        for i in 0..5 {
            let n = TraversalNode::root(&format!("E{}", i));
            writer.write(&record_id_for(&n.pi), &fragment, &n).await.unwrap();
        }
        writer.close().await.unwrap();

        let out = String::from_utf8(reader.await.unwrap()).unwrap();
        assert_eq!(out.matches("<mods ID=").count(), 5);
        assert!(out.ends_with(COLLECTION_FOOTER));
    }

    #[tokio::test]
    async fn file_sink_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/out.xml");
        let mut writer = CollectionWriter::new(file_sink(&path).await.unwrap());
        writer.open().await.unwrap();
        writer.close().await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}{}", COLLECTION_HEADER, COLLECTION_FOOTER));
    }
}
