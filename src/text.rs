//! Small text helpers used by the crosswalk and the summary output.

use std::borrow::Cow;

/// Appended to any text cut by [`truncate_at_word`].
pub const TRUNCATION_MARKER: &str = " [...truncated]";

/// How far back from the limit we look for a whitespace boundary.
const BOUNDARY_WINDOW: usize = 100;

/// Truncate `text` to at most `limit` characters, preferring a word boundary.
///
/// Text at or under the limit is returned unchanged. Otherwise the cut is made
/// at the last whitespace within [`BOUNDARY_WINDOW`] characters before the
/// limit; if there is none, the cut falls exactly on the limit. The result
/// always ends with [`TRUNCATION_MARKER`].
pub fn truncate_at_word(text: &str, limit: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= limit {
        return text.to_string();
    }

    let byte_at = |n: usize| {
        text.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };

    let limit_byte = byte_at(limit);
    let window_start = byte_at(limit.saturating_sub(BOUNDARY_WINDOW));
    // Whitespace at `limit` itself is also a clean boundary.
    let search_end = text[limit_byte..]
        .chars()
        .next()
        .filter(|c| c.is_whitespace())
        .map(|c| limit_byte + c.len_utf8())
        .unwrap_or(limit_byte);

    let cut = text[window_start..search_end]
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| window_start + i)
        .last()
        .filter(|&i| i > 0)
        .unwrap_or(limit_byte);

    let mut out = text[..cut].trim_end().to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Collapse every run of whitespace to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of bytes `text` occupies once encoded as UTF-8 output.
pub fn estimate_bytes(text: &str) -> u64 {
    text.len() as u64
}

/// `None` when `value` is absent or only whitespace, otherwise the trimmed text.
///
/// Every optional source field goes through this, so an empty string is
/// treated the same as a missing one.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Whether `c` may appear in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || c >= '\u{10000}'
}

/// Strip code points XML 1.0 forbids. Form feeds and vertical tabs become a
/// space so page breaks in OCR text still separate words; everything else
/// is dropped. Borrowed when `text` is already clean.
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .filter_map(|c| match c {
                '\u{0B}' | '\u{0C}' => Some(' '),
                c if is_xml_char(c) => Some(c),
                _ => None,
            })
            .collect(),
    )
}
