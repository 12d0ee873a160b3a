//! Document formats and their pandoc reader/writer names.

use crate::format::FormatDescriptor;

/// Extensions handled by the document engine, in declaration order.
///
/// `json` must be a pandoc AST dump.
pub const EXTENSIONS: [&str; 12] = [
    "docx", "doc", "md", "html", "rtf", "csv", "tsv", "json", "rst", "epub", "odt", "docbook",
];

pub fn descriptors() -> Vec<FormatDescriptor> {
    EXTENSIONS
        .iter()
        .map(|ext| FormatDescriptor::new(ext, true, true))
        .collect()
}

/// Pandoc reader/writer name for an extension (with or without the dot).
pub fn pandoc_name(format: &str) -> &str {
    match format.trim_start_matches('.') {
        "md" => "markdown",
        "htm" => "html",
        other => other,
    }
}

/// Whether converting `from` into `to` should pull embedded media out of
/// the source.
pub fn extracts_media(from: &str, to: &str) -> bool {
    matches!(from.trim_start_matches('.'), "docx" | "odt" | "epub")
        && matches!(to.trim_start_matches('.'), "html" | "md")
}
