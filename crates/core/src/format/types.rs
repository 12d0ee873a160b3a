//! Format descriptors and UI categories.

use serde::{Deserialize, Serialize};

/// Normalizes a format name to its canonical form: lowercase with a leading `.`.
///
/// `"PNG"`, `"png"` and `".png"` all become `".png"`.
pub fn normalize_format(name: &str) -> String {
    let trimmed = name.trim();
    let lower = trimmed.trim_start_matches('.').to_lowercase();
    format!(".{}", lower)
}

/// Returns the format name without its leading `.`.
pub fn bare_extension(format: &str) -> &str {
    format.strip_prefix('.').unwrap_or(format)
}

/// One format declared by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Normalized format name (e.g. `".png"`).
    pub name: String,
    /// Whether the engine can read this format.
    pub from_supported: bool,
    /// Whether the engine can write this format.
    pub to_supported: bool,
    /// Whether the engine's own reader/writer handles it (no fallback path).
    pub is_native: bool,
}

impl FormatDescriptor {
    /// Creates a native descriptor.
    pub fn new(name: &str, from_supported: bool, to_supported: bool) -> Self {
        Self {
            name: normalize_format(name),
            from_supported,
            to_supported,
            is_native: true,
        }
    }

    /// Creates a descriptor handled through a fallback path.
    pub fn non_native(name: &str, from_supported: bool, to_supported: bool) -> Self {
        Self {
            is_native: false,
            ..Self::new(name, from_supported, to_supported)
        }
    }

    /// Whether this descriptor matches the given (already normalized) format.
    pub fn matches(&self, format: &str) -> bool {
        self.name == format
    }
}

/// UI-facing grouping of formats by engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Image,
    Audio,
    Video,
    Document,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 4] = [
        Category::Image,
        Category::Audio,
        Category::Video,
        Category::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Other categories whose formats this category may be converted into.
    pub fn can_convert_to(&self) -> &'static [Category] {
        match self {
            Self::Video => &[Category::Audio],
            Self::Audio => &[Category::Video],
            Self::Image | Self::Document => &[],
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats of one category as exposed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFormats {
    pub category: Category,
    pub formats: Vec<String>,
    pub can_convert_to: Vec<Category>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_format() {
        assert_eq!(normalize_format("PNG"), ".png");
        assert_eq!(normalize_format(".Jpeg"), ".jpeg");
        assert_eq!(normalize_format(" mp3 "), ".mp3");
        assert_eq!(normalize_format(""), ".");
    }

    #[test]
    fn test_bare_extension() {
        assert_eq!(bare_extension(".png"), "png");
        assert_eq!(bare_extension("png"), "png");
    }

    #[test]
    fn test_descriptor_constructors() {
        let native = FormatDescriptor::new("PNG", true, true);
        assert_eq!(native.name, ".png");
        assert!(native.is_native);

        let fallback = FormatDescriptor::non_native("svg", true, false);
        assert!(!fallback.is_native);
        assert!(fallback.from_supported);
        assert!(!fallback.to_supported);
        assert!(fallback.matches(".svg"));
    }

    #[test]
    fn test_category_conversions() {
        assert_eq!(Category::Video.can_convert_to(), &[Category::Audio]);
        assert_eq!(Category::Audio.can_convert_to(), &[Category::Video]);
        assert!(Category::Image.can_convert_to().is_empty());
        assert_eq!(Category::Document.to_string(), "document");
    }
}
