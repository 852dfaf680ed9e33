//! PDF location normalization.

/// Resolved location of a book's PDF bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfLocation {
    /// Absolute `http://` or `https://` URL.
    Remote(String),
    /// Path relative to the application's asset root.
    Relative(String),
}

impl PdfLocation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Remote(value) | Self::Relative(value) => value,
        }
    }
}

const BOOKS_DIR: &str = "books/";

/// Normalizes a catalog PDF location.
///
/// - absolute URLs are kept as-is;
/// - a leading `./` is stripped;
/// - `books/...` and `../...` paths are kept;
/// - any other name is placed under `books/`.
///
/// Returns `None` for blank input.
pub fn resolve_pdf_location(location: &str) -> Option<PdfLocation> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(PdfLocation::Remote(trimmed.to_string()));
    }

    let clean = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if clean.is_empty() {
        return None;
    }
    if clean.starts_with(BOOKS_DIR) || clean.starts_with("../") {
        return Some(PdfLocation::Relative(clean.to_string()));
    }
    Some(PdfLocation::Relative(format!("{BOOKS_DIR}{clean}")))
}

#[cfg(test)]
mod tests {
    use super::{resolve_pdf_location, PdfLocation};

    #[test]
    fn keeps_remote_urls() {
        assert_eq!(
            resolve_pdf_location("https://cdn.example.com/a.pdf"),
            Some(PdfLocation::Remote("https://cdn.example.com/a.pdf".to_string()))
        );
    }

    #[test]
    fn normalizes_relative_paths() {
        let resolve = |value: &str| resolve_pdf_location(value).map(|loc| loc.as_str().to_string());
        assert_eq!(resolve("./books/meditations.pdf").as_deref(), Some("books/meditations.pdf"));
        assert_eq!(resolve("../shared/a.pdf").as_deref(), Some("../shared/a.pdf"));
        assert_eq!(resolve("deep-work.pdf").as_deref(), Some("books/deep-work.pdf"));
        assert_eq!(resolve("./"), None);
        assert_eq!(resolve("  "), None);
    }
}
