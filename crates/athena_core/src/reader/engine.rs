//! PDF collaborator seams.
//!
//! Parsing and rasterization live outside the core. The reader only needs
//! to open a document from bytes, know its page count, and start one page
//! render at a time; the host reports completion back through
//! `PaginationSequencer::complete_render`.

use crate::catalog::PdfLocation;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Why a document could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The source produced no bytes.
    Empty,
    /// Bytes are not a readable document.
    Invalid(String),
    /// The source could not be fetched.
    Unavailable(String),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "document is empty"),
            Self::Invalid(reason) => write!(f, "document is not a valid PDF: {reason}"),
            Self::Unavailable(reason) => write!(f, "document could not be fetched: {reason}"),
        }
    }
}

impl Error for DocumentError {}

/// Why a single page render failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    PageOutOfRange { page: u32, total_pages: u32 },
    Backend(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageOutOfRange { page, total_pages } => {
                write!(f, "page {page} is outside 1..={total_pages}")
            }
            Self::Backend(reason) => write!(f, "{reason}"),
        }
    }
}

impl Error for RenderError {}

/// Opens documents from raw bytes.
pub trait PdfEngine {
    fn open_document(&self, bytes: Vec<u8>) -> Result<Box<dyn PdfDocument>, DocumentError>;
}

/// One open document.
pub trait PdfDocument {
    fn page_count(&self) -> u32;

    /// Begins rendering `page` at `scale`.
    ///
    /// The result is delivered later through
    /// `PaginationSequencer::complete_render`; implementations must not call
    /// back into the sequencer from here.
    fn start_render(&mut self, page: u32, scale: f32);
}

impl<D: PdfDocument + ?Sized> PdfDocument for Box<D> {
    fn page_count(&self) -> u32 {
        (**self).page_count()
    }

    fn start_render(&mut self, page: u32, scale: f32) {
        (**self).start_render(page, scale)
    }
}

/// Fetches document bytes for a resolved location.
pub trait DocumentSource {
    fn fetch(&self, location: &PdfLocation) -> Result<Vec<u8>, DocumentError>;
}

/// Rejects byte streams that cannot be a PDF before handing them to an
/// engine.
pub fn check_pdf_header(bytes: &[u8]) -> Result<(), DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::Empty);
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(DocumentError::Invalid("missing %PDF- header".to_string()));
    }
    Ok(())
}

/// Reads relative locations from an asset directory on disk.
///
/// Remote locations are reported as unavailable.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    asset_root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }
}

impl DocumentSource for FsDocumentSource {
    fn fetch(&self, location: &PdfLocation) -> Result<Vec<u8>, DocumentError> {
        match location {
            PdfLocation::Remote(url) => Err(DocumentError::Unavailable(format!(
                "remote documents are not fetched by the file source: {url}"
            ))),
            PdfLocation::Relative(path) => {
                let full = self.asset_root.join(path);
                let bytes = std::fs::read(&full).map_err(|err| {
                    DocumentError::Unavailable(format!("{}: {err}", full.display()))
                })?;
                if bytes.is_empty() {
                    return Err(DocumentError::Empty);
                }
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{check_pdf_header, DocumentError, DocumentSource, FsDocumentSource};
    use crate::catalog::PdfLocation;

    #[test]
    fn header_check_distinguishes_empty_and_invalid() {
        assert_eq!(check_pdf_header(b""), Err(DocumentError::Empty));
        assert!(matches!(
            check_pdf_header(b"<html>"),
            Err(DocumentError::Invalid(_))
        ));
        assert_eq!(check_pdf_header(b"%PDF-1.7\n"), Ok(()));
    }

    #[test]
    fn fs_source_reads_relative_paths_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("books")).expect("mkdir");
        std::fs::write(dir.path().join("books/a.pdf"), b"%PDF-1.4").expect("write");
        std::fs::write(dir.path().join("books/empty.pdf"), b"").expect("write");

        let source = FsDocumentSource::new(dir.path());
        assert_eq!(
            source
                .fetch(&PdfLocation::Relative("books/a.pdf".to_string()))
                .expect("fetch"),
            b"%PDF-1.4".to_vec()
        );
        assert_eq!(
            source.fetch(&PdfLocation::Relative("books/empty.pdf".to_string())),
            Err(DocumentError::Empty)
        );
        assert!(matches!(
            source.fetch(&PdfLocation::Relative("books/missing.pdf".to_string())),
            Err(DocumentError::Unavailable(_))
        ));
        assert!(matches!(
            source.fetch(&PdfLocation::Remote("https://example.com/a.pdf".to_string())),
            Err(DocumentError::Unavailable(_))
        ));
    }
}
