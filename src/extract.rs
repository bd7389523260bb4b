//! File extractors and the ordered extractor registry.
//!
//! An [`Extractor`] turns a file on disk into plain UTF-8 text plus a
//! [`Metadata`] map. Extraction never aborts a build: content failures
//! degrade to empty text and metadata failures are recorded under the
//! `error` key next to the source path.
//!
//! The [`ExtractorRegistry`] resolves a path to the first registered
//! extractor whose [`can_handle`](Extractor::can_handle) returns true.
//!
//! | Extractor | Extensions |
//! |-----------|------------|
//! | [`TextExtractor`] | `.txt .md .json .csv .py .js .html .css` |
//! | [`PdfExtractor`] | `.pdf` |

use chrono::{DateTime, Local};
use serde_json::Value;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::models::{Document, Metadata};

/// Extensions read as plain text.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "json", "csv", "py", "js", "html", "css"];

/// Extraction error. Callers of [`Extractor::extract_content`] never see it;
/// it is logged and the content degrades to an empty string.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Capability contract shared by every file extractor.
pub trait Extractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether this extractor understands the file at `path`.
    fn can_handle(&self, path: &Path) -> bool;

    /// Extract text, surfacing the failure.
    fn try_extract_content(&self, path: &Path) -> Result<String, ExtractError>;

    /// Extract text. On failure logs the error and returns an empty string.
    fn extract_content(&self, path: &Path) -> String {
        match self.try_extract_content(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), extractor = self.name(), error = %e, "extraction failed; treating as empty");
                String::new()
            }
        }
    }

    /// Extract metadata. Always contains `source`; failures add `error`.
    fn extract_metadata(&self, path: &Path) -> Metadata;
}

/// Lower-cased extension of `path`, without the dot.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Filesystem metadata common to every file type.
fn base_metadata(path: &Path, file_type: &str) -> Result<Metadata, std::io::Error> {
    let stat = std::fs::metadata(path)?;
    let modified = stat.modified()?;
    // Not every filesystem records a birth time.
    let created = stat.created().unwrap_or(modified);

    let mut metadata = Metadata::new();
    metadata.insert("source".into(), Value::from(path.display().to_string()));
    metadata.insert("file_size".into(), Value::from(stat.len()));
    metadata.insert("creation_time".into(), Value::from(format_time(created)));
    metadata.insert(
        "modification_time".into(),
        Value::from(format_time(modified)),
    );
    metadata.insert("file_type".into(), Value::from(file_type));
    Ok(metadata)
}

fn error_metadata(path: &Path, error: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), Value::from(path.display().to_string()));
    metadata.insert("error".into(), Value::from(error));
    metadata
}

// ============ Text ============

/// Reads text, source code and data files as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_handle(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    fn try_extract_content(&self, path: &Path) -> Result<String, ExtractError> {
        std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string()))
    }

    fn extract_metadata(&self, path: &Path) -> Metadata {
        let file_type = extension_of(path)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        base_metadata(path, &file_type).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "metadata extraction failed");
            error_metadata(path, &e.to_string())
        })
    }
}

// ============ PDF ============

/// Extracts page text with `pdf-extract` and document info with `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

/// PDF Info dictionary keys copied into metadata.
const PDF_INFO_FIELDS: [(&[u8], &str); 4] = [
    (b"Author", "pdf_author"),
    (b"Title", "pdf_title"),
    (b"Subject", "pdf_subject"),
    (b"Creator", "pdf_creator"),
];

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn can_handle(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("pdf")
    }

    fn try_extract_content(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
        // pdf-extract panics on some malformed inputs.
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
            .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?;
        let text = result.map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(join_pages(&text))
    }

    fn extract_metadata(&self, path: &Path) -> Metadata {
        let mut metadata = match base_metadata(path, ".pdf") {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "metadata extraction failed");
                return error_metadata(path, &e.to_string());
            }
        };

        match read_pdf_info(path) {
            Ok(info) => metadata.extend(info),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "PDF info extraction failed");
                metadata.insert("error".into(), Value::from(e.to_string()));
            }
        }
        metadata
    }
}

/// Normalize pdf-extract output: pages arrive separated by form feeds and
/// surrounded by blank lines; join non-empty pages with a single newline.
fn join_pages(raw: &str) -> String {
    raw.split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_pdf_info(path: &Path) -> Result<Metadata, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut info = Metadata::new();
    info.insert("pdf_pages".into(), Value::from(doc.get_pages().len()));

    let dict = match doc.trailer.get(b"Info") {
        Ok(lopdf::Object::Reference(id)) => doc.get_object(*id).and_then(|o| o.as_dict()).ok(),
        Ok(lopdf::Object::Dictionary(d)) => Some(d),
        _ => None,
    };
    let Some(dict) = dict else {
        debug!(path = %path.display(), "PDF has no Info dictionary");
        return Ok(info);
    };

    for (key, field) in PDF_INFO_FIELDS {
        if let Ok(bytes) = dict.get(key).and_then(|o| o.as_str()) {
            info.insert(field.into(), Value::from(decode_pdf_string(bytes)));
        }
    }
    Ok(info)
}

/// Decode a PDF text string: UTF-16BE when it carries a byte-order mark,
/// otherwise treated as single-byte text.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

// ============ Registry ============

/// Fixed, ordered list of extractors. The first match wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The built-in extractors, text first.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextExtractor));
        registry.register(Box::new(PdfExtractor));
        registry
    }

    /// Append an extractor; it is consulted after all earlier ones.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// The first extractor that can handle `path`.
    pub fn for_path(&self, path: &Path) -> Option<&dyn Extractor> {
        let found = self
            .extractors
            .iter()
            .find(|e| e.can_handle(path))
            .map(|e| e.as_ref());
        match found {
            Some(e) => debug!(path = %path.display(), extractor = e.name(), "extractor resolved"),
            None => debug!(path = %path.display(), "no extractor for file"),
        }
        found
    }

    /// Extract a whole [`Document`], or `None` when no extractor matches.
    pub fn load(&self, path: &Path) -> Option<Document> {
        let extractor = self.for_path(path)?;
        Some(Document {
            path: path.to_path_buf(),
            text: extractor.extract_content(path),
            metadata: extractor.extract_metadata(path),
        })
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
