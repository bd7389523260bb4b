//! Core data models used throughout docsort.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the build and organize pipelines.

use serde_json::{Map, Value};
use std::path::PathBuf;

/// Metadata attached to a document and to each of its chunks.
///
/// Keys used by the extractors: `source`, `file_size`, `creation_time`,
/// `modification_time`, `file_type`, the `pdf_*` fields and `error`.
pub type Metadata = Map<String, Value>;

/// A file after extraction. Transient: only its chunks are stored.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub metadata: Metadata,
}

/// A bounded fragment of a document, keyed by `<path>-chunk-<index>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Everything needed to upsert one file.
///
/// `documents`, `metadatas` and `ids` are parallel lists; all three are empty
/// when there is nothing to ingest.
#[derive(Debug, Clone, Default)]
pub struct PreparedFile {
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub ids: Vec<String>,
}

impl PreparedFile {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .map(|((id, text), metadata)| Chunk { id, text, metadata })
            .collect()
    }
}

/// A fragment returned by the retriever. Lower distance is a better match.
#[derive(Debug, Clone)]
pub struct RetrievedFragment {
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

impl RetrievedFragment {
    /// The `source` path recorded in the fragment's metadata, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}
