//! Structural text chunker.
//!
//! Splits extracted text into overlapping windows of at most `max_chars`
//! characters. Each window ends on the best structural break available
//! inside it: a paragraph break (`\n\n`), then a line break, then a sentence
//! end, then a word boundary, and only then a hard cut.
//!
//! # Guarantees
//!
//! For `overlap_chars < max_chars`:
//!
//! - every chunk has at most `max_chars` characters;
//! - adjacent chunks share at most `overlap_chars` characters;
//! - the chunks cover the text with no gaps (the first starts at 0, the
//!   last ends at the end, each starts no later than its predecessor ends).
//!
//! Lengths are counted in `char`s. Chunk IDs are `<path>-chunk-<index>`, so
//! re-chunking an unchanged file yields the same IDs.

use serde_json::Value;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::extract::ExtractorRegistry;
use crate::models::{Chunk, Document, PreparedFile};

/// Characters of chunk text copied into `content_snippet`.
const SNIPPET_CHARS: usize = 100;

/// Break points in order of preference. Separators in the same group are
/// equally good; the latest one in the window wins.
const BREAK_GROUPS: [&[&str]; 4] = [&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "]];

/// Split `text` into character ranges obeying the size, overlap and
/// coverage guarantees. Empty text yields no ranges.
pub fn split_spans(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Range<usize>> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars - 1);

    let mut spans = Vec::new();
    let mut start = 0usize;
    while start < n {
        let limit = (start + max_chars).min(n);
        if limit == n {
            spans.push(start..n);
            break;
        }

        // A break must leave the chunk long enough that the next one
        // starts strictly after this one.
        let floor = start + overlap_chars.max(max_chars / 2);
        let end = find_break(&chars, start, floor, limit).unwrap_or(limit);
        spans.push(start..end);

        start = next_start(&chars, end, overlap_chars);
    }
    spans
}

/// Split `text` into chunk strings. See [`split_spans`].
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let spans = split_spans(text, max_chars, overlap_chars);
    if spans.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    spans
        .into_iter()
        .map(|span| chars[span].iter().collect())
        .collect()
}

/// Latest break position in `(floor, limit]`, by preference group.
fn find_break(chars: &[char], start: usize, floor: usize, limit: usize) -> Option<usize> {
    BREAK_GROUPS.iter().find_map(|group| {
        group
            .iter()
            .filter_map(|sep| rfind_separator_end(chars, start, floor, limit, sep))
            .max()
    })
}

/// Largest `e` in `(floor, limit]` such that `sep` ends at `e` and starts at
/// or after `start`.
fn rfind_separator_end(
    chars: &[char],
    start: usize,
    floor: usize,
    limit: usize,
    sep: &str,
) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    let len = sep.len();
    (floor + 1..=limit)
        .rev()
        .find(|&e| e >= start + len && chars[e - len..e] == sep[..])
}

/// Where the next window starts: `overlap_chars` before `end`, moved forward
/// to the first word start so overlaps do not begin mid-word.
fn next_start(chars: &[char], end: usize, overlap_chars: usize) -> usize {
    let raw = end - overlap_chars;
    (raw..end)
        .find(|&i| i > 0 && chars[i - 1].is_whitespace() && !chars[i].is_whitespace())
        .unwrap_or(raw)
}

/// Deterministic chunk ID for `path` and `index`.
pub fn chunk_id(path: &Path, index: usize) -> String {
    format!("{}-chunk-{}", path.display(), index)
}

/// Chunk an extracted document. Empty (or whitespace-only) text yields an
/// empty [`PreparedFile`].
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> PreparedFile {
    if doc.text.trim().is_empty() {
        return PreparedFile::default();
    }

    let documents = split_text(&doc.text, config.max_chars, config.overlap_chars);
    let mut prepared = PreparedFile::default();
    for (index, text) in documents.into_iter().enumerate() {
        let mut metadata = doc.metadata.clone();
        metadata.insert("chunk_number".into(), Value::from(index));
        metadata.insert(
            "content_snippet".into(),
            Value::from(text.chars().take(SNIPPET_CHARS).collect::<String>()),
        );
        prepared.ids.push(chunk_id(&doc.path, index));
        prepared.metadatas.push(metadata);
        prepared.documents.push(text);
    }
    prepared
}

/// Extract and chunk one file.
///
/// Returns an empty [`PreparedFile`] when no extractor handles the file or
/// the extracted content is empty: there is nothing to ingest, which is not
/// an error.
pub fn prepare(registry: &ExtractorRegistry, path: &Path, config: &ChunkingConfig) -> PreparedFile {
    let Some(doc) = registry.load(path) else {
        return PreparedFile::default();
    };
    let prepared = chunk_document(&doc, config);
    debug!(path = %path.display(), chunks = prepared.len(), "prepared file");
    prepared
}

/// Convenience: [`prepare`] flattened into [`Chunk`]s.
pub fn prepare_chunks(
    registry: &ExtractorRegistry,
    path: &Path,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    prepare(registry, path, config).into_chunks()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn assert_invariants(text: &str, max: usize, overlap: usize) {
        let n = text.chars().count();
        let spans = split_spans(text, max, overlap);
        if n == 0 {
            assert!(spans.is_empty());
            return;
        }
        assert_eq!(spans[0].start, 0, "first chunk must start at 0");
        assert_eq!(spans.last().unwrap().end, n, "last chunk must reach the end");
        for span in &spans {
            assert!(span.end > span.start, "empty chunk {:?}", span);
            assert!(span.len() <= max, "chunk {:?} longer than {}", span, max);
        }
        for pair in spans.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(b.start <= a.end, "gap between {:?} and {:?}", a, b);
            assert!(b.start > a.start, "no progress between {:?} and {:?}", a, b);
            assert!(a.end - b.start <= overlap, "overlap {:?}/{:?} > {}", a, b, overlap);
        }
    }

    /// Deterministic pseudo-random prose with paragraphs, lines and sentences.
    fn generated_text(seed: u64, words: usize) -> String {
        let vocab = [
            "invoice", "tax", "report", "the", "quarterly", "ünïcode", "a", "budget",
            "meeting", "notes", "x", "supercalifragilisticexpialidocious",
        ];
        let mut state = seed;
        let mut out = String::new();
        for i in 0..words {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let word = vocab[(state >> 33) as usize % vocab.len()];
            out.push_str(word);
            out.push_str(match (state >> 20) % 23 {
                0 => "\n\n",
                1 => "\n",
                2 | 3 => ". ",
                4 => "?  ",
                _ if i % 97 == 0 => "",
                _ => " ",
            });
        }
        out
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "a".repeat(600);
        let chunks = split_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_text("", 1000, 200).is_empty());
    }

    #[test]
    fn invariants_hold_on_generated_text() {
        for seed in 0..40u64 {
            let text = generated_text(seed, 50 + (seed as usize) * 37);
            for (max, overlap) in [(1000, 200), (120, 30), (50, 0), (40, 39), (7, 3), (1, 0)] {
                assert_invariants(&text, max, overlap);
            }
        }
    }

    #[test]
    fn invariants_hold_without_any_break_points() {
        let text = "x".repeat(5_321);
        assert_invariants(&text, 1000, 200);
        let spans = split_spans(&text, 1000, 200);
        assert_eq!(spans[0], 0..1000);
        assert_eq!(spans[1].start, 800);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let first = "word ".repeat(120); // 600 chars
        let second = "more ".repeat(120);
        let text = format!("{}\n\n{}", first.trim_end(), second.trim_end());
        let chunks = split_text(&text, 1000, 200);
        assert!(chunks[0].ends_with("\n\n"), "chunk 0: {:?}", &chunks[0][590..]);
        assert_invariants(&text, 1000, 200);
    }

    #[test]
    fn overlap_starts_on_a_word() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = split_text(text, 20, 8);
        for chunk in &chunks[1..] {
            let first = chunk.chars().next().unwrap();
            assert!(!first.is_whitespace(), "chunk starts with whitespace: {:?}", chunk);
        }
        assert_invariants(text, 20, 8);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(1000);
        let chunks = split_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunk_ids_are_deterministic_and_zero_based() {
        let doc = Document {
            path: PathBuf::from("/docs/report.txt"),
            text: "word ".repeat(500),
            metadata: Metadata::new(),
        };
        let config = ChunkingConfig::default();
        let first = chunk_document(&doc, &config);
        let second = chunk_document(&doc, &config);
        assert!(first.len() > 1);
        assert_eq!(first.ids, second.ids);
        assert_eq!(first.ids[0], "/docs/report.txt-chunk-0");
        assert_eq!(first.ids[1], "/docs/report.txt-chunk-1");
    }

    #[test]
    fn chunk_metadata_extends_base_metadata() {
        let mut base = Metadata::new();
        base.insert("source".into(), Value::from("/docs/a.txt"));
        let doc = Document {
            path: PathBuf::from("/docs/a.txt"),
            text: "z".repeat(150),
            metadata: base,
        };
        let prepared = chunk_document(&doc, &ChunkingConfig::default());
        let meta = &prepared.metadatas[0];
        assert_eq!(meta["source"], Value::from("/docs/a.txt"));
        assert_eq!(meta["chunk_number"], Value::from(0));
        assert_eq!(meta["content_snippet"], Value::from("z".repeat(100)));
    }

    #[test]
    fn prepare_skips_unsupported_and_empty_files() {
        let tmp = TempDir::new().unwrap();
        let registry = ExtractorRegistry::with_defaults();
        let config = ChunkingConfig::default();

        let archive = tmp.path().join("backup.zip");
        fs::write(&archive, b"PK").unwrap();
        assert!(prepare(&registry, &archive, &config).is_empty());

        let empty = tmp.path().join("empty.txt");
        fs::write(&empty, "   \n").unwrap();
        let prepared = prepare(&registry, &empty, &config);
        assert!(prepared.documents.is_empty());
        assert!(prepared.metadatas.is_empty());
        assert!(prepared.ids.is_empty());
    }

    #[test]
    fn prepare_chunks_a_text_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "n".repeat(2500)).unwrap();
        let chunks = prepare_chunks(&ExtractorRegistry::with_defaults(), &path, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].id, chunk_id(&path, 2));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
    }
}
