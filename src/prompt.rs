//! Prompt construction for the decision agent.
//!
//! The configured template carries three placeholders: `{file_name}`,
//! `{file_content}` and `{rag_context}`. Substitution is a single left to
//! right scan of the template, so placeholder-shaped text inside a file's
//! content or a retrieved fragment is copied through verbatim.

use crate::config::TEMPLATE_PLACEHOLDERS;
use crate::models::RetrievedFragment;

/// The file being organized, as shown to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub content: String,
}

impl FileInfo {
    /// `content` truncated to its first `prefix_chars` characters.
    pub fn new(name: impl Into<String>, content: &str, prefix_chars: usize) -> Self {
        Self {
            name: name.into(),
            content: content.chars().take(prefix_chars).collect(),
        }
    }
}

/// Render retrieved fragments as the `{rag_context}` block.
pub fn render_context(fragments: &[RetrievedFragment]) -> String {
    fragments
        .iter()
        .map(|f| {
            format!(
                "- Content: \"{}\"\n  (from file: \"{}\", distance: {:.4})",
                f.text,
                f.source().unwrap_or("Unknown location"),
                f.distance
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill `template` with the file and its retrieved context.
pub fn build_prompt(template: &str, file: &FileInfo, fragments: &[RetrievedFragment]) -> String {
    let context = render_context(fragments);
    let values = [file.name.as_str(), file.content.as_str(), context.as_str()];

    let mut out = String::with_capacity(template.len() + context.len() + file.content.len());
    let mut rest = template;
    'scan: while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (placeholder, value) in TEMPLATE_PLACEHOLDERS.iter().zip(values) {
            if let Some(after) = tail.strip_prefix(*placeholder) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROMPT_TEMPLATE;
    use crate::models::Metadata;
    use serde_json::Value;

    fn fragment(text: &str, source: Option<&str>, distance: f32) -> RetrievedFragment {
        let mut metadata = Metadata::new();
        if let Some(source) = source {
            metadata.insert("source".into(), Value::from(source));
        }
        RetrievedFragment {
            text: text.into(),
            metadata,
            distance,
        }
    }

    #[test]
    fn renders_fragments_with_source_and_distance() {
        let rendered = render_context(&[
            fragment("tax stuff", Some("/docs/finance/a.txt"), 0.123456),
            fragment("orphan", None, 1.0),
        ]);
        assert_eq!(
            rendered,
            "- Content: \"tax stuff\"\n  (from file: \"/docs/finance/a.txt\", distance: 0.1235)\n\n\
             - Content: \"orphan\"\n  (from file: \"Unknown location\", distance: 1.0000)"
        );
    }

    #[test]
    fn empty_context_renders_empty_block() {
        assert_eq!(render_context(&[]), "");
        let file = FileInfo::new("a.txt", "hi", 500);
        let prompt = build_prompt("ctx=[{rag_context}]", &file, &[]);
        assert_eq!(prompt, "ctx=[]");
    }

    #[test]
    fn content_is_truncated_by_chars() {
        let file = FileInfo::new("a.txt", &"é".repeat(600), 500);
        assert_eq!(file.content.chars().count(), 500);
    }

    #[test]
    fn substitution_is_single_pass() {
        let file = FileInfo::new("{rag_context}.txt", "literal {file_name} here", 500);
        let prompt = build_prompt(
            "{file_name} | {file_content} | {rag_context} | {unknown}",
            &file,
            &[fragment("{file_content}", Some("/x"), 0.5)],
        );
        assert!(prompt.starts_with("{rag_context}.txt | literal {file_name} here | - Content: \"{file_content}\""));
        assert!(prompt.ends_with("| {unknown}"));
    }

    #[test]
    fn default_template_fills_every_placeholder() {
        let file = FileInfo::new("invoice.txt", "Invoice #42", 500);
        let prompt = build_prompt(
            DEFAULT_PROMPT_TEMPLATE,
            &file,
            &[fragment("old invoice", Some("/docs/finance/old.txt"), 0.2)],
        );
        assert!(prompt.contains("- Name: invoice.txt"));
        assert!(prompt.contains("Content Snippet: \"Invoice #42\""));
        assert!(prompt.contains("(from file: \"/docs/finance/old.txt\", distance: 0.2000)"));
        for placeholder in TEMPLATE_PLACEHOLDERS {
            assert!(!prompt.contains(placeholder));
        }
    }
}
