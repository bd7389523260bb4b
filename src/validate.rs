//! Shape checks for the agent's suggested destination.
//!
//! The validator only looks at the text. Whether the folder exists is the
//! mover's concern.
//!
//! A suggestion is normalized (surrounding whitespace, one layer of matching
//! quotes or backticks, trailing separators), then:
//!
//! 1. a last segment that looks like a file name (`report.pdf`) is replaced
//!    by its parent directory;
//! 2. an empty result is rejected;
//! 3. a result that is not an absolute path (`/…`, `C:/…`, `C:\…`, `\\…`)
//!    is rejected.
//!
//! `/` and `\` are both separators, on every platform.

use std::fmt;
use std::path::PathBuf;

const MAX_EXTENSION_CHARS: usize = 10;

/// An accepted destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDestination {
    pub folder: String,
    /// The normalized suggestion, when it named a file and was replaced by
    /// its parent directory.
    pub corrected_from: Option<String>,
}

impl ValidatedDestination {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.folder)
    }
}

/// Why a suggestion was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NotAbsolute(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "the agent suggested no destination"),
            Rejection::NotAbsolute(s) => write!(f, "'{}' is not an absolute folder path", s),
        }
    }
}

impl std::error::Error for Rejection {}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn has_drive_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && is_separator(b[2] as char)
}

/// `/`, `\`, or a drive root such as `C:/`.
fn is_bare_root(s: &str) -> bool {
    s == "/" || s == "\\" || (s.len() == 3 && has_drive_prefix(s))
}

/// Whether `s` carries an absolute-path marker.
pub fn looks_absolute(s: &str) -> bool {
    s.starts_with('/') || s.starts_with("\\\\") || has_drive_prefix(s)
}

/// Trim, unquote once, and drop trailing separators.
pub fn normalize(raw: &str) -> String {
    let mut s = raw.trim();
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            s = s[1..s.len() - 1].trim();
            break;
        }
    }
    let mut s = s.to_string();
    while s.ends_with(is_separator) && !is_bare_root(&s) {
        s.pop();
    }
    s
}

/// Whether the last segment ends in `.` plus 1 to 10 ASCII alphanumerics,
/// with the dot not leading the segment.
fn has_file_extension(segment: &str) -> bool {
    match segment.rfind('.') {
        Some(0) | None => false,
        Some(dot) => {
            let ext = &segment[dot + 1..];
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
    }
}

/// Parent of `s`, keeping the separator when the parent is a root.
fn parent_of(s: &str) -> String {
    match s.rfind(is_separator) {
        None => String::new(),
        Some(idx) => {
            let with_sep = &s[..=idx];
            if is_bare_root(with_sep) {
                with_sep.to_string()
            } else {
                s[..idx].to_string()
            }
        }
    }
}

/// Validate the agent's raw answer.
pub fn validate_suggestion(raw: &str) -> Result<ValidatedDestination, Rejection> {
    let normalized = normalize(raw);

    let last_segment = normalized
        .rsplit(is_separator)
        .next()
        .unwrap_or(normalized.as_str());
    let (folder, corrected_from) = if has_file_extension(last_segment) {
        (parent_of(&normalized), Some(normalized.clone()))
    } else {
        (normalized, None)
    };

    if folder.is_empty() {
        return Err(Rejection::Empty);
    }
    if !looks_absolute(&folder) {
        return Err(Rejection::NotAbsolute(folder));
    }
    Ok(ValidatedDestination {
        folder,
        corrected_from,
    })
}
