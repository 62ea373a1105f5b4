//! Path and identifier conventions for a database root.
//!
//! ```text
//! <root>/database.toml
//! <root>/pages/<wiki>/<identifier>.html
//! <root>/pages/<wiki>/<identifier>.html.toml
//! ```
//!
//! An identifier is the `/`-joined chain of leaf titles from the top-level page
//! down to the page itself, so `Install/Arch` lives at `pages/<wiki>/Install/Arch.html`
//! and its parent's record sits next to the `Install/` directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

pub const DATABASE_INDEX_FILENAME: &str = "database.toml";
pub const PAGES_DIR: &str = "pages";
pub const CONTENT_EXTENSION: &str = ".html";
pub const RECORD_SUFFIX: &str = ".toml";
pub const SEPARATOR: char = '/';

pub fn index_path(root: &Path) -> PathBuf {
    root.join(DATABASE_INDEX_FILENAME)
}

pub fn pages_dir(root: &Path) -> PathBuf {
    root.join(PAGES_DIR)
}

/// Storage path relative to the database root, always `/`-separated.
pub fn relative_content_path(wiki: &str, identifier: &str) -> String {
    format!("{PAGES_DIR}/{wiki}/{identifier}{CONTENT_EXTENSION}")
}

pub fn content_path(root: &Path, wiki: &str, identifier: &str) -> PathBuf {
    resolve_stored_path(root, &relative_content_path(wiki, identifier))
}

pub fn record_path(root: &Path, wiki: &str, identifier: &str) -> PathBuf {
    record_path_for_content(&content_path(root, wiki, identifier))
}

pub fn record_path_for_content(content: &Path) -> PathBuf {
    let mut raw = OsString::from(content.as_os_str());
    raw.push(RECORD_SUFFIX);
    PathBuf::from(raw)
}

/// The parent of `pages/w/A/B.html` keeps its record at `pages/w/A.html.toml`.
pub fn parent_record_path(content: &Path) -> Option<PathBuf> {
    let directory = content.parent()?;
    let mut raw = OsString::from(directory.as_os_str());
    raw.push(CONTENT_EXTENSION);
    raw.push(RECORD_SUFFIX);
    Some(PathBuf::from(raw))
}

/// Join a `/`-separated stored path onto the database root.
pub fn resolve_stored_path(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in relative.split(SEPARATOR) {
        if !segment.is_empty() {
            out.push(segment);
        }
    }
    out
}

pub fn join_identifier(parent: Option<&str>, title: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}{SEPARATOR}{title}"),
        _ => title.to_string(),
    }
}

/// Split `A/B/C` into (`Some("A/B")`, `"C"`), validating every segment.
pub fn split_identifier(identifier: &str) -> StoreResult<(Option<String>, String)> {
    let trimmed = identifier.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Err(invalid(identifier, "identifier is empty"));
    }
    for segment in trimmed.split(SEPARATOR) {
        validate_segment(segment).map_err(|reason| invalid(identifier, reason))?;
    }
    match trimmed.rsplit_once(SEPARATOR) {
        Some((parent, title)) => Ok((Some(parent.to_string()), title.to_string())),
        None => Ok((None, trimmed.to_string())),
    }
}

pub fn validate_title(title: &str) -> StoreResult<()> {
    if title.contains(SEPARATOR) {
        return Err(invalid(title, "a leaf title cannot contain `/`"));
    }
    validate_segment(title).map_err(|reason| invalid(title, reason))
}

pub fn validate_wiki_name(name: &str) -> StoreResult<()> {
    if name.contains(SEPARATOR) {
        return Err(invalid(name, "a wiki name cannot contain `/`"));
    }
    validate_segment(name).map_err(|reason| invalid(name, reason))
}

pub fn is_top_level(identifier: &str) -> bool {
    !identifier.contains(SEPARATOR)
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.trim().is_empty() {
        return Err("empty title segment");
    }
    if segment == "." || segment == ".." {
        return Err("`.` and `..` are reserved");
    }
    if segment.contains('\\') {
        return Err("`\\` is not allowed");
    }
    Ok(())
}

fn invalid(identifier: &str, reason: &str) -> StoreError {
    StoreError::InvalidTitle {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    }
}
