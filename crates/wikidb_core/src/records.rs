//! On-disk documents: the per-database index and the per-page record.
//!
//! Both are whole-document TOML files. Updates always rewrite the full file
//! through a sibling temporary file and a rename.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub name: String,
    pub page_counter: u64,
    pub wikis: Vec<WikiEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiEntry {
    pub name: String,
    pub pages: Vec<String>,
    /// Every top-level title that has ever moved the page counter, including
    /// titles since removed from `pages`. Absent in indexes written before it existed.
    #[serde(default)]
    pub counted: Vec<String>,
}

impl WikiEntry {
    fn has_counted(&self, title: &str) -> bool {
        self.counted.iter().chain(&self.pages).any(|seen| seen == title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub name: String,
    /// Full parent identifier, empty for a top-level page.
    pub parent: String,
    pub url: String,
    /// Content path relative to the database root.
    pub path: String,
    pub children: Vec<String>,
}

impl DatabaseRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_counter: 0,
            wikis: Vec::new(),
        }
    }

    pub fn wiki(&self, name: &str) -> Option<&WikiEntry> {
        self.wikis.iter().find(|wiki| wiki.name == name)
    }

    pub fn wiki_mut(&mut self, name: &str) -> Option<&mut WikiEntry> {
        self.wikis.iter_mut().find(|wiki| wiki.name == name)
    }

    /// Returns true when the wiki entry had to be created.
    pub fn ensure_wiki(&mut self, name: &str) -> bool {
        if self.wiki(name).is_some() {
            return false;
        }
        self.wikis.push(WikiEntry {
            name: name.to_string(),
            pages: Vec::new(),
            counted: Vec::new(),
        });
        true
    }

    /// Append a top-level title to a wiki's page set. The counter moves only
    /// the first time a title is ever seen, so removal and re-insertion count once.
    pub fn insert_page(&mut self, wiki: &str, title: &str) -> bool {
        self.ensure_wiki(wiki);
        let Some(entry) = self.wiki_mut(wiki) else {
            return false;
        };
        if entry.pages.iter().any(|page| page == title) {
            return false;
        }
        let first_time = !entry.has_counted(title);
        entry.pages.push(title.to_string());
        if first_time {
            entry.counted.push(title.to_string());
            self.page_counter += 1;
        }
        true
    }

    /// Drop a title from the page set; its counted mark stays.
    pub fn remove_page(&mut self, wiki: &str, title: &str) -> bool {
        let Some(entry) = self.wiki_mut(wiki) else {
            return false;
        };
        let before = entry.pages.len();
        entry.pages.retain(|page| page != title);
        if entry.pages.len() == before {
            return false;
        }
        if !entry.counted.iter().any(|seen| seen == title) {
            entry.counted.push(title.to_string());
        }
        true
    }
}

impl PageRecord {
    pub fn parent(&self) -> Option<&str> {
        if self.parent.is_empty() {
            None
        } else {
            Some(&self.parent)
        }
    }

    pub fn add_child(&mut self, title: &str) -> bool {
        if self.children.iter().any(|child| child == title) {
            return false;
        }
        self.children.push(title.to_string());
        true
    }

    pub fn remove_child(&mut self, title: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|child| child != title);
        self.children.len() != before
    }
}

/// Load a database index, reporting a missing file as an uninitialized store.
pub fn load_database_record(path: &Path, database: &str) -> StoreResult<DatabaseRecord> {
    if !path.exists() {
        return Err(StoreError::NotInitialized {
            database: database.to_string(),
            path: path.to_path_buf(),
        });
    }
    read_document(path)
}

/// Load a page record. A missing record is a consistency fault, never a soft miss.
pub fn load_page_record(path: &Path) -> StoreResult<PageRecord> {
    if !path.exists() {
        return Err(StoreError::data_format(path, "page record file is missing"));
    }
    let record: PageRecord = read_document(path)?;
    if record.name.is_empty() {
        return Err(StoreError::data_format(path, "page record has an empty name"));
    }
    Ok(record)
}

pub fn save_database_record(path: &Path, record: &DatabaseRecord) -> StoreResult<()> {
    write_document(path, record)
}

pub fn save_page_record(path: &Path, record: &PageRecord) -> StoreResult<()> {
    write_document(path, record)
}

pub fn read_content(path: &Path) -> StoreResult<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(error) if error.kind() == ErrorKind::NotFound => Err(StoreError::data_format(
            path,
            "page record exists but its content file is missing",
        )),
        Err(error) => Err(StoreError::io(path, error)),
    }
}

pub fn write_content(path: &Path, content: &str) -> StoreResult<()> {
    write_atomically(path, content.as_bytes())
}

fn read_document<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    debug!(path = %path.display(), "reading metadata document");
    let raw = fs::read_to_string(path).map_err(|error| StoreError::io(path, error))?;
    toml::from_str(&raw).map_err(|error| StoreError::data_format(path, error.to_string().trim_end()))
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> StoreResult<()> {
    let rendered = toml::to_string_pretty(document)
        .map_err(|error| StoreError::data_format(path, error.to_string()))?;
    write_atomically(path, rendered.as_bytes())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::data_format(path, "path has no parent directory"))?;
    fs::create_dir_all(parent).map_err(|error| StoreError::io(parent, error))?;

    let staging = staging_path(path);
    fs::write(&staging, bytes).map_err(|error| StoreError::io(&staging, error))?;
    fs::rename(&staging, path).map_err(|error| StoreError::io(path, error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".tmp");
    PathBuf::from(raw)
}
