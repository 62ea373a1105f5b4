use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StoreResult;
use crate::layout::{self, SEPARATOR};

/// Substituted for page content whenever a read skips the content file.
pub const SKIPPED_CONTENT_PLACEHOLDER: &str = "<p style=\"font-family: monospace\">The content of this page was not loaded.</p>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    Load,
    Skip,
}

/// One configured local store. The page counter is a display copy of the index value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConnection {
    name: String,
    root: PathBuf,
    page_counter: u64,
}

impl DatabaseConnection {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            page_counter: 0,
        }
    }

    pub fn with_page_counter(mut self, page_counter: u64) -> Self {
        self.page_counter = page_counter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_counter(&self) -> u64 {
        self.page_counter
    }

    pub fn index_path(&self) -> PathBuf {
        layout::index_path(&self.root)
    }
}

/// A wiki's membership in one database, as recorded in the database index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiReference {
    pub name: String,
    pub database: String,
    pub pages: Vec<String>,
}

impl WikiReference {
    pub fn contains(&self, title: &str) -> bool {
        self.pages.iter().any(|page| page == title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub title: String,
    pub content: String,
    /// Full identifier of the parent page; a lookup key, never a live reference.
    pub parent: Option<String>,
    pub wiki: String,
    pub url: String,
    /// Relative (`pages/<wiki>/...`) until the indexer or reader joins it to a database root.
    pub path: PathBuf,
    pub children: Vec<Page>,
}

impl Page {
    /// Build the leaf page a fetch stage hands over for indexing.
    pub fn fetched(
        identifier: &str,
        wiki: &str,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> StoreResult<Self> {
        layout::validate_wiki_name(wiki)?;
        let (parent, title) = layout::split_identifier(identifier)?;
        let full = layout::join_identifier(parent.as_deref(), &title);
        Ok(Self {
            title,
            content: content.into(),
            parent,
            wiki: wiki.to_string(),
            url: url.into(),
            path: PathBuf::from(layout::relative_content_path(wiki, &full)),
            children: Vec::new(),
        })
    }

    pub fn identifier(&self) -> String {
        layout::join_identifier(self.parent.as_deref(), &self.title)
    }

    /// The parent key, with an empty string read as "no parent".
    pub fn parent_identifier(&self) -> Option<&str> {
        self.parent.as_deref().filter(|parent| !parent.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parent_identifier().is_none()
    }

    pub fn depth(&self) -> usize {
        self.parent_identifier()
            .map(|parent| parent.matches(SEPARATOR).count() + 1)
            .unwrap_or(0)
    }

    pub fn child_titles(&self) -> Vec<&str> {
        self.children.iter().map(|child| child.title.as_str()).collect()
    }
}
