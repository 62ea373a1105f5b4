//! Read-only consistency audit of one database.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::layout::{self, normalize_path};
use crate::model::DatabaseConnection;
use crate::records;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// A title listed in the index or in a parent record has no record file.
    MissingRecord {
        wiki: String,
        identifier: String,
        referenced_by: String,
    },
    MalformedRecord { path: String, message: String },
    /// A record whose `name` or `parent` does not match where it is stored.
    LocationMismatch {
        wiki: String,
        identifier: String,
        recorded_name: String,
        recorded_parent: String,
    },
    MissingContent {
        wiki: String,
        identifier: String,
        path: String,
    },
    /// The wiki's page set holds a title that is not a top-level title.
    NestedIndexTitle { wiki: String, title: String },
    /// A record file that nothing in the index reaches.
    StrayRecord { path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub database: String,
    pub page_counter: u64,
    pub wikis: usize,
    pub records_checked: usize,
    pub findings: Vec<Finding>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

struct Audit<'a> {
    root: &'a Path,
    reachable: HashSet<PathBuf>,
    findings: Vec<Finding>,
}

pub fn check_database(connection: &DatabaseConnection) -> StoreResult<CheckReport> {
    let index = records::load_database_record(&connection.index_path(), connection.name())?;
    let mut audit = Audit {
        root: connection.root(),
        reachable: HashSet::new(),
        findings: Vec::new(),
    };

    for wiki in &index.wikis {
        for title in &wiki.pages {
            if !layout::is_top_level(title) {
                audit.findings.push(Finding::NestedIndexTitle {
                    wiki: wiki.name.clone(),
                    title: title.clone(),
                });
                continue;
            }
            audit.visit(&wiki.name, None, title, "database index")?;
        }
    }
    audit.find_strays()?;

    Ok(CheckReport {
        database: connection.name().to_string(),
        page_counter: index.page_counter,
        wikis: index.wikis.len(),
        records_checked: audit.reachable.len(),
        findings: audit.findings,
    })
}

impl Audit<'_> {
    fn visit(
        &mut self,
        wiki: &str,
        parent: Option<&str>,
        title: &str,
        referenced_by: &str,
    ) -> StoreResult<()> {
        let identifier = layout::join_identifier(parent, title);
        let record_path = layout::record_path(self.root, wiki, &identifier);
        if !self.reachable.insert(record_path.clone()) {
            return Ok(());
        }
        if !record_path.exists() {
            self.findings.push(Finding::MissingRecord {
                wiki: wiki.to_string(),
                identifier,
                referenced_by: referenced_by.to_string(),
            });
            return Ok(());
        }

        let record = match records::load_page_record(&record_path) {
            Ok(record) => record,
            Err(StoreError::DataFormat { path, message }) => {
                self.findings.push(Finding::MalformedRecord {
                    path: normalize_path(&path),
                    message,
                });
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        if record.name != title || record.parent() != parent {
            self.findings.push(Finding::LocationMismatch {
                wiki: wiki.to_string(),
                identifier: identifier.clone(),
                recorded_name: record.name.clone(),
                recorded_parent: record.parent.clone(),
            });
        }

        let content_path = layout::resolve_stored_path(self.root, &record.path);
        if !content_path.is_file() {
            self.findings.push(Finding::MissingContent {
                wiki: wiki.to_string(),
                identifier: identifier.clone(),
                path: record.path.clone(),
            });
        }

        for child in &record.children {
            if let Err(error) = layout::validate_title(child) {
                self.findings.push(Finding::MalformedRecord {
                    path: normalize_path(&record_path),
                    message: error.to_string(),
                });
                continue;
            }
            self.visit(wiki, Some(&identifier), child, &identifier)?;
        }
        Ok(())
    }

    fn find_strays(&mut self) -> StoreResult<()> {
        let pages_dir = layout::pages_dir(self.root);
        if !pages_dir.exists() {
            return Ok(());
        }
        let record_suffix = format!("{}{}", layout::CONTENT_EXTENSION, layout::RECORD_SUFFIX);
        for entry in WalkDir::new(&pages_dir).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                let path = error.path().unwrap_or(pages_dir.as_path()).to_path_buf();
                StoreError::Io {
                    path,
                    source: error.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_record = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&record_suffix));
            if is_record && !self.reachable.contains(entry.path()) {
                self.findings.push(Finding::StrayRecord {
                    path: normalize_path(entry.path()),
                });
            }
        }
        Ok(())
    }
}
