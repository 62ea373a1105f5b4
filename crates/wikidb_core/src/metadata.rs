//! Read path: database index and page records into the entity model.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::layout;
use crate::model::{ContentMode, DatabaseConnection, Page, SKIPPED_CONTENT_PLACEHOLDER, WikiReference};
use crate::records::{self, PageRecord};
use crate::tree::PageCollection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseMetadata {
    pub name: String,
    pub page_counter: u64,
    pub wikis: Vec<WikiReference>,
}

impl DatabaseMetadata {
    pub fn wiki(&self, name: &str) -> Option<&WikiReference> {
        self.wikis.iter().find(|wiki| wiki.name == name)
    }
}

/// Parse a database's index into its wiki references.
///
/// A recorded name that differs from the configured one is only logged.
pub fn read_database_index(connection: &DatabaseConnection) -> StoreResult<DatabaseMetadata> {
    let index_path = connection.index_path();
    let record = records::load_database_record(&index_path, connection.name())?;
    if record.name != connection.name() {
        warn!(
            configured = connection.name(),
            recorded = %record.name,
            path = %index_path.display(),
            "the database name in the index does not match the configured name; this may cause issues"
        );
    }

    let mut wikis = Vec::with_capacity(record.wikis.len());
    for entry in record.wikis {
        layout::validate_wiki_name(&entry.name)
            .map_err(|error| StoreError::data_format(&index_path, error.to_string()))?;
        for title in &entry.pages {
            layout::validate_title(title).map_err(|error| {
                StoreError::data_format(
                    &index_path,
                    format!("wiki \"{}\" lists a title that is not top-level: {error}", entry.name),
                )
            })?;
        }
        wikis.push(WikiReference {
            name: entry.name,
            database: connection.name().to_string(),
            pages: entry.pages,
        });
    }

    Ok(DatabaseMetadata {
        name: record.name,
        page_counter: record.page_counter,
        wikis,
    })
}

/// The connection with its display counter taken from the index.
pub fn refresh_connection(connection: &DatabaseConnection) -> StoreResult<DatabaseConnection> {
    let metadata = read_database_index(connection)?;
    Ok(connection.clone().with_page_counter(metadata.page_counter))
}

/// Read one page record and materialize its whole subtree.
///
/// Child titles in a record are leaf titles; the lookup key for a child is the
/// parent's identifier joined with the child title (`A` + `B` -> `A/B`).
pub fn read_page(
    connection: &DatabaseConnection,
    wiki: &str,
    identifier: &str,
    mode: ContentMode,
) -> StoreResult<Page> {
    let (expected_parent, expected_title) = layout::split_identifier(identifier)?;
    let record_path = layout::record_path(connection.root(), wiki, identifier);
    let record = records::load_page_record(&record_path)?;
    check_record_identity(&record_path, &record, expected_parent.as_deref(), &expected_title)?;

    let content_path = stored_content_path(connection.root(), &record_path, &record)?;
    let content = match mode {
        ContentMode::Load => records::read_content(&content_path)?,
        ContentMode::Skip => SKIPPED_CONTENT_PLACEHOLDER.to_string(),
    };

    let mut children = Vec::with_capacity(record.children.len());
    for child in &record.children {
        layout::validate_title(child)
            .map_err(|error| StoreError::data_format(&record_path, error.to_string()))?;
        let child_identifier = layout::join_identifier(Some(identifier), child);
        children.push(read_page(connection, wiki, &child_identifier, mode)?);
    }
    debug!(wiki, identifier, children = children.len(), "read page record");

    Ok(Page {
        parent: record.parent().map(str::to_string),
        title: record.name,
        content,
        wiki: wiki.to_string(),
        url: record.url,
        path: content_path,
        children,
    })
}

/// Every top-level page of one wiki, each with its full subtree.
pub fn read_wiki_pages(
    connection: &DatabaseConnection,
    wiki: &str,
    mode: ContentMode,
) -> StoreResult<PageCollection> {
    let metadata = read_database_index(connection)?;
    let reference = metadata
        .wiki(wiki)
        .ok_or_else(|| StoreError::WikiNotFound {
            database: connection.name().to_string(),
            wiki: wiki.to_string(),
        })?;
    read_reference_pages(connection, reference, mode)
}

/// Every top-level page of every wiki in a database, in index order.
pub fn read_database_pages(
    connection: &DatabaseConnection,
    mode: ContentMode,
) -> StoreResult<PageCollection> {
    let metadata = read_database_index(connection)?;
    let mut pages = PageCollection::default();
    for reference in &metadata.wikis {
        pages.extend(read_reference_pages(connection, reference, mode)?.into_roots());
    }
    Ok(pages)
}

fn read_reference_pages(
    connection: &DatabaseConnection,
    reference: &WikiReference,
    mode: ContentMode,
) -> StoreResult<PageCollection> {
    reference
        .pages
        .iter()
        .map(|title| read_page(connection, &reference.name, title, mode))
        .collect::<StoreResult<Vec<_>>>()
        .map(PageCollection::new)
}

pub(crate) fn check_record_identity(
    record_path: &Path,
    record: &PageRecord,
    expected_parent: Option<&str>,
    expected_title: &str,
) -> StoreResult<()> {
    if record.name != expected_title {
        return Err(StoreError::data_format(
            record_path,
            format!(
                "record names page \"{}\" but is stored as \"{expected_title}\"",
                record.name
            ),
        ));
    }
    if record.parent() != expected_parent {
        return Err(StoreError::data_format(
            record_path,
            format!(
                "record parent \"{}\" does not match its location (expected \"{}\")",
                record.parent,
                expected_parent.unwrap_or("")
            ),
        ));
    }
    Ok(())
}

fn stored_content_path(root: &Path, record_path: &Path, record: &PageRecord) -> StoreResult<PathBuf> {
    let relative = Path::new(&record.path);
    let escapes = relative.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if record.path.is_empty() || escapes {
        return Err(StoreError::data_format(
            record_path,
            format!("record path \"{}\" must be relative to the database root", record.path),
        ));
    }
    Ok(layout::resolve_stored_path(root, &record.path))
}
