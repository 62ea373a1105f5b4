use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::slice;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::layout::{self, normalize_path};
use crate::metadata::read_page;
use crate::model::{ContentMode, DatabaseConnection};
use crate::records;
use crate::tree;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub wiki: String,
    pub identifier: String,
    pub dry_run: bool,
    /// Identifiers of the page and its descendants, in pre-order.
    pub removed_pages: Vec<String>,
    pub removed_files: Vec<String>,
    pub unlinked_from_parent: Option<String>,
    pub removed_from_index: bool,
    pub page_counter: u64,
}

/// Remove a page together with its whole subtree.
///
/// The link from the parent record (or the wiki's page set) is dropped before
/// any file is removed, so an interrupted removal leaves unreferenced files
/// rather than references to missing records. The page counter is left as is.
pub fn delete_page(
    connection: &DatabaseConnection,
    wiki: &str,
    identifier: &str,
    options: &DeleteOptions,
) -> StoreResult<DeleteReport> {
    let index_path = connection.index_path();
    let mut index = records::load_database_record(&index_path, connection.name())?;
    if index.wiki(wiki).is_none() {
        return Err(StoreError::WikiNotFound {
            database: connection.name().to_string(),
            wiki: wiki.to_string(),
        });
    }

    let (parent, title) = layout::split_identifier(identifier)?;
    let page = read_page(connection, wiki, identifier, ContentMode::Skip)?;

    let mut removed_pages = Vec::new();
    let mut files = Vec::new();
    for node in tree::flatten(slice::from_ref(&page)) {
        removed_pages.push(node.identifier());
        files.push(layout::record_path_for_content(&node.path));
        files.push(node.path.clone());
    }

    let mut amended_parent = None;
    let mut removed_from_index = false;
    match parent.as_deref() {
        Some(parent) => {
            let parent_path = layout::record_path(connection.root(), wiki, parent);
            let mut parent_record = records::load_page_record(&parent_path)?;
            if parent_record.remove_child(&title) {
                amended_parent = Some((parent_path, parent_record));
            }
        }
        None => removed_from_index = index.remove_page(wiki, &title),
    }

    let report = DeleteReport {
        wiki: wiki.to_string(),
        identifier: page.identifier(),
        dry_run: options.dry_run,
        removed_pages,
        removed_files: files.iter().map(|path| normalize_path(path)).collect(),
        unlinked_from_parent: amended_parent.as_ref().and(parent.clone()),
        removed_from_index,
        page_counter: index.page_counter,
    };
    if options.dry_run {
        return Ok(report);
    }

    if let Some((path, record)) = &amended_parent {
        records::save_page_record(path, record)?;
    }
    if removed_from_index {
        records::save_database_record(&index_path, &index)?;
    }

    // Deepest pages first so their directories empty out before the parent's.
    for path in files.iter().rev() {
        remove_file_if_present(path)?;
        if let Some(directory) = subpage_directory(path) {
            remove_empty_dir(&directory);
        }
    }

    info!(
        database = connection.name(),
        wiki,
        identifier,
        pages = report.removed_pages.len(),
        "removed page subtree"
    );
    Ok(report)
}

fn remove_file_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StoreError::io(path, error)),
    }
}

/// `pages/w/A.html` keeps its children under `pages/w/A/`.
fn subpage_directory(content: &Path) -> Option<PathBuf> {
    let name = content.file_name()?.to_str()?;
    let stem = name.strip_suffix(layout::CONTENT_EXTENSION)?;
    Some(content.with_file_name(stem))
}

fn remove_empty_dir(directory: &Path) {
    if directory.is_dir() && fs::remove_dir(directory).is_ok() {
        debug!(path = %directory.display(), "removed empty directory");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::{DeleteOptions, delete_page};
    use crate::error::StoreError;
    use crate::indexer::{AbortOnMissingParent, insert_page};
    use crate::metadata::{read_database_index, read_page, read_wiki_pages};
    use crate::model::{ContentMode, DatabaseConnection, Page};
    use crate::records::load_page_record;
    use crate::runtime::{InitOptions, init_database};

    fn seeded(root: &Path) -> DatabaseConnection {
        let connection = DatabaseConnection::new("main", root);
        init_database(&connection, &InitOptions::default()).expect("init");
        for identifier in ["A", "A/B", "A/B/C", "A/D", "E"] {
            let page = Page::fetched(
                identifier,
                "w",
                format!("https://example.org/{identifier}"),
                "<p>body</p>",
            )
            .expect("page");
            insert_page(&page, &connection, &mut AbortOnMissingParent).expect("insert");
        }
        connection
    }

    #[test]
    fn dry_run_reports_subtree_without_touching_disk() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());

        let report = delete_page(&connection, "w", "A/B", &DeleteOptions { dry_run: true })
            .expect("dry run");
        assert!(report.dry_run);
        assert_eq!(report.removed_pages, vec!["A/B", "A/B/C"]);
        assert_eq!(report.removed_files.len(), 4);
        assert_eq!(report.unlinked_from_parent.as_deref(), Some("A"));
        assert!(temp.path().join("pages/w/A/B/C.html").exists());

        let parent = read_page(&connection, "w", "A", ContentMode::Skip).expect("parent");
        assert_eq!(parent.child_titles(), vec!["B", "D"]);
    }

    #[test]
    fn child_removal_unlinks_from_parent_record() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());

        delete_page(&connection, "w", "A/B", &DeleteOptions::default()).expect("delete");
        assert!(!temp.path().join("pages/w/A/B.html").exists());
        assert!(!temp.path().join("pages/w/A/B.html.toml").exists());
        assert!(!temp.path().join("pages/w/A/B").exists());
        assert!(temp.path().join("pages/w/A/D.html").exists());

        let parent = load_page_record(&temp.path().join("pages/w/A.html.toml")).expect("record");
        assert_eq!(parent.children, vec!["D"]);
        let pages = read_wiki_pages(&connection, "w", ContentMode::Load).expect("read");
        assert_eq!(pages.total_pages(), 3);
    }

    #[test]
    fn root_removal_drops_title_but_keeps_counter() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());

        let report = delete_page(&connection, "w", "A", &DeleteOptions::default()).expect("delete");
        assert!(report.removed_from_index);
        assert_eq!(report.removed_pages, vec!["A", "A/B", "A/B/C", "A/D"]);
        assert!(!temp.path().join("pages/w/A").exists());

        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.wiki("w").expect("wiki").pages, vec!["E"]);
        assert_eq!(metadata.page_counter, 2);
    }

    #[test]
    fn reinserting_deleted_root_does_not_count_twice() {
        let temp = tempdir().expect("tempdir");
        let connection = DatabaseConnection::new("main", temp.path());
        init_database(&connection, &InitOptions::default()).expect("init");
        let page = Page::fetched("A", "w", "https://example.org", "<p>a</p>").expect("page");

        insert_page(&page, &connection, &mut AbortOnMissingParent).expect("insert");
        delete_page(&connection, "w", "A", &DeleteOptions::default()).expect("delete");
        insert_page(&page, &connection, &mut AbortOnMissingParent).expect("reinsert");

        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.page_counter, 1);
        assert_eq!(metadata.wiki("w").expect("wiki").pages, vec!["A"]);
    }

    #[test]
    fn unknown_page_is_a_data_format_error() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let error = delete_page(&connection, "w", "missing", &DeleteOptions::default())
            .expect_err("must fail");
        assert!(matches!(error, StoreError::DataFormat { .. }));
    }

    #[test]
    fn uninitialized_store_is_refused() {
        let temp = tempdir().expect("tempdir");
        let connection = DatabaseConnection::new("main", temp.path());
        let error = delete_page(&connection, "w", "A", &DeleteOptions::default())
            .expect_err("must fail");
        assert!(matches!(error, StoreError::NotInitialized { .. }));
    }
}
