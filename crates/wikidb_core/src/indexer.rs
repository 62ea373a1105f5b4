//! Write path: record one freshly fetched page and keep the parent record and
//! the database index linked to it.
//!
//! Every check and every document amendment happens in memory first. Files are
//! written only once nothing can fail anymore for a reason other than I/O, in
//! this order: parent record, database index, content file, page record.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::layout;
use crate::metadata;
use crate::model::{DatabaseConnection, Page};
use crate::records::{self, PageRecord};

/// Details handed to a [`ParentResolver`] when a child page arrives before its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingParent {
    pub wiki: String,
    pub identifier: String,
    pub parent: String,
    pub expected_record: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentDecision {
    /// Leave the store untouched and fail this insertion.
    Abort,
    /// Index this freshly fetched parent first, then continue with the child.
    Insert(Page),
}

pub trait ParentResolver {
    fn resolve(&mut self, missing: &MissingParent) -> StoreResult<ParentDecision>;
}

impl<F> ParentResolver for F
where
    F: FnMut(&MissingParent) -> StoreResult<ParentDecision>,
{
    fn resolve(&mut self, missing: &MissingParent) -> StoreResult<ParentDecision> {
        self(missing)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnMissingParent;

impl ParentResolver for AbortOnMissingParent {
    fn resolve(&mut self, _missing: &MissingParent) -> StoreResult<ParentDecision> {
        Ok(ParentDecision::Abort)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertReport {
    pub wiki: String,
    pub identifier: String,
    pub content_path: PathBuf,
    pub record_path: PathBuf,
    pub linked_to_parent: bool,
    pub created_wiki: bool,
    pub added_to_index: bool,
    pub page_counter: u64,
    /// Parents indexed on the way, outermost first.
    pub resolved_parents: Vec<String>,
}

/// Durably record one page in a database.
///
/// Retrying is safe: titles are never duplicated, the counter only moves for
/// a new top-level title, and existing children of the page's own record are kept.
pub fn insert_page(
    page: &Page,
    connection: &DatabaseConnection,
    resolver: &mut dyn ParentResolver,
) -> StoreResult<InsertReport> {
    let index_path = connection.index_path();
    if !index_path.exists() {
        return Err(StoreError::NotInitialized {
            database: connection.name().to_string(),
            path: index_path,
        });
    }

    layout::validate_wiki_name(&page.wiki)?;
    layout::validate_title(&page.title)?;
    let identifier = page.identifier();
    layout::split_identifier(&identifier)?;

    let relative_path = finalize_relative_path(connection.root(), page, &identifier)?;
    let content_path = layout::resolve_stored_path(connection.root(), &relative_path);
    let record_path = layout::record_path_for_content(&content_path);

    let mut resolved_parents = Vec::new();
    let mut linked_to_parent = false;
    let mut amended_parent = None;
    if let Some(parent) = page.parent_identifier() {
        let parent_record_path = layout::parent_record_path(&content_path).ok_or_else(|| {
            StoreError::data_format(&content_path, "page path has no parent directory")
        })?;

        if !parent_record_path.exists() {
            let missing = MissingParent {
                wiki: page.wiki.clone(),
                identifier: identifier.clone(),
                parent: parent.to_string(),
                expected_record: parent_record_path.clone(),
            };
            match resolver.resolve(&missing)? {
                ParentDecision::Abort => {
                    return Err(StoreError::MissingParent {
                        identifier,
                        parent: missing.parent,
                        expected_record: missing.expected_record,
                    });
                }
                ParentDecision::Insert(parent_page) => {
                    if parent_page.identifier() != parent || parent_page.wiki != page.wiki {
                        return Err(StoreError::InvalidTitle {
                            identifier: parent_page.identifier(),
                            reason: format!(
                                "resolver supplied a different page than parent \"{parent}\" in wiki \"{}\"",
                                page.wiki
                            ),
                        });
                    }
                    debug!(wiki = %page.wiki, parent, "indexing missing parent first");
                    let report = insert_page(&parent_page, connection, resolver)?;
                    resolved_parents.extend(report.resolved_parents);
                    resolved_parents.push(report.identifier);
                }
            }
        }

        let mut parent_record = records::load_page_record(&parent_record_path)?;
        let (grandparent, parent_title) = layout::split_identifier(parent)?;
        metadata::check_record_identity(
            &parent_record_path,
            &parent_record,
            grandparent.as_deref(),
            &parent_title,
        )?;
        if parent_record.add_child(&page.title) {
            linked_to_parent = true;
            amended_parent = Some((parent_record_path, parent_record));
        }
    }

    let mut index = records::load_database_record(&index_path, connection.name())?;
    let created_wiki = index.ensure_wiki(&page.wiki);
    let added_to_index = page.is_root() && index.insert_page(&page.wiki, &page.title);

    let children = if record_path.exists() {
        records::load_page_record(&record_path)?.children
    } else {
        Vec::new()
    };
    let record = PageRecord {
        name: page.title.clone(),
        parent: page.parent_identifier().unwrap_or_default().to_string(),
        url: page.url.clone(),
        path: relative_path,
        children,
    };

    if let Some((path, parent_record)) = &amended_parent {
        records::save_page_record(path, parent_record)?;
    }
    if created_wiki || added_to_index {
        records::save_database_record(&index_path, &index)?;
    }
    records::write_content(&content_path, &page.content)?;
    records::save_page_record(&record_path, &record)?;

    info!(
        database = connection.name(),
        wiki = %page.wiki,
        identifier = %identifier,
        added_to_index,
        linked_to_parent,
        page_counter = index.page_counter,
        "indexed page"
    );

    Ok(InsertReport {
        wiki: page.wiki.clone(),
        identifier,
        content_path,
        record_path,
        linked_to_parent,
        created_wiki,
        added_to_index,
        page_counter: index.page_counter,
        resolved_parents,
    })
}

/// Turn the page's storage path into its root-relative form and make sure it
/// agrees with the identifier, since the parent record is located from it.
fn finalize_relative_path(root: &Path, page: &Page, identifier: &str) -> StoreResult<String> {
    let expected = layout::relative_content_path(&page.wiki, identifier);
    if page.path.as_os_str().is_empty() {
        return Ok(expected);
    }

    let relative = if page.path.is_absolute() {
        page.path.strip_prefix(root).map_err(|_| StoreError::InvalidTitle {
            identifier: identifier.to_string(),
            reason: format!(
                "storage path {} is outside the database root",
                page.path.display()
            ),
        })?
    } else {
        page.path.as_path()
    };
    let normalized = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    if normalized != expected {
        return Err(StoreError::InvalidTitle {
            identifier: identifier.to_string(),
            reason: format!("storage path \"{normalized}\" does not match expected \"{expected}\""),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;
    use walkdir::WalkDir;

    use super::{AbortOnMissingParent, MissingParent, ParentDecision, insert_page};
    use crate::error::{StoreError, StoreResult};
    use crate::metadata::{read_database_index, read_page, read_wiki_pages};
    use crate::model::{ContentMode, DatabaseConnection, Page, SKIPPED_CONTENT_PLACEHOLDER};
    use crate::records::{load_page_record, save_page_record};
    use crate::runtime::{InitOptions, init_database};

    fn database(root: &Path) -> DatabaseConnection {
        let connection = DatabaseConnection::new("main", root);
        init_database(&connection, &InitOptions::default()).expect("init");
        connection
    }

    fn fetched(identifier: &str) -> Page {
        Page::fetched(
            identifier,
            "w",
            format!("https://example.org/wiki/{identifier}"),
            format!("<h1>{identifier}</h1>"),
        )
        .expect("fetched page")
    }

    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .map(|entry| entry.expect("walk"))
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                (
                    entry.path().to_string_lossy().to_string(),
                    fs::read(entry.path()).expect("read"),
                )
            })
            .collect()
    }

    #[test]
    fn root_then_child_scenario() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());

        let root = insert_page(&fetched("intro"), &connection, &mut AbortOnMissingParent)
            .expect("insert root");
        assert!(root.added_to_index);
        assert!(root.created_wiki);
        assert_eq!(root.page_counter, 1);

        let child = insert_page(&fetched("intro/sub"), &connection, &mut AbortOnMissingParent)
            .expect("insert child");
        assert!(child.linked_to_parent);
        assert!(!child.added_to_index);
        assert_eq!(child.page_counter, 1);

        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.page_counter, 1);
        assert_eq!(metadata.wiki("w").expect("wiki").pages, vec!["intro"]);

        let intro_record =
            load_page_record(&temp.path().join("pages/w/intro.html.toml")).expect("record");
        assert_eq!(intro_record.children, vec!["sub"]);

        let pages = read_wiki_pages(&connection, "w", ContentMode::Load).expect("read");
        assert_eq!(pages.len(), 1);
        let intro = &pages.roots()[0];
        assert_eq!(intro.title, "intro");
        assert_eq!(intro.children.len(), 1);
        assert_eq!(intro.children[0].title, "sub");
        assert_eq!(intro.children[0].parent.as_deref(), Some("intro"));
    }

    #[test]
    fn inserting_twice_leaves_identical_state() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        insert_page(&fetched("intro"), &connection, &mut AbortOnMissingParent).expect("root");
        insert_page(&fetched("intro/sub"), &connection, &mut AbortOnMissingParent).expect("child");
        let once = snapshot(temp.path());

        insert_page(&fetched("intro"), &connection, &mut AbortOnMissingParent).expect("root again");
        insert_page(&fetched("intro/sub"), &connection, &mut AbortOnMissingParent)
            .expect("child again");
        let twice = snapshot(temp.path());

        assert_eq!(once, twice);
    }

    #[test]
    fn counter_tracks_distinct_top_level_titles() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let titles = ["alpha", "beta", "gamma", "delta"];
        for attempt in 0..3 {
            for title in titles.iter().take(attempt + 2) {
                insert_page(&fetched(title), &connection, &mut AbortOnMissingParent)
                    .expect("insert");
            }
        }
        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.page_counter, titles.len() as u64);
        assert_eq!(
            metadata.wiki("w").expect("wiki").pages,
            vec!["alpha", "beta", "gamma", "delta"]
        );
    }

    #[test]
    fn parent_lists_child_exactly_once() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        insert_page(&fetched("A"), &connection, &mut AbortOnMissingParent).expect("parent");
        for _ in 0..3 {
            insert_page(&fetched("A/B"), &connection, &mut AbortOnMissingParent).expect("child");
        }
        let record = load_page_record(&temp.path().join("pages/w/A.html.toml")).expect("record");
        assert_eq!(record.children, vec!["B"]);

        let tree = read_page(&connection, "w", "A", ContentMode::Skip).expect("tree");
        assert_eq!(tree.child_titles(), vec!["B"]);
    }

    #[test]
    fn declined_parent_resolution_writes_nothing() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let before = snapshot(temp.path());

        let error = insert_page(&fetched("A/B"), &connection, &mut AbortOnMissingParent)
            .expect_err("must fail");
        match error {
            StoreError::MissingParent {
                identifier, parent, ..
            } => {
                assert_eq!(identifier, "A/B");
                assert_eq!(parent, "A");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(before, snapshot(temp.path()));
        assert!(!temp.path().join("pages/w/A.html.toml").exists());
        assert!(!temp.path().join("pages/w/A/B.html").exists());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let page = fetched("intro");
        insert_page(&page, &connection, &mut AbortOnMissingParent).expect("insert");
        insert_page(&fetched("intro/sub"), &connection, &mut AbortOnMissingParent).expect("child");

        let loaded = read_page(&connection, "w", "intro", ContentMode::Load).expect("load");
        assert_eq!(loaded.title, page.title);
        assert_eq!(loaded.parent, page.parent);
        assert_eq!(loaded.url, page.url);
        assert_eq!(loaded.content, page.content);
        assert_eq!(loaded.child_titles(), vec!["sub"]);
        assert_eq!(loaded.path, temp.path().join("pages").join("w").join("intro.html"));

        let skipped = read_page(&connection, "w", "intro", ContentMode::Skip).expect("skip");
        assert_eq!(skipped.content, SKIPPED_CONTENT_PLACEHOLDER);
        assert_eq!(skipped.url, page.url);
    }

    #[test]
    fn resolver_indexes_missing_parent_chain() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let mut asked = Vec::new();
        let mut resolver = |missing: &MissingParent| -> StoreResult<ParentDecision> {
            asked.push(missing.parent.clone());
            Ok(ParentDecision::Insert(fetched(&missing.parent)))
        };

        let report = insert_page(&fetched("A/B/C"), &connection, &mut resolver).expect("insert");
        assert_eq!(report.resolved_parents, vec!["A", "A/B"]);
        assert_eq!(asked, vec!["A/B", "A"]);

        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.wiki("w").expect("wiki").pages, vec!["A"]);
        assert_eq!(metadata.page_counter, 1);

        let tree = read_page(&connection, "w", "A", ContentMode::Load).expect("tree");
        assert_eq!(tree.children[0].title, "B");
        assert_eq!(tree.children[0].children[0].title, "C");
        assert_eq!(tree.children[0].children[0].content, "<h1>A/B/C</h1>");
    }

    #[test]
    fn resolver_supplying_wrong_page_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let before = snapshot(temp.path());
        let mut resolver =
            |_: &MissingParent| -> StoreResult<ParentDecision> { Ok(ParentDecision::Insert(fetched("Z"))) };
        let error = insert_page(&fetched("A/B"), &connection, &mut resolver).expect_err("must fail");
        assert!(matches!(error, StoreError::InvalidTitle { .. }));
        assert_eq!(before, snapshot(temp.path()));
    }

    #[test]
    fn uninitialized_database_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let connection = DatabaseConnection::new("main", temp.path());
        let error = insert_page(&fetched("intro"), &connection, &mut AbortOnMissingParent)
            .expect_err("must fail");
        assert!(matches!(error, StoreError::NotInitialized { .. }));
        assert!(!temp.path().join("pages").exists());
    }

    #[test]
    fn reinserting_parent_keeps_recorded_children() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        insert_page(&fetched("A"), &connection, &mut AbortOnMissingParent).expect("parent");
        insert_page(&fetched("A/B"), &connection, &mut AbortOnMissingParent).expect("child");

        let mut refreshed = fetched("A");
        refreshed.content = "<h1>updated</h1>".to_string();
        insert_page(&refreshed, &connection, &mut AbortOnMissingParent).expect("refetch");

        let tree = read_page(&connection, "w", "A", ContentMode::Load).expect("tree");
        assert_eq!(tree.content, "<h1>updated</h1>");
        assert_eq!(tree.child_titles(), vec!["B"]);
    }

    #[test]
    fn malformed_parent_record_aborts_without_writes() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        insert_page(&fetched("A"), &connection, &mut AbortOnMissingParent).expect("parent");
        fs::write(temp.path().join("pages/w/A.html.toml"), "name = \"A\"\n").expect("corrupt");
        let before = snapshot(temp.path());

        let error = insert_page(&fetched("A/B"), &connection, &mut AbortOnMissingParent)
            .expect_err("must fail");
        assert!(matches!(error, StoreError::DataFormat { .. }));
        assert_eq!(before, snapshot(temp.path()));
    }

    #[test]
    fn parent_record_with_wrong_parent_field_aborts_without_writes() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        insert_page(&fetched("A"), &connection, &mut AbortOnMissingParent).expect("parent");
        let parent_path = temp.path().join("pages/w/A.html.toml");
        let mut parent = load_page_record(&parent_path).expect("record");
        parent.parent = "Z".to_string();
        save_page_record(&parent_path, &parent).expect("save");
        let before = snapshot(temp.path());

        let error = insert_page(&fetched("A/B"), &connection, &mut AbortOnMissingParent)
            .expect_err("must fail");
        assert!(matches!(error, StoreError::DataFormat { .. }));
        assert_eq!(before, snapshot(temp.path()));
    }

    #[test]
    fn empty_parent_is_indexed_as_top_level() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let mut page = fetched("intro");
        page.parent = Some(String::new());

        let report =
            insert_page(&page, &connection, &mut AbortOnMissingParent).expect("insert");
        assert!(report.added_to_index);
        assert!(!report.linked_to_parent);
        assert_eq!(report.page_counter, 1);

        let metadata = read_database_index(&connection).expect("index");
        assert_eq!(metadata.wiki("w").expect("wiki").pages, vec!["intro"]);
        let record = load_page_record(&temp.path().join("pages/w/intro.html.toml")).expect("record");
        assert_eq!(record.parent, "");
    }

    #[test]
    fn mismatched_storage_path_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let connection = database(temp.path());
        let mut page = fetched("intro");
        page.path = "pages/w/elsewhere.html".into();
        let error =
            insert_page(&page, &connection, &mut AbortOnMissingParent).expect_err("must fail");
        assert!(matches!(error, StoreError::InvalidTitle { .. }));

        let mut absolute = fetched("intro");
        absolute.path = temp.path().join("pages").join("w").join("intro.html");
        insert_page(&absolute, &connection, &mut AbortOnMissingParent).expect("absolute path");
    }
}
