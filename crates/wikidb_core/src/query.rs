//! Listings over configured databases, indexed wikis and stored pages.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::config::WikiConnection;
use crate::error::{StoreError, StoreResult};
use crate::layout::normalize_path;
use crate::metadata::{read_database_index, read_page, read_wiki_pages, refresh_connection};
use crate::model::{ContentMode, DatabaseConnection, Page, WikiReference};
use crate::tree;

pub trait Column: Copy + PartialEq + 'static {
    const ALL: &'static [Self];

    fn key(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatabaseColumn {
    Name,
    Path,
    PageCounter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WikiColumn {
    Name,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageColumn {
    Name,
    Url,
    Wiki,
    Path,
}

impl Column for DatabaseColumn {
    const ALL: &'static [Self] = &[Self::Name, Self::Path, Self::PageCounter];

    fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Path => "path",
            Self::PageCounter => "pageCounter",
        }
    }
}

impl Column for WikiColumn {
    const ALL: &'static [Self] = &[Self::Name, Self::Url];

    fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Url => "url",
        }
    }
}

impl Column for PageColumn {
    const ALL: &'static [Self] = &[Self::Name, Self::Url, Self::Wiki, Self::Path];

    fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Url => "url",
            Self::Wiki => "wiki",
            Self::Path => "path",
        }
    }
}

fn parse_column<C: Column>(kind: &str, raw: &str) -> Result<C> {
    let wanted = raw.trim();
    if let Some(column) = C::ALL
        .iter()
        .copied()
        .find(|column| column.key().eq_ignore_ascii_case(wanted))
    {
        return Ok(column);
    }
    let known = C::ALL
        .iter()
        .map(|column| column.key())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("unknown {kind} column \"{wanted}\" (expected one of: {known})")
}

impl FromStr for DatabaseColumn {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        parse_column("database", raw)
    }
}

impl FromStr for WikiColumn {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        parse_column("wiki", raw)
    }
}

impl FromStr for PageColumn {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        parse_column("page", raw)
    }
}

/// Explicit columns win, then info mode (every column), then `name` alone.
pub fn select_columns<C: Column>(requested: &[C], info: bool) -> Vec<C> {
    if !requested.is_empty() {
        requested.to_vec()
    } else if info {
        C::ALL.to_vec()
    } else {
        C::ALL[..1].to_vec()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColumnSelection {
    pub databases: Vec<DatabaseColumn>,
    pub wikis: Vec<WikiColumn>,
    pub pages: Vec<PageColumn>,
}

impl ColumnSelection {
    pub fn resolve(
        databases: &[DatabaseColumn],
        wikis: &[WikiColumn],
        pages: &[PageColumn],
        info: bool,
    ) -> Self {
        Self {
            databases: select_columns(databases, info),
            wikis: select_columns(wikis, info),
            pages: select_columns(pages, info),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Database,
    Wiki,
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub column: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub kind: RowKind,
    pub depth: usize,
    pub fields: Vec<Field>,
}

impl Row {
    fn new<C: Column>(
        kind: RowKind,
        depth: usize,
        columns: &[C],
        value: impl Fn(C) -> String,
    ) -> Self {
        Self {
            kind,
            depth,
            fields: columns
                .iter()
                .map(|&column| Field {
                    column: column.key(),
                    value: value(column),
                })
                .collect(),
        }
    }

    pub fn value(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.column == column)
            .map(|field| field.value.as_str())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", "  ".repeat(self.depth))?;
        match self.fields.as_slice() {
            [single] => write!(formatter, "{}", single.value),
            fields => {
                let rendered = fields
                    .iter()
                    .map(|field| format!("{}={}", field.column, field.value))
                    .collect::<Vec<_>>()
                    .join("  ");
                write!(formatter, "{rendered}")
            }
        }
    }
}

pub fn render_rows(rows: &[Row]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out
}

fn database_row(
    connection: &DatabaseConnection,
    counter: Option<u64>,
    depth: usize,
    columns: &[DatabaseColumn],
) -> Row {
    Row::new(RowKind::Database, depth, columns, |column| match column {
        DatabaseColumn::Name => connection.name().to_string(),
        DatabaseColumn::Path => normalize_path(connection.root()),
        DatabaseColumn::PageCounter => counter
            .map(|counter| counter.to_string())
            .unwrap_or_else(|| "uninitialized".to_string()),
    })
}

fn wiki_row(
    reference: &WikiReference,
    configured: &[WikiConnection],
    depth: usize,
    columns: &[WikiColumn],
) -> Row {
    Row::new(RowKind::Wiki, depth, columns, |column| match column {
        WikiColumn::Name => reference.name.clone(),
        WikiColumn::Url => configured
            .iter()
            .find(|wiki| wiki.name == reference.name)
            .map(WikiConnection::display_url)
            .unwrap_or_default(),
    })
}

fn page_row(page: &Page, depth: usize, columns: &[PageColumn]) -> Row {
    Row::new(RowKind::Page, depth, columns, |column| match column {
        PageColumn::Name => page.identifier(),
        PageColumn::Url => page.url.clone(),
        PageColumn::Wiki => page.wiki.clone(),
        PageColumn::Path => normalize_path(&page.path),
    })
}

/// Index counter, or `None` when the database has not been initialized yet.
fn indexed_counter(connection: &DatabaseConnection) -> StoreResult<Option<u64>> {
    match refresh_connection(connection) {
        Ok(refreshed) => Ok(Some(refreshed.page_counter())),
        Err(StoreError::NotInitialized { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

pub fn list_databases(
    connections: &[DatabaseConnection],
    columns: &[DatabaseColumn],
) -> StoreResult<Vec<Row>> {
    connections
        .iter()
        .map(|connection| {
            let counter = if columns.contains(&DatabaseColumn::PageCounter) {
                indexed_counter(connection)?
            } else {
                Some(connection.page_counter())
            };
            Ok(database_row(connection, counter, 0, columns))
        })
        .collect()
}

/// Wikis indexed in one database; URLs come from the configured wiki of the same name.
pub fn list_wikis(
    connection: &DatabaseConnection,
    configured: &[WikiConnection],
    columns: &[WikiColumn],
) -> StoreResult<Vec<Row>> {
    let metadata = read_database_index(connection)?;
    Ok(metadata
        .wikis
        .iter()
        .map(|reference| wiki_row(reference, configured, 0, columns))
        .collect())
}

/// Every page of one wiki in traversal order, indented by depth.
pub fn list_pages(
    connection: &DatabaseConnection,
    wiki: &str,
    columns: &[PageColumn],
) -> StoreResult<Vec<Row>> {
    let pages = read_wiki_pages(connection, wiki, ContentMode::Skip)?;
    Ok(pages
        .walk()
        .map(|(depth, page)| page_row(page, depth, columns))
        .collect())
}

/// Databases, their wikis and every stored page as one indented tree.
///
/// Uninitialized databases are listed without wikis.
pub fn list_tree(
    connections: &[DatabaseConnection],
    configured: &[WikiConnection],
    columns: &ColumnSelection,
) -> StoreResult<Vec<Row>> {
    let mut rows = Vec::new();
    for connection in connections {
        let metadata = match read_database_index(connection) {
            Ok(metadata) => metadata,
            Err(StoreError::NotInitialized { .. }) => {
                rows.push(database_row(connection, None, 0, &columns.databases));
                continue;
            }
            Err(error) => return Err(error),
        };
        rows.push(database_row(
            connection,
            Some(metadata.page_counter),
            0,
            &columns.databases,
        ));
        for reference in &metadata.wikis {
            rows.push(wiki_row(reference, configured, 1, &columns.wikis));
            let pages = read_wiki_pages(connection, &reference.name, ContentMode::Skip)?;
            rows.extend(
                pages
                    .walk()
                    .map(|(depth, page)| page_row(page, depth + 2, &columns.pages)),
            );
        }
    }
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub wiki: String,
    pub identifier: String,
    pub title: String,
    pub parent: Option<String>,
    pub depth: usize,
    pub url: String,
    pub path: String,
    pub children: Vec<String>,
    pub subtree_pages: usize,
}

impl PageInfo {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("wiki: {}", self.wiki),
            format!("identifier: {}", self.identifier),
            format!("title: {}", self.title),
            format!("parent: {}", self.parent.as_deref().unwrap_or("<none>")),
            format!("depth: {}", self.depth),
            format!("url: {}", self.url),
            format!("path: {}", self.path),
            format!("subtree_pages: {}", self.subtree_pages),
        ];
        if self.children.is_empty() {
            lines.push("children: <none>".to_string());
        } else {
            lines.push("children:".to_string());
            lines.extend(self.children.iter().map(|child| format!("  {child}")));
        }
        lines.join("\n")
    }
}

pub fn page_info(
    connection: &DatabaseConnection,
    wiki: &str,
    identifier: &str,
) -> StoreResult<PageInfo> {
    let page = read_page(connection, wiki, identifier, ContentMode::Skip)?;
    let subtree_pages = tree::flatten(std::slice::from_ref(&page)).count();
    Ok(PageInfo {
        identifier: page.identifier(),
        depth: page.depth(),
        children: page
            .child_titles()
            .into_iter()
            .map(str::to_string)
            .collect(),
        wiki: page.wiki,
        title: page.title,
        parent: page.parent,
        url: page.url,
        path: normalize_path(&page.path),
        subtree_pages,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::indexer::{AbortOnMissingParent, insert_page};
    use crate::runtime::{InitOptions, init_database};

    fn seeded(root: &Path) -> DatabaseConnection {
        let connection = DatabaseConnection::new("main", root);
        init_database(&connection, &InitOptions::default()).expect("init");
        for identifier in ["R1", "R1/C1", "R1/C2", "R1/C2/G1", "R2"] {
            let page = Page::fetched(
                identifier,
                "w",
                format!("https://example.org/{identifier}"),
                "<p>x</p>",
            )
            .expect("page");
            insert_page(&page, &connection, &mut AbortOnMissingParent).expect("insert");
        }
        connection
    }

    fn configured() -> Vec<WikiConnection> {
        vec![WikiConnection {
            name: "w".to_string(),
            url: "https://example.org/{}".to_string(),
        }]
    }

    #[test]
    fn column_selection_prefers_explicit_then_info() {
        assert_eq!(select_columns::<PageColumn>(&[], false), vec![PageColumn::Name]);
        assert_eq!(select_columns::<PageColumn>(&[], true), PageColumn::ALL.to_vec());
        assert_eq!(
            select_columns(&[PageColumn::Url], true),
            vec![PageColumn::Url]
        );
    }

    #[test]
    fn columns_parse_case_insensitively() {
        assert_eq!(
            "pagecounter".parse::<DatabaseColumn>().expect("parse"),
            DatabaseColumn::PageCounter
        );
        assert_eq!("URL".parse::<WikiColumn>().expect("parse"), WikiColumn::Url);
        let error = "size".parse::<PageColumn>().expect_err("must fail");
        assert!(error.to_string().contains("expected one of"));
    }

    #[test]
    fn pages_are_listed_in_pre_order_with_depth() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let rows = list_pages(&connection, "w", &[PageColumn::Name]).expect("list");
        let rendered = render_rows(&rows);
        assert_eq!(rendered, "R1\n  R1/C1\n  R1/C2\n    R1/C2/G1\nR2\n");
    }

    #[test]
    fn tree_nests_wikis_and_pages_under_databases() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let missing = DatabaseConnection::new("fresh", temp.path().join("fresh"));
        let columns = ColumnSelection::resolve(&[], &[WikiColumn::Name, WikiColumn::Url], &[], false);

        let rows = list_tree(&[connection, missing], &configured(), &columns).expect("tree");
        assert_eq!(rows[0].kind, RowKind::Database);
        assert_eq!(rows[1].to_string(), "  name=w  url=https://example.org/<page>");
        assert_eq!(rows[2].to_string(), "    R1");
        assert_eq!(rows[5].to_string(), "        R1/C2/G1");
        assert_eq!(rows.last().map(|row| row.kind), Some(RowKind::Database));
        assert_eq!(rows.len(), 1 + 1 + 5 + 1);
    }

    #[test]
    fn database_info_rows_read_counter_from_index() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let fresh = DatabaseConnection::new("fresh", temp.path().join("fresh"));
        let columns = select_columns::<DatabaseColumn>(&[], true);

        let rows = list_databases(&[connection, fresh], &columns).expect("list");
        assert_eq!(rows[0].value("pageCounter"), Some("2"));
        assert_eq!(rows[1].value("pageCounter"), Some("uninitialized"));
        assert_eq!(rows[1].value("name"), Some("fresh"));
    }

    #[test]
    fn wikis_without_configuration_have_empty_url() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let rows = list_wikis(&connection, &[], &[WikiColumn::Name, WikiColumn::Url]).expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("url"), Some(""));
    }

    #[test]
    fn page_info_reports_children_without_content() {
        let temp = tempdir().expect("tempdir");
        let connection = seeded(temp.path());
        let info = page_info(&connection, "w", "R1/C2").expect("info");
        assert_eq!(info.title, "C2");
        assert_eq!(info.parent.as_deref(), Some("R1"));
        assert_eq!(info.depth, 1);
        assert_eq!(info.children, vec!["G1"]);
        assert_eq!(info.subtree_pages, 2);
        assert!(info.path.ends_with("pages/w/R1/C2.html"));
        assert!(info.render().contains("url: https://example.org/R1/C2"));
    }
}
