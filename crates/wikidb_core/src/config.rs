use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::layout;
use crate::model::DatabaseConnection;

pub const URL_PLACEHOLDER: &str = "{}";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
    #[serde(default)]
    pub wikis: Vec<WikiConnection>,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub name: String,
    pub root: String,
}

/// A remote wiki. `url` is a template where `{}` stands for the page identifier.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WikiConnection {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Defaults {
    pub database: Option<String>,
    pub wiki: Option<String>,
}

/// The database and wiki a command operates on, passed explicitly into the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub database: DatabaseConnection,
    pub wiki: WikiConnection,
}

impl WikiConnection {
    pub fn page_url(&self, identifier: &str) -> String {
        self.url.replace(URL_PLACEHOLDER, identifier)
    }

    /// URL template as shown in listings.
    pub fn display_url(&self) -> String {
        self.url.replace(URL_PLACEHOLDER, "<page>")
    }
}

impl DatabaseEntry {
    pub fn connection(&self) -> DatabaseConnection {
        DatabaseConnection::new(self.name.clone(), expand_home(&self.root))
    }
}

impl GlobalConfig {
    pub fn database_connections(&self) -> Vec<DatabaseConnection> {
        self.databases.iter().map(DatabaseEntry::connection).collect()
    }

    /// Resolve a database by name: explicit name > `[defaults].database` > first configured.
    pub fn database(&self, name: Option<&str>) -> Result<DatabaseConnection> {
        let wanted = name.or(self.defaults.database.as_deref());
        let entry = match wanted {
            Some(wanted) => self
                .databases
                .iter()
                .find(|entry| entry.name == wanted)
                .ok_or_else(|| {
                    anyhow::anyhow!("database \"{wanted}\" is not configured in the config file")
                })?,
            None => self
                .databases
                .first()
                .ok_or_else(|| anyhow::anyhow!("no databases are configured"))?,
        };
        Ok(entry.connection())
    }

    pub fn wiki(&self, name: Option<&str>) -> Result<&WikiConnection> {
        let wanted = name.or(self.defaults.wiki.as_deref());
        match wanted {
            Some(wanted) => self
                .wikis
                .iter()
                .find(|wiki| wiki.name == wanted)
                .ok_or_else(|| {
                    anyhow::anyhow!("wiki \"{wanted}\" is not configured in the config file")
                }),
            None => self
                .wikis
                .first()
                .ok_or_else(|| anyhow::anyhow!("no wikis are configured")),
        }
    }

    pub fn select(&self, database: Option<&str>, wiki: Option<&str>) -> Result<Selection> {
        Ok(Selection {
            database: self.database(database)?,
            wiki: self.wiki(wiki)?.clone(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for database in &self.databases {
            if database.name.trim().is_empty() {
                bail!("database name cannot be empty");
            }
            if database.root.trim().is_empty() {
                bail!("database \"{}\" has an empty root", database.name);
            }
            if !seen.insert(database.name.as_str()) {
                bail!("database \"{}\" is configured more than once", database.name);
            }
        }

        let mut seen = HashSet::new();
        for wiki in &self.wikis {
            layout::validate_wiki_name(&wiki.name)
                .with_context(|| format!("invalid wiki name \"{}\"", wiki.name))?;
            if !wiki.url.contains(URL_PLACEHOLDER) {
                bail!(
                    "wiki \"{}\" url must contain `{URL_PLACEHOLDER}` where the page title goes",
                    wiki.name
                );
            }
            if !seen.insert(wiki.name.as_str()) {
                bail!("wiki \"{}\" is configured more than once", wiki.name);
            }
        }
        Ok(())
    }
}

/// Load and validate the global config file.
pub fn load_config(config_path: &Path) -> Result<GlobalConfig> {
    if !config_path.exists() {
        bail!(
            "could not find config file at {}",
            layout::normalize_path(config_path)
        );
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: GlobalConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    Ok(parsed)
}

pub fn expand_home(raw: &str) -> PathBuf {
    expand_home_with(raw, env::var_os("HOME").map(PathBuf::from).as_deref())
}

fn expand_home_with(raw: &str, home: Option<&Path>) -> PathBuf {
    let trimmed = raw.trim();
    match (trimmed.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(trimmed),
    }
}
