use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::layout::{self, normalize_path};
use crate::model::DatabaseConnection;
use crate::records::{DatabaseRecord, save_database_record};

pub const CONFIG_ENV: &str = "WIKIDB_CONFIG";
pub const USER_CONFIG_RELATIVE: &str = ".config/wikidb/config.toml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/wikidb/config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    User,
    System,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::User => "user",
            Self::System => "system",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub home: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let home = env::var_os("HOME").map(PathBuf::from);
        Ok(Self { cwd, home })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigPath {
    pub path: PathBuf,
    pub source: ValueSource,
}

impl ResolvedConfigPath {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({})\nconfig_exists={}",
            normalize_path(&self.path),
            self.source.as_str(),
            self.path.exists()
        )
    }
}

/// Config lookup order: flag > `WIKIDB_CONFIG` > user config > system config.
pub fn resolve_config_path(
    context: &ResolutionContext,
    flag: Option<&Path>,
) -> Result<ResolvedConfigPath> {
    resolve_config_path_with_lookup(context, flag, |key| env::var(key).ok(), |path| {
        path.exists()
    })
}

fn resolve_config_path_with_lookup<F, E>(
    context: &ResolutionContext,
    flag: Option<&Path>,
    lookup_env: F,
    exists: E,
) -> Result<ResolvedConfigPath>
where
    F: Fn(&str) -> Option<String>,
    E: Fn(&Path) -> bool,
{
    if let Some(path) = flag {
        return Ok(ResolvedConfigPath {
            path: absolutize(path, &context.cwd),
            source: ValueSource::Flag,
        });
    }

    if let Some(value) = lookup_env(CONFIG_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(ResolvedConfigPath {
                path: absolutize(Path::new(trimmed), &context.cwd),
                source: ValueSource::Env,
            });
        }
    }

    let user_path = context
        .home
        .as_deref()
        .map(|home| home.join(USER_CONFIG_RELATIVE));
    if let Some(user_path) = user_path.as_deref()
        && exists(user_path)
    {
        return Ok(ResolvedConfigPath {
            path: user_path.to_path_buf(),
            source: ValueSource::User,
        });
    }

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    if exists(&system_path) {
        return Ok(ResolvedConfigPath {
            path: system_path,
            source: ValueSource::System,
        });
    }

    let fallback = user_path
        .ok_or_else(|| anyhow::anyhow!("HOME is not set and no config path was given"))?;
    Ok(ResolvedConfigPath {
        path: fallback,
        source: ValueSource::Default,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub database: String,
    pub index_path: PathBuf,
    pub created_dirs: Vec<PathBuf>,
    pub wrote_index: bool,
}

/// Create `pages/` and a fresh, empty index for a configured database.
pub fn init_database(
    connection: &DatabaseConnection,
    options: &InitOptions,
) -> StoreResult<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [
        connection.root().to_path_buf(),
        layout::pages_dir(connection.root()),
    ] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|error| StoreError::io(&dir, error))?;
            created_dirs.push(dir);
        }
    }

    let index_path = connection.index_path();
    let wrote_index = if index_path.exists() && !options.force {
        false
    } else {
        save_database_record(&index_path, &DatabaseRecord::new(connection.name()))?;
        info!(database = connection.name(), path = %index_path.display(), "initialized database");
        true
    };

    Ok(InitReport {
        database: connection.name().to_string(),
        index_path,
        created_dirs,
        wrote_index,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
