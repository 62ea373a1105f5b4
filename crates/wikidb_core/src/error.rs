use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by the store's read and write paths.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database index record is expected but absent.
    #[error("database \"{database}\" has not been initialized (missing {})", path.display())]
    NotInitialized { database: String, path: PathBuf },

    /// An index or page record exists but is malformed, or references a record that does not exist.
    #[error("malformed metadata in {}: {message}", path.display())]
    DataFormat { path: PathBuf, message: String },

    /// A child page was offered for insertion but its parent has no record.
    #[error(
        "page \"{identifier}\" cannot be indexed without its parent \"{parent}\" (missing {})",
        expected_record.display()
    )]
    MissingParent {
        identifier: String,
        parent: String,
        expected_record: PathBuf,
    },

    #[error("wiki \"{wiki}\" is not indexed in database \"{database}\"")]
    WikiNotFound { database: String, wiki: String },

    #[error("invalid page identifier \"{identifier}\": {reason}")]
    InvalidTitle { identifier: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn data_format(path: &Path, message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short remediation hint shown by front-ends next to the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NotInitialized { .. } => {
                "the database may not be initialized; run `wikidb init -D <database>` first"
            }
            Self::DataFormat { .. } => {
                "a metadata file is malformed or references a missing record; fix it manually or run `wikidb check`"
            }
            Self::MissingParent { .. } => {
                "index the parent page first, or rerun with `--on-missing-parent prompt`"
            }
            Self::WikiNotFound { .. } => "list indexed wikis with `wikidb list --wikis`",
            Self::InvalidTitle { .. } => {
                "page titles must be non-empty and use `/` only to separate parent and child"
            }
            Self::Io { .. } => "check that the database root exists and is writable",
        }
    }
}
