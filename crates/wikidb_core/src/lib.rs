pub mod check;
pub mod config;
pub mod delete;
pub mod error;
pub mod indexer;
pub mod layout;
pub mod metadata;
pub mod model;
pub mod query;
pub mod records;
pub mod runtime;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use model::{ContentMode, DatabaseConnection, Page, WikiReference};
pub use tree::PageCollection;
