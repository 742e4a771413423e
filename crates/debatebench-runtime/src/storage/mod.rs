//! Persistence for exchanges and judgments.
//!
//! Judgments are write-once. [`Storage::insert_judgment`] is an atomic
//! conditional create, so two collectors racing on the same
//! `(config, exchange, run)` slot never both write.

use async_trait::async_trait;
use debatebench_core::{EvaluatorConfig, Exchange, Judgment, JudgmentKey};
use thiserror::Error;

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;

/// Errors from storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record id '{0}': ids may not contain path separators")]
    InvalidId(String),

    #[error("Cannot store incomplete exchange {0}")]
    IncompleteExchange(String),
}

/// Result of a conditional judgment insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The slot was already taken; nothing was written.
    AlreadyExists,
}

/// Storage backend for exchanges and judgments.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn judgment_exists(&self, key: &JudgmentKey) -> Result<bool, StorageError>;

    async fn get_judgment(&self, key: &JudgmentKey) -> Result<Option<Judgment>, StorageError>;

    /// Write `judgment` unless its slot is already taken.
    async fn insert_judgment(&self, judgment: &Judgment) -> Result<InsertOutcome, StorageError>;

    async fn judgments_for(&self, config: &EvaluatorConfig) -> Result<Vec<Judgment>, StorageError>;

    async fn all_judgments(&self) -> Result<Vec<Judgment>, StorageError>;

    /// Store a completed exchange.
    async fn put_exchange(&self, exchange: &Exchange) -> Result<(), StorageError>;

    async fn get_exchange(&self, id: &str) -> Result<Option<Exchange>, StorageError>;

    async fn list_exchanges(&self) -> Result<Vec<Exchange>, StorageError>;
}

/// Reject ids that would escape their directory when used as a file name.
pub(crate) fn check_id(id: &str) -> Result<(), StorageError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

pub(crate) fn check_complete(exchange: &Exchange) -> Result<(), StorageError> {
    if !exchange.is_complete() {
        return Err(StorageError::IncompleteExchange(exchange.id().to_string()));
    }
    Ok(())
}
