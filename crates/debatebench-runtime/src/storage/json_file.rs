//! One JSON file per record.
//!
//! ```text
//! <root>/exchanges/<exchange_id>.json
//! <root>/judgments/<config_key>/<exchange_id>_run<n>.json
//! ```
//!
//! Records are written to a unique temp file first. Judgments are then
//! `hard_link`ed into place, which fails if the target exists; exchanges are
//! renamed over any previous copy. Readers never see a partial file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use debatebench_core::{EvaluatorConfig, Exchange, Judgment, JudgmentKey};
use serde::de::DeserializeOwned;
use tokio::fs;
use uuid::Uuid;

use super::{check_complete, check_id, InsertOutcome, Storage, StorageError};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn exchanges_dir(&self) -> PathBuf {
        self.root.join("exchanges")
    }

    fn judgments_dir(&self) -> PathBuf {
        self.root.join("judgments")
    }

    fn exchange_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        check_id(id)?;
        Ok(self.exchanges_dir().join(format!("{id}.json")))
    }

    fn judgment_path(&self, key: &JudgmentKey) -> Result<PathBuf, StorageError> {
        check_id(&key.config_key)?;
        check_id(&key.exchange_id)?;
        Ok(self
            .judgments_dir()
            .join(&key.config_key)
            .join(format!("{}_run{}.json", key.exchange_id, key.run_index)))
    }
}

/// Write `bytes` to a temp file beside `path`, returning the temp path.
async fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::InvalidId(path.display().to_string()))?;
    fs::create_dir_all(dir).await?;
    let temp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    fs::write(&temp, bytes).await?;
    Ok(temp)
}

/// Create `path` only if it does not exist yet.
async fn create_new(path: &Path, bytes: &[u8]) -> Result<bool, StorageError> {
    let temp = stage(path, bytes).await?;
    let linked = fs::hard_link(&temp, path).await;
    if let Err(e) = fs::remove_file(&temp).await {
        tracing::warn!(path = %temp.display(), error = %e, "Failed to remove temp file");
    }
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn replace(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let temp = stage(path, bytes).await?;
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Parse the record at `path`, or `None` if there is no file.
async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse every `*.json` file in `dir`. Unreadable records are logged and skipped.
async fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                continue;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unparseable record");
            }
        }
    }
    Ok(records)
}

async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn sort_judgments(judgments: &mut [Judgment]) {
    judgments.sort_by(|a, b| a.key().cmp(&b.key()));
}

#[async_trait]
impl Storage for JsonFileStore {
    async fn judgment_exists(&self, key: &JudgmentKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.judgment_path(key)?).await?)
    }

    async fn get_judgment(&self, key: &JudgmentKey) -> Result<Option<Judgment>, StorageError> {
        read_record(&self.judgment_path(key)?).await
    }

    async fn insert_judgment(&self, judgment: &Judgment) -> Result<InsertOutcome, StorageError> {
        let key = judgment.key();
        let path = self.judgment_path(&key)?;
        let bytes = serde_json::to_vec_pretty(judgment)?;

        if create_new(&path, &bytes).await? {
            tracing::debug!(key = %key, "Stored judgment");
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn judgments_for(&self, config: &EvaluatorConfig) -> Result<Vec<Judgment>, StorageError> {
        let config_key = config.key();
        check_id(&config_key)?;
        let mut judgments: Vec<Judgment> =
            read_records(&self.judgments_dir().join(&config_key)).await?;
        sort_judgments(&mut judgments);
        Ok(judgments)
    }

    async fn all_judgments(&self) -> Result<Vec<Judgment>, StorageError> {
        let mut judgments = Vec::new();
        for dir in subdirectories(&self.judgments_dir()).await? {
            judgments.extend(read_records::<Judgment>(&dir).await?);
        }
        sort_judgments(&mut judgments);
        Ok(judgments)
    }

    async fn put_exchange(&self, exchange: &Exchange) -> Result<(), StorageError> {
        check_complete(exchange)?;
        let path = self.exchange_path(exchange.id())?;
        replace(&path, &serde_json::to_vec_pretty(exchange)?).await?;
        tracing::debug!(exchange_id = exchange.id(), "Stored exchange");
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> Result<Option<Exchange>, StorageError> {
        read_record(&self.exchange_path(id)?).await
    }

    async fn list_exchanges(&self) -> Result<Vec<Exchange>, StorageError> {
        let mut exchanges: Vec<Exchange> = read_records(&self.exchanges_dir()).await?;
        exchanges.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(exchanges)
    }
}
