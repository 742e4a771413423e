//! In-memory storage for tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use debatebench_core::{EvaluatorConfig, Exchange, Judgment, JudgmentKey};
use parking_lot::Mutex;

use super::{check_complete, InsertOutcome, Storage, StorageError};

#[derive(Default)]
struct Records {
    exchanges: HashMap<String, Exchange>,
    judgments: BTreeMap<JudgmentKey, Judgment>,
}

#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn judgment_count(&self) -> usize {
        self.records.lock().judgments.len()
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn judgment_exists(&self, key: &JudgmentKey) -> Result<bool, StorageError> {
        Ok(self.records.lock().judgments.contains_key(key))
    }

    async fn get_judgment(&self, key: &JudgmentKey) -> Result<Option<Judgment>, StorageError> {
        Ok(self.records.lock().judgments.get(key).cloned())
    }

    async fn insert_judgment(&self, judgment: &Judgment) -> Result<InsertOutcome, StorageError> {
        use std::collections::btree_map::Entry;

        match self.records.lock().judgments.entry(judgment.key()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(judgment.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn judgments_for(&self, config: &EvaluatorConfig) -> Result<Vec<Judgment>, StorageError> {
        Ok(self
            .records
            .lock()
            .judgments
            .values()
            .filter(|j| &j.config == config)
            .cloned()
            .collect())
    }

    async fn all_judgments(&self) -> Result<Vec<Judgment>, StorageError> {
        Ok(self.records.lock().judgments.values().cloned().collect())
    }

    async fn put_exchange(&self, exchange: &Exchange) -> Result<(), StorageError> {
        check_complete(exchange)?;
        self.records
            .lock()
            .exchanges
            .insert(exchange.id().to_string(), exchange.clone());
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> Result<Option<Exchange>, StorageError> {
        Ok(self.records.lock().exchanges.get(id).cloned())
    }

    async fn list_exchanges(&self) -> Result<Vec<Exchange>, StorageError> {
        let mut exchanges: Vec<Exchange> =
            self.records.lock().exchanges.values().cloned().collect();
        exchanges.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(exchanges)
    }
}
