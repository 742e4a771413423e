//! Registry of in-flight exchanges with progress events.
//!
//! The registry is an explicit context object: callers create one and pass
//! it to [`crate::DebateRunner::run_tracked`] and
//! [`crate::BatchOrchestrator::generate`]. Subscribers receive an
//! [`ExchangeEvent`] for every state change. Finished entries stay until
//! [`ExchangeRegistry::remove`] or [`ExchangeRegistry::prune_finished`].

use std::collections::HashMap;

use debatebench_core::{Exchange, Turn, TurnKind};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of a tracked exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ExchangeStatus {
    Starting,
    Running,
    Complete,
    Failed(String),
}

impl ExchangeStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ExchangeStatus::Complete | ExchangeStatus::Failed(_))
    }
}

/// Progress of one tracked exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeEntry {
    pub exchange_id: String,
    pub topic: String,
    pub pro_model: String,
    pub con_model: String,
    pub status: ExchangeStatus,
    /// Turn currently being generated
    pub current: Option<TurnKind>,
    pub turns: Vec<Turn>,
}

/// Progress event broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExchangeEvent {
    Started {
        exchange_id: String,
        topic: String,
    },
    TurnStarted {
        exchange_id: String,
        kind: TurnKind,
    },
    TurnCompleted {
        exchange_id: String,
        kind: TurnKind,
        word_count: usize,
    },
    Completed {
        exchange_id: String,
    },
    Failed {
        exchange_id: String,
        error: String,
    },
}

pub struct ExchangeRegistry {
    entries: RwLock<HashMap<String, ExchangeEntry>>,
    events: broadcast::Sender<ExchangeEvent>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Start tracking `exchange`.
    pub fn begin(&self, exchange: &Exchange) {
        let entry = ExchangeEntry {
            exchange_id: exchange.id().to_string(),
            topic: exchange.topic().to_string(),
            pro_model: exchange.pro_model().to_string(),
            con_model: exchange.con_model().to_string(),
            status: ExchangeStatus::Starting,
            current: None,
            turns: exchange.turns().to_vec(),
        };
        self.entries
            .write()
            .insert(entry.exchange_id.clone(), entry);
        self.publish(ExchangeEvent::Started {
            exchange_id: exchange.id().to_string(),
            topic: exchange.topic().to_string(),
        });
    }

    pub fn turn_started(&self, exchange_id: &str, kind: TurnKind) {
        let updated = self.update(exchange_id, |entry| {
            entry.status = ExchangeStatus::Running;
            entry.current = Some(kind);
        });
        if updated {
            self.publish(ExchangeEvent::TurnStarted {
                exchange_id: exchange_id.to_string(),
                kind,
            });
        }
    }

    pub fn record_turn(&self, exchange_id: &str, turn: &Turn) {
        let updated = self.update(exchange_id, |entry| {
            entry.current = None;
            entry.turns.push(turn.clone());
        });
        if updated {
            self.publish(ExchangeEvent::TurnCompleted {
                exchange_id: exchange_id.to_string(),
                kind: turn.kind(),
                word_count: turn.word_count(),
            });
        }
    }

    pub fn complete(&self, exchange_id: &str) {
        let updated = self.update(exchange_id, |entry| {
            entry.status = ExchangeStatus::Complete;
            entry.current = None;
        });
        if updated {
            self.publish(ExchangeEvent::Completed {
                exchange_id: exchange_id.to_string(),
            });
        }
    }

    pub fn fail(&self, exchange_id: &str, error: impl Into<String>) {
        let error = error.into();
        let updated = self.update(exchange_id, |entry| {
            entry.status = ExchangeStatus::Failed(error.clone());
            entry.current = None;
        });
        if updated {
            self.publish(ExchangeEvent::Failed {
                exchange_id: exchange_id.to_string(),
                error,
            });
        }
    }

    pub fn status(&self, exchange_id: &str) -> Option<ExchangeStatus> {
        self.entries
            .read()
            .get(exchange_id)
            .map(|e| e.status.clone())
    }

    pub fn entry(&self, exchange_id: &str) -> Option<ExchangeEntry> {
        self.entries.read().get(exchange_id).cloned()
    }

    /// Every tracked exchange, ordered by id.
    pub fn snapshot(&self) -> Vec<ExchangeEntry> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.exchange_id.cmp(&b.exchange_id));
        entries
    }

    /// Stop tracking `exchange_id`, returning its last entry.
    pub fn remove(&self, exchange_id: &str) -> Option<ExchangeEntry> {
        self.entries.write().remove(exchange_id)
    }

    /// Drop every completed or failed entry. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.status.is_finished());
        before - entries.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events.subscribe()
    }

    fn update(&self, exchange_id: &str, apply: impl FnOnce(&mut ExchangeEntry)) -> bool {
        match self.entries.write().get_mut(exchange_id) {
            Some(entry) => {
                apply(entry);
                true
            }
            None => {
                tracing::warn!(exchange_id, "Update for untracked exchange ignored");
                false
            }
        }
    }

    fn publish(&self, event: ExchangeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debatebench_core::Protocol;

    #[test]
    fn test_lifecycle_updates_entry() {
        let registry = ExchangeRegistry::new();
        let exchange = Exchange::new("Resolved: x", "a", "b");
        let id = exchange.id().to_string();

        registry.begin(&exchange);
        assert_eq!(registry.status(&id), Some(ExchangeStatus::Starting));

        registry.turn_started(&id, TurnKind::ProOpen);
        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.status, ExchangeStatus::Running);
        assert_eq!(entry.current, Some(TurnKind::ProOpen));

        let turn = Protocol::default()
            .make_turn(TurnKind::ProOpen, "Opening words.")
            .unwrap();
        registry.record_turn(&id, &turn);
        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.turns.len(), 1);
        assert_eq!(entry.current, None);

        registry.complete(&id);
        assert!(registry.status(&id).unwrap().is_finished());
    }

    #[test]
    fn test_prune_keeps_running_exchanges() {
        let registry = ExchangeRegistry::new();
        let done = Exchange::new("Resolved: x", "a", "b");
        let failed = Exchange::new("Resolved: y", "a", "b");
        let running = Exchange::new("Resolved: z", "a", "b");
        for exchange in [&done, &failed, &running] {
            registry.begin(exchange);
        }
        registry.complete(done.id());
        registry.fail(failed.id(), "timeout");
        registry.turn_started(running.id(), TurnKind::ProOpen);

        assert_eq!(registry.prune_finished(), 2);
        let ids: Vec<_> = registry.snapshot().into_iter().map(|e| e.exchange_id).collect();
        assert_eq!(ids, vec![running.id().to_string()]);

        assert_eq!(registry.remove(running.id()).unwrap().topic, "Resolved: z");
        assert!(registry.snapshot().is_empty());
        assert!(registry.remove(running.id()).is_none());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let registry = ExchangeRegistry::new();
        let mut events = registry.subscribe();
        let exchange = Exchange::new("Resolved: x", "a", "b");
        let id = exchange.id().to_string();

        registry.begin(&exchange);
        registry.turn_started(&id, TurnKind::ProOpen);
        registry.fail(&id, "model unavailable");

        assert!(matches!(events.recv().await.unwrap(), ExchangeEvent::Started { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            ExchangeEvent::TurnStarted {
                exchange_id: id.clone(),
                kind: TurnKind::ProOpen
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ExchangeEvent::Failed {
                exchange_id: id.clone(),
                error: "model unavailable".to_string()
            }
        );
        assert_eq!(
            registry.status(&id),
            Some(ExchangeStatus::Failed("model unavailable".to_string()))
        );
    }

    #[test]
    fn test_unknown_exchange_is_ignored() {
        let registry = ExchangeRegistry::new();
        registry.complete("nope");
        assert!(registry.status("nope").is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ExchangeEvent::TurnCompleted {
            exchange_id: "e".to_string(),
            kind: TurnKind::ConClose,
            word_count: 12,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "turn_completed");
        assert_eq!(value["kind"], "CON_CLOSE");
    }
}
