//! In-process [`SelectionBackend`] backed by a vector of records.
//!
//! Used by the CLI (loaded from a JSON dataset) and by tests, which can inject
//! latency and failures and inspect the queries the engine issued.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use fieldscope_protocol::Analyst;
use fieldscope_protocol::ChangeEvent;
use fieldscope_protocol::ChangeKind;
use fieldscope_protocol::Client;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Farm;
use fieldscope_protocol::Level;
use fieldscope_protocol::ListQuery;
use fieldscope_protocol::Selection;
use fieldscope_protocol::ValidationReport;
use fieldscope_protocol::Validity;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::BackendError;
use crate::backend::ChangeFeed;
use crate::backend::SelectionBackend;
use crate::error::Result;

/// On-disk fixture layout accepted by [`MemoryBackend::load`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub analysts: Vec<Analyst>,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub farms: Vec<Farm>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Entity>,
    subscribers: Vec<Subscriber>,
    queries: Vec<ListQuery>,
    pending_delays: HashMap<Level, VecDeque<Duration>>,
    list_failures: HashMap<Level, BackendError>,
    validation_failure: Option<BackendError>,
    validation_calls: usize,
}

#[derive(Debug)]
struct Subscriber {
    level: Level,
    scope_id: String,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Entity>) -> Self {
        let backend = Self::default();
        backend.state().records = records.into_iter().collect();
        backend
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let Dataset {
            analysts,
            clients,
            farms,
        } = dataset;
        Self::from_records(
            analysts
                .into_iter()
                .map(Entity::from)
                .chain(clients.into_iter().map(Entity::from))
                .chain(farms.into_iter().map(Entity::from)),
        )
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let dataset: Dataset = serde_json::from_str(contents)?;
        Ok(Self::from_dataset(dataset))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Adds or replaces a record and notifies subscribers of its owner.
    pub fn insert(&self, entity: impl Into<Entity>) {
        let entity = entity.into();
        let mut state = self.state();
        let existing = state
            .records
            .iter()
            .position(|record| record.level() == entity.level() && record.id() == entity.id());
        let kind = match existing {
            Some(index) => {
                state.records[index] = entity.clone();
                ChangeKind::Update
            }
            None => {
                state.records.push(entity.clone());
                ChangeKind::Insert
            }
        };
        state.notify(ChangeEvent {
            level: entity.level(),
            kind,
            id: entity.id().to_string(),
            parent_id: entity.parent_id().map(str::to_string),
        });
    }

    pub fn remove(&self, level: Level, id: &str) -> Option<Entity> {
        let mut state = self.state();
        let index = state
            .records
            .iter()
            .position(|record| record.level() == level && record.id() == id)?;
        let removed = state.records.remove(index);
        state.notify(ChangeEvent {
            level,
            kind: ChangeKind::Delete,
            id: removed.id().to_string(),
            parent_id: removed.parent_id().map(str::to_string),
        });
        Some(removed)
    }

    /// Holds the next `list` call for `level` for `delay` before answering.
    pub fn delay_next_list(&self, level: Level, delay: Duration) {
        self.state()
            .pending_delays
            .entry(level)
            .or_default()
            .push_back(delay);
    }

    pub fn fail_lists(&self, level: Level, error: Option<BackendError>) {
        let mut state = self.state();
        match error {
            Some(error) => {
                state.list_failures.insert(level, error);
            }
            None => {
                state.list_failures.remove(&level);
            }
        }
    }

    pub fn fail_validation(&self, error: Option<BackendError>) {
        self.state().validation_failure = error;
    }

    pub fn queries(&self) -> Vec<ListQuery> {
        self.state().queries.clone()
    }

    pub fn queries_for(&self, level: Level) -> Vec<ListQuery> {
        self.state()
            .queries
            .iter()
            .filter(|query| query.level == level)
            .cloned()
            .collect()
    }

    pub fn clear_queries(&self) {
        self.state().queries.clear();
    }

    pub fn validation_calls(&self) -> usize {
        self.state().validation_calls
    }

    /// Scope ids of the live subscriptions for `level`.
    pub fn subscribed_scopes(&self, level: Level) -> Vec<String> {
        let mut state = self.state();
        state.subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.level == level)
            .map(|subscriber| subscriber.scope_id.clone())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn find(&self, level: Level, id: &str) -> Option<&Entity> {
        self.records
            .iter()
            .find(|record| record.level() == level && record.id() == id)
    }

    fn notify(&mut self, event: ChangeEvent) {
        debug!(
            "memory backend change: {} {} {:?}",
            event.level.noun(),
            event.id,
            event.kind
        );
        self.subscribers.retain(|subscriber| {
            let in_scope = subscriber.level == event.level
                && event.parent_id.as_deref() == Some(subscriber.scope_id.as_str());
            if in_scope {
                subscriber.tx.send(event.clone()).is_ok()
            } else {
                !subscriber.tx.is_closed()
            }
        });
    }

    fn validity(&self, level: Level, id: Option<&str>, owner: Option<&str>) -> Validity {
        let Some(id) = id else {
            return Validity::NotChecked;
        };
        match self.find(level, id) {
            Some(record) => match (owner, record.parent_id()) {
                (Some(owner), Some(parent)) if owner != parent => Validity::Invalid,
                _ => Validity::Valid,
            },
            None => Validity::Invalid,
        }
    }
}

#[async_trait]
impl SelectionBackend for MemoryBackend {
    async fn list(&self, query: &ListQuery) -> std::result::Result<Vec<Entity>, BackendError> {
        let (delay, failure) = {
            let mut state = self.state();
            state.queries.push(query.clone());
            let delay = state
                .pending_delays
                .get_mut(&query.level)
                .and_then(VecDeque::pop_front);
            (delay, state.list_failures.get(&query.level).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        let state = self.state();
        let mut rows: Vec<Entity> = state
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        rows.sort_by_key(Entity::sort_key);
        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn validate_ids(
        &self,
        selection: &Selection,
        scope_top_id: Option<&str>,
    ) -> std::result::Result<ValidationReport, BackendError> {
        let mut state = self.state();
        state.validation_calls += 1;
        if let Some(error) = state.validation_failure.clone() {
            return Err(error);
        }

        let top_owner = scope_top_id.or(selection.top_id.as_deref());
        Ok(ValidationReport {
            top: state.validity(Level::Top, selection.top_id.as_deref(), None),
            mid: state.validity(Level::Mid, selection.mid_id.as_deref(), top_owner),
            leaf: state.validity(
                Level::Leaf,
                selection.leaf_id.as_deref(),
                selection.mid_id.as_deref(),
            ),
        })
    }

    async fn subscribe(
        &self,
        level: Level,
        scope_id: &str,
    ) -> std::result::Result<ChangeFeed, BackendError> {
        let (tx, feed) = ChangeFeed::channel();
        self.state().subscribers.push(Subscriber {
            level,
            scope_id: scope_id.to_string(),
            tx,
        });
        Ok(feed)
    }
}
