//! Durable mirror of the selection triple.
//!
//! The current format is one versioned JSON record. Two older layouts are
//! still read on first hydrate: one key per level holding a bare id, and
//! before that one key per level holding either a bare id or the whole
//! serialized record. Legacy keys are never rewritten; they are only removed
//! by [`SelectionPersistence::clear_all`].

use std::sync::Arc;

use fieldscope_protocol::Level;
use fieldscope_protocol::Selection;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::storage::KeyValueStore;

pub const SELECTION_FORMAT_VERSION: u32 = 2;

/// Per-level id keys written by the first persisted format.
const LEGACY_ID_KEYS: [(Level, &str); 3] = [
    (Level::Top, "selectedAnalystId"),
    (Level::Mid, "selectedClientId"),
    (Level::Leaf, "selectedFarmId"),
];

/// Per-level keys of the oldest format: a bare id or a JSON object with `id`.
const LEGACY_RECORD_KEYS: [(Level, &str); 3] = [
    (Level::Top, "selectedAnalyst"),
    (Level::Mid, "selectedClient"),
    (Level::Leaf, "selectedFarm"),
];

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSelection {
    version: u32,
    #[serde(default)]
    top_id: Option<String>,
    #[serde(default)]
    mid_id: Option<String>,
    #[serde(default)]
    leaf_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateSource {
    Canonical,
    Legacy,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hydrated {
    pub selection: Selection,
    pub source: HydrateSource,
}

#[derive(Debug, Clone)]
pub struct SelectionPersistence {
    store: Arc<dyn KeyValueStore>,
    canonical_key: String,
}

impl SelectionPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        Self {
            store,
            canonical_key: format!("{prefix}.selection"),
        }
    }

    pub fn canonical_key(&self) -> &str {
        &self.canonical_key
    }

    /// Reads the persisted triple, migrating legacy layouts when the
    /// canonical record is absent. Never fails: unreadable fields hydrate as
    /// `None`.
    pub fn load(&self) -> Hydrated {
        if let Some(selection) = self.read_canonical() {
            return Hydrated {
                selection,
                source: HydrateSource::Canonical,
            };
        }

        let mut selection = Selection::default();
        for level in Level::ALL {
            *selection.slot_mut(level) = self.read_legacy_field(level);
        }
        let source = if selection.is_empty() {
            HydrateSource::Empty
        } else {
            debug!("migrated legacy selection {selection:?}");
            HydrateSource::Legacy
        };
        Hydrated { selection, source }
    }

    pub fn save(&self, selection: &Selection) {
        let record = PersistedSelection {
            version: SELECTION_FORMAT_VERSION,
            top_id: selection.top_id.clone(),
            mid_id: selection.mid_id.clone(),
            leaf_id: selection.leaf_id.clone(),
        };
        let result = serde_json::to_string(&record)
            .map_err(std::io::Error::from)
            .and_then(|json| self.store.set(&self.canonical_key, &json));
        if let Err(err) = result {
            warn!("failed to persist selection: {err}");
        }
    }

    /// Removes the canonical record and every legacy key (sign-out).
    pub fn clear_all(&self) {
        let keys = std::iter::once(self.canonical_key.as_str())
            .chain(LEGACY_ID_KEYS.iter().map(|(_, key)| *key))
            .chain(LEGACY_RECORD_KEYS.iter().map(|(_, key)| *key));
        for key in keys {
            if let Err(err) = self.store.remove(key) {
                warn!("failed to remove persisted key {key}: {err}");
            }
        }
    }

    fn read_canonical(&self) -> Option<Selection> {
        let raw = self.read_key(&self.canonical_key)?;
        let record: PersistedSelection = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("ignoring unreadable selection record: {err}");
                return None;
            }
        };
        if record.version != SELECTION_FORMAT_VERSION {
            warn!(
                "selection record version mismatch: {} vs {}",
                record.version, SELECTION_FORMAT_VERSION
            );
            return None;
        }
        Some(Selection {
            top_id: record.top_id.and_then(normalize_id),
            mid_id: record.mid_id.and_then(normalize_id),
            leaf_id: record.leaf_id.and_then(normalize_id),
        })
    }

    fn read_legacy_field(&self, level: Level) -> Option<String> {
        let id_key = legacy_key(&LEGACY_ID_KEYS, level);
        if let Some(id) = self.read_key(id_key).and_then(normalize_id) {
            return Some(id);
        }
        let record_key = legacy_key(&LEGACY_RECORD_KEYS, level);
        self.read_key(record_key)
            .and_then(|raw| parse_legacy_record(&raw))
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to read persisted key {key}: {err}");
                None
            }
        }
    }
}

fn legacy_key(table: &[(Level, &'static str); 3], level: Level) -> &'static str {
    table
        .iter()
        .find_map(|(candidate, key)| (*candidate == level).then_some(*key))
        .unwrap_or_default()
}

/// Trims and drops blank ids plus the `null`/`undefined` strings older
/// front-ends wrote for empty slots.
fn normalize_id(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return None;
    }
    Some(trimmed.to_string())
}

fn parse_legacy_record(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(id)) => normalize_id(id),
        Ok(Value::Number(id)) => Some(id.to_string()),
        Ok(Value::Object(record)) => match record.get("id") {
            Some(Value::String(id)) => normalize_id(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        },
        Ok(_) => None,
        // Not JSON: either a bare id or a truncated object.
        Err(_) if trimmed.starts_with('{') || trimmed.starts_with('[') => None,
        Err(_) => normalize_id(trimmed.to_string()),
    }
}
