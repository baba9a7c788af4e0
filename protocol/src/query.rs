use serde::Deserialize;
use serde::Serialize;

use crate::level::Level;
use crate::models::Entity;

/// One page request against a level's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub level: Level,
    /// Owner filter: the analyst id for clients, the client id for farms.
    /// Always `None` for the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Case-insensitive name filter; blank terms are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl ListQuery {
    pub fn new(level: Level, offset: usize, limit: usize) -> Self {
        Self {
            level,
            parent_id: None,
            search: None,
            offset,
            limit,
        }
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty());
        self
    }

    /// Inclusive row window `[offset, offset + limit - 1]`.
    pub fn range(&self) -> (usize, usize) {
        (
            self.offset,
            (self.offset + self.limit).saturating_sub(1).max(self.offset),
        )
    }

    /// Whether `entity` satisfies the level, owner and name filters.
    pub fn matches(&self, entity: &Entity) -> bool {
        if entity.level() != self.level {
            return false;
        }
        if let Some(parent_id) = self.parent_id.as_deref()
            && entity.parent_id() != Some(parent_id)
        {
            return false;
        }
        match self.search.as_deref() {
            Some(term) => entity
                .name()
                .to_lowercase()
                .contains(&term.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    /// Deleted, or no longer accessible to the caller.
    Invalid,
    #[default]
    NotChecked,
}

/// Per-field answer of a batched id validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default)]
    pub top: Validity,
    #[serde(default)]
    pub mid: Validity,
    #[serde(default)]
    pub leaf: Validity,
}

impl ValidationReport {
    pub fn get(&self, level: Level) -> Validity {
        match level {
            Level::Top => self.top,
            Level::Mid => self.mid,
            Level::Leaf => self.leaf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change-feed notification for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub level: Level,
    pub kind: ChangeKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}
