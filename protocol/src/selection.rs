use serde::Deserialize;
use serde::Serialize;

use crate::level::Level;

/// The ids of the active analyst, client and farm. This triple is the only
/// part of the engine state that is persisted across reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub top_id: Option<String>,
    pub mid_id: Option<String>,
    pub leaf_id: Option<String>,
}

impl Selection {
    pub fn new(
        top_id: Option<impl Into<String>>,
        mid_id: Option<impl Into<String>>,
        leaf_id: Option<impl Into<String>>,
    ) -> Self {
        Self {
            top_id: top_id.map(Into::into),
            mid_id: mid_id.map(Into::into),
            leaf_id: leaf_id.map(Into::into),
        }
    }

    pub fn id(&self, level: Level) -> Option<&str> {
        match level {
            Level::Top => self.top_id.as_deref(),
            Level::Mid => self.mid_id.as_deref(),
            Level::Leaf => self.leaf_id.as_deref(),
        }
    }

    pub fn slot_mut(&mut self, level: Level) -> &mut Option<String> {
        match level {
            Level::Top => &mut self.top_id,
            Level::Mid => &mut self.mid_id,
            Level::Leaf => &mut self.leaf_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top_id.is_none() && self.mid_id.is_none() && self.leaf_id.is_none()
    }
}
