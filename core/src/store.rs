//! The single mutation point for selection state.
//!
//! [`reduce`] is a pure transition over [`SelectionState`]; [`Store`] owns the
//! state behind a watch channel so observers see whole snapshots, never a
//! half-applied cascade.

use std::collections::HashSet;

use fieldscope_protocol::Analyst;
use fieldscope_protocol::Client;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Farm;
use fieldscope_protocol::Identity;
use fieldscope_protocol::Level;
use fieldscope_protocol::Selection;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

use crate::scoping::Scope;

/// One level's list as last loaded. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelListState {
    pub items: Vec<Entity>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
}

impl LevelListState {
    pub fn find(&self, id: &str) -> Option<&Entity> {
        self.items.iter().find(|item| item.id() == id)
    }
}

/// What a fresh page does to the level's selected id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultSelection {
    Keep,
    Select(Option<String>),
}

/// Default-selection rule for a first page: select its first row when
/// nothing is selected, and fall back to its first row (or nothing) when the
/// selected id is not on it.
pub fn default_selection(current: Option<&str>, items: &[Entity]) -> DefaultSelection {
    let first = items.first().map(|item| item.id().to_string());
    match current {
        None if first.is_some() => DefaultSelection::Select(first),
        None => DefaultSelection::Keep,
        Some(id) if items.iter().any(|item| item.id() == id) => DefaultSelection::Keep,
        Some(_) => DefaultSelection::Select(first),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct LevelView {
    /// Denormalized copy of the selected record, kept for display.
    selected: Option<Entity>,
    #[serde(flatten)]
    list: LevelListState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionState {
    selection: Selection,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
    top: LevelView,
    mid: LevelView,
    leaf: LevelView,
}

impl SelectionState {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn scope(&self) -> Scope<'_> {
        Scope::resolve(self.identity.as_ref())
    }

    pub fn effective_top_id(&self) -> Option<&str> {
        self.scope().effective_top_id(self.selection.top_id.as_deref())
    }

    /// Owner filter for `level` fetches: the effective analyst for clients,
    /// the selected client for farms.
    pub fn parent_id_for(&self, level: Level) -> Option<&str> {
        match level {
            Level::Top => None,
            Level::Mid => self.effective_top_id(),
            Level::Leaf => self.selection.mid_id.as_deref(),
        }
    }

    /// Whether `entity` belongs to a different owner than the current parent
    /// selection.
    pub fn parent_conflict(&self, entity: &Entity) -> bool {
        match entity.level() {
            Level::Top => false,
            level => entity.parent_id() != self.parent_id_for(level),
        }
    }

    pub fn list(&self, level: Level) -> &LevelListState {
        &self.view(level).list
    }

    pub fn selected(&self, level: Level) -> Option<&Entity> {
        self.view(level).selected.as_ref()
    }

    pub fn selected_analyst(&self) -> Option<&Analyst> {
        self.selected(Level::Top).and_then(Entity::as_analyst)
    }

    pub fn selected_client(&self) -> Option<&Client> {
        self.selected(Level::Mid).and_then(Entity::as_client)
    }

    pub fn selected_farm(&self) -> Option<&Farm> {
        self.selected(Level::Leaf).and_then(Entity::as_farm)
    }

    fn view(&self, level: Level) -> &LevelView {
        match level {
            Level::Top => &self.top,
            Level::Mid => &self.mid,
            Level::Leaf => &self.leaf,
        }
    }

    fn view_mut(&mut self, level: Level) -> &mut LevelView {
        match level {
            Level::Top => &mut self.top,
            Level::Mid => &mut self.mid,
            Level::Leaf => &mut self.leaf,
        }
    }

    fn derive_selected(&self, level: Level) -> Option<Entity> {
        if level == Level::Top
            && let Some(synthetic) = self.scope().synthetic_top()
        {
            return Some(synthetic);
        }
        let id = self.selection.id(level)?;
        let view = self.view(level);
        view.list.find(id).cloned().or_else(|| {
            view.selected
                .as_ref()
                .filter(|selected| selected.id() == id)
                .cloned()
        })
    }

    fn refresh_selected(&mut self, level: Level) -> bool {
        let derived = self.derive_selected(level);
        let slot = &mut self.view_mut(level).selected;
        if *slot == derived {
            return false;
        }
        *slot = derived;
        true
    }

    fn clear_level(&mut self, level: Level) {
        *self.selection.slot_mut(level) = None;
        *self.view_mut(level) = LevelView::default();
    }

    fn select(&mut self, level: Level, id: Option<String>) -> bool {
        if self.selection.id(level) == id.as_deref() {
            return self.refresh_selected(level);
        }
        if let Some(id) = id.as_deref()
            && let Some(entity) = self.view(level).list.find(id)
            && self.parent_conflict(entity)
        {
            warn!(
                "ignoring {} {id}: it belongs to {:?}, not the current selection",
                level.noun(),
                entity.parent_id()
            );
            return false;
        }

        *self.selection.slot_mut(level) = id;
        self.refresh_selected(level);
        for descendant in level.descendants() {
            self.clear_level(descendant);
        }
        true
    }

    fn set_identity(&mut self, identity: Option<Identity>) -> bool {
        if self.identity == identity {
            return false;
        }
        let scope_before = self.effective_top_id().map(str::to_string);
        let was_restricted = matches!(self.scope(), Scope::Restricted(_));
        self.identity = identity;

        let synthetic = self.scope().synthetic_top();
        match synthetic {
            Some(synthetic) => {
                self.top = LevelView {
                    selected: Some(synthetic.clone()),
                    list: LevelListState {
                        items: vec![synthetic],
                        ..LevelListState::default()
                    },
                };
            }
            None if was_restricted => {
                self.top = LevelView::default();
                self.refresh_selected(Level::Top);
            }
            None => {}
        }

        if self.effective_top_id() != scope_before.as_deref() {
            self.clear_level(Level::Mid);
            self.clear_level(Level::Leaf);
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Startup and validation only. Sets ids verbatim, lists untouched.
    HydrateIds {
        top: Option<String>,
        mid: Option<String>,
        leaf: Option<String>,
    },
    SetList {
        level: Level,
        items: Vec<Entity>,
        append: bool,
        has_more: bool,
        /// Apply [`default_selection`] against the resulting list.
        select_default: bool,
    },
    SetSelectedEntity {
        level: Level,
        entity: Option<Entity>,
    },
    SetLoading {
        level: Level,
        loading: bool,
    },
    SetError {
        level: Level,
        message: Option<String>,
    },
    SelectTopId(Option<String>),
    SelectMidId(Option<String>),
    SelectLeafId(Option<String>),
    SetIdentity(Option<Identity>),
    /// Sign-out: back to the empty state, identity included.
    Reset,
}

impl Action {
    pub fn select(level: Level, id: Option<String>) -> Self {
        match level {
            Level::Top => Action::SelectTopId(id),
            Level::Mid => Action::SelectMidId(id),
            Level::Leaf => Action::SelectLeafId(id),
        }
    }
}

/// Applies `action` to `state`. Returns whether anything changed.
pub fn reduce(state: &mut SelectionState, action: Action) -> bool {
    match action {
        Action::HydrateIds { top, mid, leaf } => {
            let next = Selection {
                top_id: top,
                mid_id: mid,
                leaf_id: leaf,
            };
            if next == state.selection {
                return false;
            }
            state.selection = next;
            for level in Level::ALL {
                state.refresh_selected(level);
            }
            true
        }
        Action::SetList {
            level,
            items,
            append,
            has_more,
            select_default,
        } => {
            let items = items.into_iter().filter(|item| {
                let matches = item.level() == level;
                if !matches {
                    warn!("dropping {} {} from {} list", item.level().noun(), item.id(), level.noun());
                }
                matches
            });
            let list = &mut state.view_mut(level).list;
            if append {
                let mut seen: HashSet<String> =
                    list.items.iter().map(|item| item.id().to_string()).collect();
                for item in items {
                    if seen.insert(item.id().to_string()) {
                        list.items.push(item);
                    }
                }
            } else {
                list.items = items.collect();
            }
            list.has_more = has_more;
            list.is_loading = false;
            list.error = None;
            state.refresh_selected(level);
            if select_default {
                let current = state.selection.id(level);
                if let DefaultSelection::Select(id) =
                    default_selection(current, &state.view(level).list.items)
                {
                    debug!("default {} selection: {id:?}", level.noun());
                    state.select(level, id);
                }
            }
            true
        }
        Action::SetSelectedEntity { level, entity } => {
            let Some(entity) = entity else {
                let slot = &mut state.view_mut(level).selected;
                return slot.take().is_some();
            };
            if entity.level() != level || state.selection.id(level) != Some(entity.id()) {
                warn!(
                    "ignoring selected {} {}: {} id is {:?}",
                    entity.level().noun(),
                    entity.id(),
                    level.noun(),
                    state.selection.id(level)
                );
                return false;
            }
            if state.parent_conflict(&entity) {
                warn!(
                    "ignoring selected {} {}: owner does not match the current selection",
                    level.noun(),
                    entity.id()
                );
                return false;
            }
            let slot = &mut state.view_mut(level).selected;
            if slot.as_ref() == Some(&entity) {
                return false;
            }
            *slot = Some(entity);
            true
        }
        Action::SetLoading { level, loading } => {
            let list = &mut state.view_mut(level).list;
            let changed = list.is_loading != loading;
            list.is_loading = loading;
            changed
        }
        Action::SetError { level, message } => {
            let list = &mut state.view_mut(level).list;
            let changed = list.error != message || list.is_loading;
            list.error = message;
            list.is_loading = false;
            changed
        }
        Action::SelectTopId(id) => state.select(Level::Top, id),
        Action::SelectMidId(id) => state.select(Level::Mid, id),
        Action::SelectLeafId(id) => state.select(Level::Leaf, id),
        Action::SetIdentity(identity) => state.set_identity(identity),
        Action::Reset => {
            let changed = *state != SelectionState::default();
            *state = SelectionState::default();
            changed
        }
    }
}

/// Selection and effective analyst on both sides of one or more dispatches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub before: Selection,
    pub after: Selection,
    pub scope_before: Option<String>,
    pub scope_after: Option<String>,
}

impl Transition {
    pub fn selection_changed(&self) -> bool {
        self.before != self.after
    }

    pub fn scope_changed(&self) -> bool {
        self.scope_before != self.scope_after
    }

    pub fn changed(&self, level: Level) -> bool {
        self.before.id(level) != self.after.id(level)
    }

    /// Folds a later transition into this one.
    pub fn merge(self, later: Transition) -> Transition {
        Transition {
            before: self.before,
            after: later.after,
            scope_before: self.scope_before,
            scope_after: later.scope_after,
        }
    }
}

#[derive(Debug)]
pub struct Store {
    tx: watch::Sender<SelectionState>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(SelectionState::default())
    }
}

impl Store {
    pub fn new(state: SelectionState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    /// Runs `action` through [`reduce`] under the channel lock. Observers are
    /// only woken when the state actually changed.
    pub fn dispatch(&self, action: Action) -> Transition {
        let mut transition = Transition::default();
        self.tx.send_if_modified(|state| {
            let before = state.selection.clone();
            let scope_before = state.effective_top_id().map(str::to_string);
            let modified = reduce(state, action);
            transition = Transition {
                before,
                after: state.selection.clone(),
                scope_before,
                scope_after: state.effective_top_id().map(str::to_string),
            };
            modified
        });
        transition
    }

    pub fn read<R>(&self, f: impl FnOnce(&SelectionState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn snapshot(&self) -> SelectionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.tx.subscribe()
    }
}
