//! Public entry point tying the store, controllers, persistence, validation
//! and realtime together.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Weak;

use async_trait::async_trait;
use fieldscope_protocol::Analyst;
use fieldscope_protocol::ChangeEvent;
use fieldscope_protocol::ChangeKind;
use fieldscope_protocol::Client;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Farm;
use fieldscope_protocol::Identity;
use fieldscope_protocol::Level;
use fieldscope_protocol::Selection;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::backend::SelectionBackend;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::error::SelectionError;
use crate::pagination::LevelController;
use crate::pagination::LoadOutcome;
use crate::persistence::SelectionPersistence;
use crate::realtime::ChangeSink;
use crate::realtime::RealtimeInvalidator;
use crate::storage::KeyValueStore;
use crate::store::Action;
use crate::store::LevelListState;
use crate::store::SelectionState;
use crate::store::Store;
use crate::store::Transition;
use crate::validation::GateOutcome;
use crate::validation::ValidationGate;

/// Follow-up work produced by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Reload(Level),
    Resubscribe(Level),
}

struct Inner {
    config: EngineConfig,
    backend: Arc<dyn SelectionBackend>,
    store: Store,
    persistence: SelectionPersistence,
    top: LevelController,
    mid: LevelController,
    leaf: LevelController,
    gate: ValidationGate,
    realtime: RealtimeInvalidator,
}

impl Inner {
    fn controller(&self, level: Level) -> &LevelController {
        match level {
            Level::Top => &self.top,
            Level::Mid => &self.mid,
            Level::Leaf => &self.leaf,
        }
    }

    fn browses_top_level(&self) -> bool {
        self.store.read(|state| state.scope().browses_top_level())
    }

    /// Persists a changed selection and derives the follow-up effects. Child
    /// controllers are reset right away so their in-flight fetches are
    /// dropped before anything else runs.
    fn settle(&self, transition: &Transition) -> Vec<Effect> {
        if transition.selection_changed() {
            self.persistence.save(&transition.after);
        }
        if transition.scope_changed() {
            self.mid.reset();
            self.leaf.reset();
            vec![
                Effect::Reload(Level::Mid),
                Effect::Resubscribe(Level::Mid),
                Effect::Reload(Level::Leaf),
                Effect::Resubscribe(Level::Leaf),
            ]
        } else if transition.changed(Level::Mid) {
            self.leaf.reset();
            vec![Effect::Reload(Level::Leaf), Effect::Resubscribe(Level::Leaf)]
        } else {
            Vec::new()
        }
    }

    fn dispatch(&self, action: Action) -> Transition {
        self.store.dispatch(action)
    }
}

/// Lets realtime tasks reach the engine without keeping it alive.
struct EngineSink(Weak<Inner>);

#[async_trait]
impl ChangeSink for EngineSink {
    async fn invalidate(&self, level: Level, event: ChangeEvent) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        SelectionEngine { inner }.reload_after_change(level, &event).await;
    }
}

/// Cascading analyst, client and farm selection over a [`SelectionBackend`].
///
/// Cheap to clone; clones share one state. Every mutating call returns once
/// the resulting cascade (child reloads, resubscriptions, persistence) has
/// settled.
#[derive(Clone)]
pub struct SelectionEngine {
    inner: Arc<Inner>,
}

impl SelectionEngine {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn SelectionBackend>,
        storage: Arc<dyn KeyValueStore>,
        identity: Option<Identity>,
    ) -> Result<Self> {
        config.validate().map_err(SelectionError::Config)?;
        let store = Store::new(SelectionState::default());
        store.dispatch(Action::SetIdentity(identity));
        let inner = Inner {
            persistence: SelectionPersistence::new(storage, &config.storage_prefix),
            top: LevelController::new(Level::Top, config.page_size),
            mid: LevelController::new(Level::Mid, config.page_size),
            leaf: LevelController::new(Level::Leaf, config.page_size),
            gate: ValidationGate::new(),
            realtime: RealtimeInvalidator::new(),
            store,
            backend,
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Hydrates from storage, runs the validation gate, loads every level
    /// and opens the change feeds.
    pub async fn start(&self) -> GateOutcome {
        let hydrated = self.inner.persistence.load();
        info!(
            "hydrated selection from {:?}: {:?}",
            hydrated.source, hydrated.selection
        );
        let Selection {
            top_id,
            mid_id,
            leaf_id,
        } = hydrated.selection;
        self.inner.dispatch(Action::HydrateIds {
            top: top_id,
            mid: mid_id,
            leaf: leaf_id,
        });

        let outcome = if self.inner.config.validate_on_start {
            self.inner
                .gate
                .run(self.inner.backend.as_ref(), &self.inner.store)
                .await
        } else {
            GateOutcome::Skipped
        };
        // Rewrites migrated or cleaned ids in the canonical format.
        self.inner.persistence.save(&self.selection());

        let mut effects = Vec::new();
        if self.inner.browses_top_level() {
            effects.push(Effect::Reload(Level::Top));
        }
        effects.extend([
            Effect::Reload(Level::Mid),
            Effect::Resubscribe(Level::Mid),
            Effect::Reload(Level::Leaf),
            Effect::Resubscribe(Level::Leaf),
        ]);
        self.run_effects(effects).await;
        outcome
    }

    pub async fn select_top(&self, analyst: Option<Analyst>) {
        self.select_entity(Level::Top, analyst.map(Entity::from))
            .await;
    }

    pub async fn select_mid(&self, client: Option<Client>) {
        self.select_entity(Level::Mid, client.map(Entity::from))
            .await;
    }

    pub async fn select_leaf(&self, farm: Option<Farm>) {
        self.select_entity(Level::Leaf, farm.map(Entity::from)).await;
    }

    pub async fn select_top_by_id(&self, id: Option<&str>) {
        self.select(Level::Top, id).await;
    }

    pub async fn select_mid_by_id(&self, id: Option<&str>) {
        self.select(Level::Mid, id).await;
    }

    pub async fn select_leaf_by_id(&self, id: Option<&str>) {
        self.select(Level::Leaf, id).await;
    }

    pub async fn search_top(&self, term: &str) {
        self.search(Level::Top, term).await;
    }

    pub async fn search_mid(&self, term: &str) {
        self.search(Level::Mid, term).await;
    }

    pub async fn search_leaf(&self, term: &str) {
        self.search(Level::Leaf, term).await;
    }

    pub async fn load_more_top(&self) {
        self.load_more(Level::Top).await;
    }

    pub async fn load_more_mid(&self) {
        self.load_more(Level::Mid).await;
    }

    pub async fn load_more_leaf(&self) {
        self.load_more(Level::Leaf).await;
    }

    /// Selects `id` at `level`, cascading clears and reloads below it.
    pub async fn select(&self, level: Level, id: Option<&str>) {
        if !self.accepts_top_level(level) {
            return;
        }
        let transition = self
            .inner
            .dispatch(Action::select(level, id.map(str::to_string)));
        let effects = self.inner.settle(&transition);
        self.run_effects(effects).await;
    }

    /// Like [`Self::select`], also caching `entity` for display. A record
    /// owned by someone other than the current parent is ignored.
    pub async fn select_entity(&self, level: Level, entity: Option<Entity>) {
        if !self.accepts_top_level(level) {
            return;
        }
        if let Some(entity) = &entity {
            let conflict = self.inner.store.read(|state| state.parent_conflict(entity));
            if entity.level() != level || conflict {
                warn!(
                    "ignoring {} selection of {} {}",
                    level.noun(),
                    entity.level().noun(),
                    entity.id()
                );
                return;
            }
        }
        let id = entity.as_ref().map(|entity| entity.id().to_string());
        let mut transition = self.inner.dispatch(Action::select(level, id));
        if entity.is_some() {
            transition = transition.merge(
                self.inner
                    .dispatch(Action::SetSelectedEntity { level, entity }),
            );
        }
        let effects = self.inner.settle(&transition);
        self.run_effects(effects).await;
    }

    /// Debounced search. Returns early when a newer keystroke for the same
    /// level replaced this one.
    pub async fn search(&self, level: Level, term: &str) {
        if !self.accepts_top_level(level) {
            return;
        }
        let token = self.inner.controller(level).arm_debounce();
        tokio::select! {
            _ = token.cancelled() => {
                debug!("{} search {term:?} replaced before it fired", level.noun());
                return;
            }
            _ = tokio::time::sleep(self.inner.config.search_debounce()) => {}
        }
        let effects = self.load(level, false, Some(term), false).await;
        self.run_effects(effects).await;
    }

    /// Appends the next page with the active search term. No-op while the
    /// level is loading or when the last page came back short.
    pub async fn load_more(&self, level: Level) {
        let (has_more, is_loading) = self.inner.store.read(|state| {
            let list = state.list(level);
            (list.has_more, list.is_loading)
        });
        if !has_more || is_loading {
            debug!(
                "load more {} skipped (has_more={has_more}, loading={is_loading})",
                level.noun()
            );
            return;
        }
        let effects = self.load(level, true, None, false).await;
        self.run_effects(effects).await;
    }

    /// Non-append reload of `level` with its active search term.
    pub async fn refresh_level(&self, level: Level) {
        let effects = self.load(level, false, None, false).await;
        self.run_effects(effects).await;
    }

    /// Realtime reload keeping the active search. Deleting the selected
    /// record re-runs the default selection even while a search is active.
    async fn reload_after_change(&self, level: Level, event: &ChangeEvent) {
        let selected_deleted = event.kind == ChangeKind::Delete
            && self
                .inner
                .store
                .read(|state| state.selection().id(level) == Some(event.id.as_str()));
        if selected_deleted {
            debug!("selected {} {} was deleted", level.noun(), event.id);
        }
        let effects = self.load(level, false, None, selected_deleted).await;
        self.run_effects(effects).await;
    }

    /// Swaps the caller identity, rescoping and reloading what depends on it.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let transition = self.inner.dispatch(Action::SetIdentity(identity));
        let mut effects = Vec::new();
        if self.inner.browses_top_level() {
            effects.push(Effect::Reload(Level::Top));
        } else {
            self.inner.top.reset();
        }
        effects.extend(self.inner.settle(&transition));
        self.run_effects(effects).await;
    }

    /// Drops all state, closes the change feeds and removes every persisted
    /// selection key.
    pub async fn sign_out(&self) {
        for level in Level::ALL {
            self.inner.controller(level).reset();
        }
        self.inner.realtime.shutdown().await;
        self.inner.dispatch(Action::Reset);
        self.inner.persistence.clear_all();
        info!("signed out; selection cleared");
    }

    /// Cancels in-flight work and closes the change feeds.
    pub async fn shutdown(&self) {
        for level in Level::ALL {
            self.inner.controller(level).cancel();
        }
        self.inner.realtime.shutdown().await;
    }

    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.inner.store.subscribe()
    }

    pub fn snapshot(&self) -> SelectionState {
        self.inner.store.snapshot()
    }

    pub fn selection(&self) -> Selection {
        self.inner.store.read(|state| state.selection().clone())
    }

    pub fn level(&self, level: Level) -> LevelListState {
        self.inner.store.read(|state| state.list(level).clone())
    }

    pub fn selected(&self, level: Level) -> Option<Entity> {
        self.inner.store.read(|state| state.selected(level).cloned())
    }

    pub fn selected_analyst(&self) -> Option<Analyst> {
        self.inner
            .store
            .read(|state| state.selected_analyst().cloned())
    }

    pub fn selected_client(&self) -> Option<Client> {
        self.inner.store.read(|state| state.selected_client().cloned())
    }

    pub fn selected_farm(&self) -> Option<Farm> {
        self.inner.store.read(|state| state.selected_farm().cloned())
    }

    pub fn effective_top_id(&self) -> Option<String> {
        self.inner
            .store
            .read(|state| state.effective_top_id().map(str::to_string))
    }

    pub fn search_term(&self, level: Level) -> Option<String> {
        self.inner.controller(level).search_term()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn accepts_top_level(&self, level: Level) -> bool {
        if level == Level::Top && !self.inner.browses_top_level() {
            warn!("analyst selection is not available to this caller");
            return false;
        }
        true
    }

    async fn load(
        &self,
        level: Level,
        append: bool,
        search: Option<&str>,
        force_fallback: bool,
    ) -> Vec<Effect> {
        if level == Level::Top && !self.inner.browses_top_level() {
            return Vec::new();
        }
        let outcome = self
            .inner
            .controller(level)
            .load(
                self.inner.backend.as_ref(),
                &self.inner.store,
                append,
                search,
                force_fallback,
            )
            .await;
        match outcome {
            LoadOutcome::Applied(transition) => self.inner.settle(&transition),
            LoadOutcome::Superseded | LoadOutcome::Failed(_) => Vec::new(),
        }
    }

    async fn resubscribe(&self, level: Level) {
        if !self.inner.config.realtime || level == Level::Top {
            return;
        }
        let store = &self.inner.store;
        let sink: Arc<dyn ChangeSink> = Arc::new(EngineSink(Arc::downgrade(&self.inner)));
        self.inner
            .realtime
            .sync(
                level,
                || store.read(|state| state.parent_id_for(level).map(str::to_string)),
                self.inner.backend.as_ref(),
                sink,
            )
            .await;
    }

    /// Drains `initial` and everything it produces, in order, skipping effects
    /// already queued.
    async fn run_effects(&self, initial: Vec<Effect>) {
        let mut queue = VecDeque::new();
        for effect in initial {
            if !queue.contains(&effect) {
                queue.push_back(effect);
            }
        }
        while let Some(effect) = queue.pop_front() {
            let follow_ups = match effect {
                Effect::Reload(level) => self.load(level, false, None, false).await,
                Effect::Resubscribe(level) => {
                    self.resubscribe(level).await;
                    Vec::new()
                }
            };
            for effect in follow_ups {
                if !queue.contains(&effect) {
                    queue.push_back(effect);
                }
            }
        }
    }
}
