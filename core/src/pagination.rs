//! Per-level paging, search and supersession.
//!
//! Every fetch carries a generation and a [`CancellationToken`]. Starting a
//! fetch cancels the previous token for the level, so the last request wins
//! no matter which response lands first.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use fieldscope_protocol::Entity;
use fieldscope_protocol::Level;
use fieldscope_protocol::ListQuery;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::backend::BackendError;
use crate::backend::SelectionBackend;
use crate::store::Action;
use crate::store::Store;
use crate::store::Transition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page reached the store; carries the combined transition of the
    /// list update and any default selection.
    Applied(Transition),
    /// A newer request, a reset or a parent change made this one obsolete.
    Superseded,
    /// The backend failed; the level's error flag is set.
    Failed(String),
}

/// Whether a finished page runs the default-selection rule.
///
/// Appended pages never do. While a search is active the selection is left
/// alone unless `forced`, which a deletion of the selected record requests.
pub fn runs_default_selection(append: bool, search_active: bool, forced: bool) -> bool {
    !append && (!search_active || forced)
}

#[derive(Debug, Default)]
struct ControllerState {
    offset: usize,
    search_term: Option<String>,
    fetch: CancellationToken,
    debounce: CancellationToken,
    generation: u64,
}

impl ControllerState {
    fn supersede(&mut self) -> (u64, CancellationToken) {
        self.fetch.cancel();
        self.fetch = CancellationToken::new();
        self.generation += 1;
        (self.generation, self.fetch.clone())
    }
}

struct FetchTicket {
    generation: u64,
    token: CancellationToken,
    query: ListQuery,
    append: bool,
    force_fallback: bool,
}

#[derive(Debug)]
pub struct LevelController {
    level: Level,
    page_size: usize,
    state: Mutex<ControllerState>,
}

impl LevelController {
    pub fn new(level: Level, page_size: usize) -> Self {
        Self {
            level,
            page_size,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Rows already loaded for the current list; the next append starts here.
    pub fn offset(&self) -> usize {
        self.state().offset
    }

    pub fn search_term(&self) -> Option<String> {
        self.state().search_term.clone()
    }

    /// Starts a new debounce window, cancelling the pending one.
    pub fn arm_debounce(&self) -> CancellationToken {
        let mut state = self.state();
        state.debounce.cancel();
        state.debounce = CancellationToken::new();
        state.debounce.clone()
    }

    /// Cancels pending searches and the in-flight fetch.
    pub fn cancel(&self) {
        let mut state = self.state();
        state.debounce.cancel();
        state.supersede();
    }

    /// Forgets the list position and search term, e.g. after the parent
    /// changed.
    pub fn reset(&self) {
        let mut state = self.state();
        state.debounce.cancel();
        state.supersede();
        state.offset = 0;
        state.search_term = None;
    }

    /// Fetches one page into `store`.
    ///
    /// `search` replaces the active search term when given; `None` keeps the
    /// last one. `force_fallback` re-selects even under an active search when
    /// the selected id is gone from the page. A level whose owner is unset is
    /// emptied without a fetch.
    pub async fn load(
        &self,
        backend: &dyn SelectionBackend,
        store: &Store,
        append: bool,
        search: Option<&str>,
        force_fallback: bool,
    ) -> LoadOutcome {
        let parent = store.read(|state| state.parent_id_for(self.level).map(str::to_string));
        if self.level.parent().is_some() && parent.is_none() {
            return LoadOutcome::Applied(self.clear_orphaned(store));
        }

        let ticket = self.begin(append, search, parent, force_fallback);
        debug!(
            "loading {} page at offset {} (search {:?})",
            self.level.noun(),
            ticket.query.offset,
            ticket.query.search
        );
        store.dispatch(Action::SetLoading {
            level: self.level,
            loading: true,
        });

        let result = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => {
                debug!("{} fetch superseded in flight", self.level.noun());
                return LoadOutcome::Superseded;
            }
            result = backend.list(&ticket.query) => result,
        };
        self.finish(ticket, result, store)
    }

    fn begin(
        &self,
        append: bool,
        search: Option<&str>,
        parent: Option<String>,
        force_fallback: bool,
    ) -> FetchTicket {
        let mut state = self.state();
        if !append {
            state.offset = 0;
        }
        if let Some(term) = search {
            let term = term.trim();
            state.search_term = (!term.is_empty()).then(|| term.to_string());
        }
        let (generation, token) = state.supersede();
        let query = ListQuery::new(self.level, state.offset, self.page_size)
            .with_parent(parent)
            .with_search(state.search_term.clone());
        FetchTicket {
            generation,
            token,
            query,
            append,
            force_fallback,
        }
    }

    /// Applies a finished fetch if it is still the current one. The checks
    /// and the dispatch happen under the controller lock.
    fn finish(
        &self,
        ticket: FetchTicket,
        result: Result<Vec<Entity>, BackendError>,
        store: &Store,
    ) -> LoadOutcome {
        let mut state = self.state();
        if state.generation != ticket.generation || ticket.token.is_cancelled() {
            debug!("dropping superseded {} page", self.level.noun());
            return LoadOutcome::Superseded;
        }
        let parent = store.read(|current| current.parent_id_for(self.level).map(str::to_string));
        if parent != ticket.query.parent_id {
            debug!(
                "dropping {} page for {:?}: owner is now {parent:?}",
                self.level.noun(),
                ticket.query.parent_id
            );
            return LoadOutcome::Superseded;
        }

        let items = match result {
            Ok(items) => items,
            Err(err) => {
                warn!("failed to load {} list: {err}", self.level.noun());
                store.dispatch(Action::SetError {
                    level: self.level,
                    message: Some(err.to_string()),
                });
                return LoadOutcome::Failed(err.to_string());
            }
        };

        state.offset = ticket.query.offset + items.len();
        // Full page means "maybe more"; an exact multiple costs one empty fetch.
        let has_more = items.len() == self.page_size;
        let select_default = runs_default_selection(
            ticket.append,
            ticket.query.search.is_some(),
            ticket.force_fallback,
        );
        LoadOutcome::Applied(self.apply_page(store, items, ticket.append, select_default, has_more))
    }

    fn clear_orphaned(&self, store: &Store) -> Transition {
        let mut state = self.state();
        state.debounce.cancel();
        state.supersede();
        state.offset = 0;
        self.apply_page(store, Vec::new(), false, true, false)
    }

    /// The list write and the default selection are one dispatch, so a user
    /// selection can never land between the decision and the write.
    fn apply_page(
        &self,
        store: &Store,
        items: Vec<Entity>,
        append: bool,
        select_default: bool,
        has_more: bool,
    ) -> Transition {
        store.dispatch(Action::SetList {
            level: self.level,
            items,
            append,
            has_more,
            select_default,
        })
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
