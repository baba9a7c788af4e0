//! One-shot startup check of hydrated ids.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use fieldscope_protocol::Level;
use fieldscope_protocol::Validity;
use tracing::info;
use tracing::warn;

use crate::backend::SelectionBackend;
use crate::store::Action;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Already ran, disabled, or nothing was hydrated.
    Skipped,
    Passed,
    /// These levels held ids the backend no longer recognizes.
    Cleared(Vec<Level>),
    /// The check itself failed; hydrated ids were kept.
    FailedOpen(String),
}

#[derive(Debug, Default)]
pub struct ValidationGate {
    ran: AtomicBool,
}

impl ValidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run(&self, backend: &dyn SelectionBackend, store: &Store) -> GateOutcome {
        if self.ran.swap(true, Ordering::SeqCst) {
            return GateOutcome::Skipped;
        }
        let (selection, scope) = store.read(|state| {
            (
                state.selection().clone(),
                state.effective_top_id().map(str::to_string),
            )
        });
        if selection.is_empty() {
            return GateOutcome::Skipped;
        }

        let report = match backend.validate_ids(&selection, scope.as_deref()).await {
            Ok(report) => report,
            Err(err) => {
                warn!("selection validation failed, keeping hydrated ids: {err}");
                return GateOutcome::FailedOpen(err.to_string());
            }
        };

        let invalid: Vec<Level> = Level::ALL
            .into_iter()
            .filter(|level| {
                selection.id(*level).is_some() && report.get(*level) == Validity::Invalid
            })
            .collect();
        if invalid.is_empty() {
            info!("hydrated selection is still valid");
            return GateOutcome::Passed;
        }

        let mut cleaned = selection;
        for level in &invalid {
            *cleaned.slot_mut(*level) = None;
        }
        info!("clearing stale selection ids: {invalid:?}");
        store.dispatch(Action::HydrateIds {
            top: cleaned.top_id,
            mid: cleaned.mid_id,
            leaf: cleaned.leaf_id,
        });
        GateOutcome::Cleared(invalid)
    }
}
