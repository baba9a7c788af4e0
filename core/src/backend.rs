//! Contract for the remote data source behind the selection engine.

use async_trait::async_trait;
use fieldscope_protocol::ChangeEvent;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Level;
use fieldscope_protocol::ListQuery;
use fieldscope_protocol::Selection;
use fieldscope_protocol::ValidationReport;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("operation unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Receiving half of a change-feed subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeFeed {
    pub fn channel() -> (mpsc::UnboundedSender<ChangeEvent>, ChangeFeed) {
        let (tx, receiver) = mpsc::unbounded_channel();
        (tx, ChangeFeed { receiver })
    }

    /// Next event, or `None` once the backend closed the feed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait SelectionBackend: Send + Sync {
    /// One page of `query.level` records, ordered by name ascending, limited
    /// to the inclusive `query.range()`.
    async fn list(&self, query: &ListQuery) -> Result<Vec<Entity>, BackendError>;

    /// Batched check of persisted ids. `scope_top_id` is the analyst the
    /// caller is scoped to, which decides whether a client is still
    /// accessible.
    async fn validate_ids(
        &self,
        selection: &Selection,
        scope_top_id: Option<&str>,
    ) -> Result<ValidationReport, BackendError>;

    /// Change notifications for `level` records owned by `scope_id`.
    async fn subscribe(&self, level: Level, scope_id: &str) -> Result<ChangeFeed, BackendError>;
}
