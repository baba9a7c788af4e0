//! Change-feed subscriptions that keep the client and farm lists fresh.
//!
//! Each level has at most one subscription, keyed by the owner id it is
//! scoped to. Moving to a new owner tears the old subscription down before
//! the replacement is opened.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fieldscope_protocol::ChangeEvent;
use fieldscope_protocol::Level;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::backend::ChangeFeed;
use crate::backend::SelectionBackend;

/// Receives change notifications for a subscribed level.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn invalidate(&self, level: Level, event: ChangeEvent);
}

struct Subscription {
    scope_id: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    fn open(level: Level, scope_id: String, feed: ChangeFeed, sink: Arc<dyn ChangeSink>) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(drain_feed(level, feed, sink, token.clone()));
        Self {
            scope_id,
            token,
            task,
        }
    }

    /// Cancels the drain task and waits for it to drop the feed.
    async fn close(mut self) {
        self.token.cancel();
        if let Err(err) = (&mut self.task).await
            && !err.is_cancelled()
        {
            warn!("realtime task for {} ended abnormally: {err}", self.scope_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn drain_feed(
    level: Level,
    mut feed: ChangeFeed,
    sink: Arc<dyn ChangeSink>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = feed.recv() => event,
        };
        let Some(event) = event else {
            debug!("{} change feed closed by backend", level.noun());
            break;
        };
        debug!("{} change: {:?} {}", level.noun(), event.kind, event.id);
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sink.invalidate(level, event) => {}
        }
    }
}

#[derive(Default)]
pub struct RealtimeInvalidator {
    subscriptions: Mutex<HashMap<Level, Subscription>>,
}

impl RealtimeInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `level`'s subscription at the scope `resolve_scope` returns.
    /// The scope is resolved under the subscription lock, so the last sync to
    /// run sees the latest owner. Unchanged scopes keep their subscription;
    /// `None` only tears down.
    pub async fn sync(
        &self,
        level: Level,
        resolve_scope: impl FnOnce() -> Option<String> + Send,
        backend: &dyn SelectionBackend,
        sink: Arc<dyn ChangeSink>,
    ) {
        let mut subscriptions = self.subscriptions.lock().await;
        let scope_id = resolve_scope();
        let current = subscriptions
            .get(&level)
            .map(|subscription| subscription.scope_id.as_str());
        if current.is_some() && current == scope_id.as_deref() {
            return;
        }
        if let Some(previous) = subscriptions.remove(&level) {
            debug!(
                "closing {} subscription for {}",
                level.noun(),
                previous.scope_id
            );
            previous.close().await;
        }
        let Some(scope_id) = scope_id else {
            return;
        };

        match backend.subscribe(level, &scope_id).await {
            Ok(feed) => {
                debug!("subscribed to {} changes under {scope_id}", level.noun());
                subscriptions.insert(level, Subscription::open(level, scope_id, feed, sink));
            }
            Err(err) => {
                warn!(
                    "realtime subscription for {} under {scope_id} failed: {err}",
                    level.noun()
                );
            }
        }
    }

    pub async fn active_scope(&self, level: Level) -> Option<String> {
        self.subscriptions
            .lock()
            .await
            .get(&level)
            .map(|subscription| subscription.scope_id.clone())
    }

    pub async fn shutdown(&self) {
        let drained: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions.lock().await;
            subscriptions.drain().map(|(_, subscription)| subscription).collect()
        };
        for subscription in drained {
            subscription.close().await;
        }
    }
}
