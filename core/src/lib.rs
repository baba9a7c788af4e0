/*!
# Fieldscope Core

Cascading analyst → client → farm selection with paging, search, durable
persistence and realtime invalidation.

## Features

- **Single reducer**: every mutation goes through one pure transition, so a
  parent change and the clearing of its children are observed together
- **Per-level paging and search**: debounced search, load-more, last request wins
- **Role scoping**: restricted callers only ever see their own portfolio
- **Persistence**: the selected ids survive reloads; older storage layouts
  are migrated on first read
- **Validation and realtime**: stale ids are cleared at startup, lists reload
  when the backend reports a change

## Example

```rust,no_run
use std::sync::Arc;

use fieldscope_core::{EngineConfig, FileStore, MemoryBackend, SelectionEngine};
use fieldscope_protocol::{Identity, Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::load("fixtures.json".as_ref())?);
    let storage = Arc::new(FileStore::new(".fieldscope".as_ref()));
    let engine = SelectionEngine::new(
        EngineConfig::default(),
        backend,
        storage,
        Some(Identity::new("a1", Role::Analyst)),
    )?;

    engine.start().await;
    engine.search_mid("santa").await;
    println!("{:?}", engine.selection());
    Ok(())
}
```
*/

pub mod backend;
mod config;
mod engine;
mod error;
pub mod memory;
pub mod pagination;
pub mod persistence;
pub mod realtime;
pub mod scoping;
pub mod storage;
pub mod store;
pub mod validation;

pub use backend::{BackendError, ChangeFeed, SelectionBackend};
pub use config::EngineConfig;
pub use engine::SelectionEngine;
pub use error::{Result, SelectionError};
pub use memory::{Dataset, MemoryBackend};
pub use persistence::{HydrateSource, SelectionPersistence};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{LevelListState, SelectionState, Transition};
pub use validation::GateOutcome;
