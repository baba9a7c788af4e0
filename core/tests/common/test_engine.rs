use std::sync::Arc;

use fieldscope_core::EngineConfig;
use fieldscope_core::MemoryBackend;
use fieldscope_core::MemoryStore;
use fieldscope_core::SelectionEngine;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Identity;
use fieldscope_protocol::Role;

pub struct TestEngine {
    pub engine: SelectionEngine,
    pub backend: Arc<MemoryBackend>,
    pub storage: Arc<MemoryStore>,
}

impl TestEngine {
    /// A second engine over the same backend and storage, as after a reload.
    pub fn reopen(&self, identity: Option<Identity>) -> anyhow::Result<TestEngine> {
        let engine = SelectionEngine::new(
            self.engine.config().clone(),
            self.backend.clone(),
            self.storage.clone(),
            identity,
        )?;
        Ok(TestEngine {
            engine,
            backend: self.backend.clone(),
            storage: self.storage.clone(),
        })
    }
}

pub struct TestEngineBuilder {
    config: EngineConfig,
    identity: Option<Identity>,
    records: Vec<Entity>,
    storage: Arc<MemoryStore>,
}

/// Manager identity, realtime off, empty storage.
pub fn test_engine() -> TestEngineBuilder {
    TestEngineBuilder {
        config: EngineConfig {
            realtime: false,
            ..EngineConfig::default()
        },
        identity: Some(Identity::new("manager-1", Role::Manager)),
        records: Vec::new(),
        storage: Arc::new(MemoryStore::new()),
    }
}

impl TestEngineBuilder {
    pub fn with_config(mut self, mutate: impl FnOnce(&mut EngineConfig)) -> Self {
        mutate(&mut self.config);
        self
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_records(mut self, records: impl IntoIterator<Item = Entity>) -> Self {
        self.records.extend(records);
        self
    }

    pub fn with_storage(mut self, storage: Arc<MemoryStore>) -> Self {
        self.storage = storage;
        self
    }

    pub fn build(self) -> anyhow::Result<TestEngine> {
        let backend = Arc::new(MemoryBackend::from_records(self.records));
        let engine = SelectionEngine::new(
            self.config,
            backend.clone(),
            self.storage.clone(),
            self.identity,
        )?;
        Ok(TestEngine {
            engine,
            backend,
            storage: self.storage,
        })
    }

    /// Builds and runs [`SelectionEngine::start`].
    pub async fn start(self) -> anyhow::Result<TestEngine> {
        let test = self.build()?;
        test.engine.start().await;
        Ok(test)
    }
}
