use std::sync::Arc;

use anyhow::Result;
use fieldscope_core::BackendError;
use fieldscope_core::GateOutcome;
use fieldscope_core::MemoryStore;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Identity;
use fieldscope_protocol::Level;
use fieldscope_protocol::Role;
use fieldscope_protocol::Selection;
use fieldscope_test_support::fixtures::analyst;
use fieldscope_test_support::fixtures::client;
use fieldscope_test_support::fixtures::small_portfolio;
use fieldscope_test_support::test_engine::test_engine;
use pretty_assertions::assert_eq;

fn persisted(top: &str, mid: &str, leaf: &str) -> Arc<MemoryStore> {
    let record = format!(r#"{{"version":2,"top_id":"{top}","mid_id":"{mid}","leaf_id":"{leaf}"}}"#);
    Arc::new(MemoryStore::with_entries([("fieldscope.selection", record)]))
}

#[tokio::test]
async fn deleted_farm_is_cleared_and_the_rest_kept() -> Result<()> {
    let test = test_engine()
        .with_records([
            Entity::from(analyst("a1", "Ana")),
            Entity::from(client("c1", "Alpha", "a1")),
        ])
        .with_storage(persisted("a1", "c1", "f-deleted"))
        .build()?;

    let outcome = test.engine.start().await;
    assert_eq!(outcome, GateOutcome::Cleared(vec![Level::Leaf]));
    assert_eq!(
        test.engine.selection(),
        Selection::new(Some("a1"), Some("c1"), None::<String>)
    );
    assert_eq!(test.backend.validation_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn validation_failure_fails_open_and_loading_self_corrects() -> Result<()> {
    let test = test_engine()
        .with_records(small_portfolio())
        .with_storage(persisted("a1", "c-gone", "f-gone"))
        .build()?;
    test.backend
        .fail_validation(Some(BackendError::Unavailable("validate_ids".to_string())));

    let outcome = test.engine.start().await;
    assert!(matches!(outcome, GateOutcome::FailedOpen(_)));
    // The stale client was not on the fresh page, so the first row replaced it.
    assert_eq!(
        test.engine.selection(),
        Selection::new(Some("a1"), Some("c1"), Some("f1"))
    );
    Ok(())
}

#[tokio::test]
async fn revoked_access_is_judged_against_the_callers_scope() -> Result<()> {
    let test = test_engine()
        .with_identity(Some(Identity::new("a1", Role::Analyst)))
        .with_records(small_portfolio())
        .with_storage(persisted("a1", "c9", "f-none"))
        .build()?;

    let outcome = test.engine.start().await;
    assert_eq!(outcome, GateOutcome::Cleared(vec![Level::Mid, Level::Leaf]));
    assert_eq!(test.engine.selection().mid_id.as_deref(), Some("c1"));
    Ok(())
}

#[tokio::test]
async fn nothing_hydrated_means_no_validation_call() -> Result<()> {
    let test = test_engine().with_records(small_portfolio()).build()?;
    assert_eq!(test.engine.start().await, GateOutcome::Skipped);
    assert_eq!(test.backend.validation_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn validation_can_be_disabled() -> Result<()> {
    let test = test_engine()
        .with_config(|config| config.validate_on_start = false)
        .with_records(small_portfolio())
        .with_storage(persisted("a1", "c1", "f1"))
        .build()?;
    assert_eq!(test.engine.start().await, GateOutcome::Skipped);
    assert_eq!(test.backend.validation_calls(), 0);
    Ok(())
}
