use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Level;
use fieldscope_protocol::Selection;
use fieldscope_test_support::fixtures::analyst;
use fieldscope_test_support::fixtures::client;
use fieldscope_test_support::fixtures::numbered_clients;
use fieldscope_test_support::fixtures::numbered_farms;
use fieldscope_test_support::fixtures::small_portfolio;
use fieldscope_test_support::test_engine::test_engine;
use pretty_assertions::assert_eq;

fn portfolio_with_clients(count: usize) -> Vec<Entity> {
    let mut records: Vec<Entity> = vec![analyst("a1", "Ana").into()];
    records.extend(numbered_clients("a1", count));
    records
}

fn is_name_ordered(items: &[Entity]) -> bool {
    items
        .windows(2)
        .all(|pair| pair[0].sort_key() <= pair[1].sort_key())
}

#[tokio::test]
async fn first_page_is_name_ordered_and_selects_first() -> Result<()> {
    let test = test_engine()
        .with_records(portfolio_with_clients(120))
        .start()
        .await?;

    let mid = test.engine.level(Level::Mid);
    assert_eq!(mid.items.len(), 50);
    assert!(mid.has_more);
    assert!(is_name_ordered(&mid.items));
    assert_eq!(mid.items[0].name(), "Client 001");
    assert_eq!(
        test.engine.selection(),
        Selection::new(Some("a1"), Some("a1-c1"), None::<String>)
    );

    let queries = test.backend.queries_for(Level::Mid);
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].range(), (0, 49));
    assert_eq!(queries[0].parent_id.as_deref(), Some("a1"));
    Ok(())
}

#[tokio::test]
async fn load_more_walks_to_the_end_then_stops() -> Result<()> {
    let test = test_engine()
        .with_records(portfolio_with_clients(120))
        .start()
        .await?;

    test.engine.load_more_mid().await;
    assert_eq!(test.engine.level(Level::Mid).items.len(), 100);
    assert!(test.engine.level(Level::Mid).has_more);

    test.engine.load_more_mid().await;
    let mid = test.engine.level(Level::Mid);
    assert_eq!(mid.items.len(), 120);
    assert!(!mid.has_more);
    assert!(is_name_ordered(&mid.items));

    test.engine.load_more_mid().await;
    let offsets: Vec<usize> = test
        .backend
        .queries_for(Level::Mid)
        .iter()
        .map(|query| query.offset)
        .collect();
    assert_eq!(offsets, vec![0, 50, 100]);
    // Appending never moves the selection.
    assert_eq!(test.engine.selection().mid_id.as_deref(), Some("a1-c1"));
    Ok(())
}

#[tokio::test]
async fn exact_multiple_costs_one_empty_page() -> Result<()> {
    let test = test_engine()
        .with_records(portfolio_with_clients(100))
        .start()
        .await?;

    test.engine.load_more_mid().await;
    assert!(test.engine.level(Level::Mid).has_more);

    test.engine.load_more_mid().await;
    let mid = test.engine.level(Level::Mid);
    assert_eq!(mid.items.len(), 100);
    assert!(!mid.has_more);
    assert_eq!(test.backend.queries_for(Level::Mid).len(), 3);
    Ok(())
}

#[tokio::test]
async fn farm_pages_append_without_duplicates() -> Result<()> {
    let mut records: Vec<Entity> = vec![
        analyst("a1", "Ana").into(),
        client("c1", "Alpha", "a1").into(),
    ];
    records.extend(numbered_farms("c1", 75));
    let test = test_engine().with_records(records).start().await?;
    assert_eq!(test.engine.level(Level::Leaf).items.len(), 50);

    test.engine.load_more_leaf().await;
    let leaf = test.engine.level(Level::Leaf);
    let ids: HashSet<&str> = leaf.items.iter().map(Entity::id).collect();
    assert_eq!(leaf.items.len(), 75);
    assert_eq!(ids.len(), 75);
    assert!(is_name_ordered(&leaf.items));
    assert!(!leaf.has_more);
    assert_eq!(test.engine.selection().leaf_id.as_deref(), Some("c1-f1"));
    Ok(())
}

#[tokio::test]
async fn configured_page_size_is_honoured() -> Result<()> {
    let test = test_engine()
        .with_config(|config| config.page_size = 2)
        .with_records(small_portfolio())
        .start()
        .await?;
    assert_eq!(test.engine.level(Level::Top).items.len(), 2);
    assert!(test.engine.level(Level::Top).has_more);
    assert_eq!(test.backend.queries_for(Level::Leaf)[0].range(), (0, 1));
    Ok(())
}

#[tokio::test]
async fn failed_page_keeps_list_and_refresh_recovers() -> Result<()> {
    let test = test_engine().with_records(small_portfolio()).start().await?;
    test.backend.fail_lists(
        Level::Mid,
        Some(fieldscope_core::BackendError::Network("connection reset".to_string())),
    );

    test.engine.refresh_level(Level::Mid).await;
    let mid = test.engine.level(Level::Mid);
    assert_eq!(mid.error.as_deref(), Some("network error: connection reset"));
    assert_eq!(mid.items.len(), 2);
    assert!(!mid.is_loading);
    assert_eq!(test.engine.selection().mid_id.as_deref(), Some("c1"));
    // Other levels are unaffected.
    assert_eq!(test.engine.level(Level::Leaf).error, None);

    test.backend.fail_lists(Level::Mid, None);
    test.engine.refresh_level(Level::Mid).await;
    assert_eq!(test.engine.level(Level::Mid).error, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn newer_request_wins_over_slower_older_one() -> Result<()> {
    let test = test_engine()
        .with_config(|config| config.search_debounce_ms = 0)
        .with_records(small_portfolio())
        .start()
        .await?;
    test.backend
        .delay_next_list(Level::Mid, Duration::from_secs(5));

    let slow = tokio::spawn({
        let engine = test.engine.clone();
        async move { engine.search_mid("alpha").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    test.engine.search_mid("bravo").await;
    slow.await?;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let names: Vec<String> = test
        .engine
        .level(Level::Mid)
        .items
        .iter()
        .map(|item| item.name().to_string())
        .collect();
    assert_eq!(names, vec!["Bravo".to_string()]);
    assert_eq!(test.engine.search_term(Level::Mid).as_deref(), Some("bravo"));
    // Search results never move the selection.
    assert_eq!(test.engine.selection().mid_id.as_deref(), Some("c1"));
    Ok(())
}

#[tokio::test]
async fn load_more_is_ignored_when_nothing_is_left() -> Result<()> {
    let test = test_engine().with_records(small_portfolio()).start().await?;
    test.backend.clear_queries();
    test.engine.load_more_top().await;
    test.engine.load_more_mid().await;
    test.engine.load_more_leaf().await;
    assert!(test.backend.queries().is_empty());
    Ok(())
}
