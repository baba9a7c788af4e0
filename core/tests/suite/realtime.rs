use anyhow::Result;
use fieldscope_protocol::Level;
use fieldscope_protocol::Selection;
use fieldscope_test_support::fixtures::client;
use fieldscope_test_support::fixtures::farm;
use fieldscope_test_support::fixtures::small_portfolio;
use fieldscope_test_support::test_engine::TestEngine;
use fieldscope_test_support::test_engine::test_engine;
use fieldscope_test_support::wait_for_state;
use pretty_assertions::assert_eq;

async fn live_engine() -> Result<TestEngine> {
    test_engine()
        .with_config(|config| config.realtime = true)
        .with_records(small_portfolio())
        .start()
        .await
}

#[tokio::test]
async fn subscriptions_follow_the_selected_parents() -> Result<()> {
    let test = live_engine().await?;
    assert_eq!(test.backend.subscribed_scopes(Level::Mid), vec!["a1"]);
    assert_eq!(test.backend.subscribed_scopes(Level::Leaf), vec!["c1"]);
    assert!(test.backend.subscribed_scopes(Level::Top).is_empty());

    test.engine.select_top_by_id(Some("a2")).await;
    assert_eq!(test.backend.subscribed_scopes(Level::Mid), vec!["a2"]);
    assert_eq!(test.backend.subscribed_scopes(Level::Leaf), vec!["c9"]);
    Ok(())
}

#[tokio::test]
async fn inserted_client_refreshes_the_list_and_keeps_selection() -> Result<()> {
    let test = live_engine().await?;
    test.backend.insert(client("c0", "Aardvark", "a1"));

    let state = wait_for_state(&test.engine, |state| {
        state.list(Level::Mid).items.len() == 3 && !state.list(Level::Mid).is_loading
    })
    .await;
    assert_eq!(state.list(Level::Mid).items[0].name(), "Aardvark");
    assert_eq!(
        state.selection(),
        &Selection::new(Some("a1"), Some("c1"), Some("f1"))
    );
    Ok(())
}

#[tokio::test]
async fn deleted_selected_client_cascades_to_the_next_one() -> Result<()> {
    let test = live_engine().await?;
    test.backend.remove(Level::Mid, "c1");

    let state = wait_for_state(&test.engine, |state| {
        state.selection().leaf_id.as_deref() == Some("f3")
    })
    .await;
    assert_eq!(state.selection().mid_id.as_deref(), Some("c2"));
    assert_eq!(state.list(Level::Mid).items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleting_the_selected_client_under_search_moves_the_selection() -> Result<()> {
    let test = test_engine()
        .with_config(|config| {
            config.realtime = true;
            config.search_debounce_ms = 0;
        })
        .with_records(small_portfolio())
        .start()
        .await?;
    test.engine.search_mid("bra").await;
    let state = test.engine.snapshot();
    assert_eq!(state.selection().mid_id.as_deref(), Some("c1"));
    assert_eq!(state.list(Level::Mid).items.len(), 1);

    test.backend.remove(Level::Mid, "c1");
    let state = wait_for_state(&test.engine, |state| {
        state.selection().leaf_id.as_deref() == Some("f3")
    })
    .await;
    assert_eq!(state.selection().mid_id.as_deref(), Some("c2"));
    assert_eq!(state.list(Level::Mid).items[0].name(), "Bravo");
    assert_eq!(test.engine.search_term(Level::Mid).as_deref(), Some("bra"));
    assert!(state.list(Level::Leaf).find("f1").is_none());
    Ok(())
}

#[tokio::test]
async fn changes_under_other_owners_are_not_delivered() -> Result<()> {
    let test = live_engine().await?;
    test.backend.clear_queries();
    test.backend.insert(farm("f9", "Ipê", "c2"));
    test.backend.insert(client("c8", "Yankee", "a2"));
    // Only this one is under a subscribed owner.
    test.backend.insert(farm("f0", "Aroeira", "c1"));
    wait_for_state(&test.engine, |state| {
        state.list(Level::Leaf).find("f0").is_some()
    })
    .await;
    assert!(test.backend.queries_for(Level::Mid).is_empty());
    assert_eq!(test.backend.queries_for(Level::Leaf).len(), 1);
    Ok(())
}

#[tokio::test]
async fn sign_out_closes_every_subscription() -> Result<()> {
    let test = live_engine().await?;
    test.engine.sign_out().await;
    assert!(test.backend.subscribed_scopes(Level::Mid).is_empty());
    assert!(test.backend.subscribed_scopes(Level::Leaf).is_empty());

    test.backend.clear_queries();
    test.backend.insert(client("c0", "Aardvark", "a1"));
    tokio::task::yield_now().await;
    assert!(test.backend.queries().is_empty());
    Ok(())
}

#[tokio::test]
async fn realtime_can_be_disabled() -> Result<()> {
    let test = test_engine().with_records(small_portfolio()).start().await?;
    assert!(test.backend.subscribed_scopes(Level::Mid).is_empty());
    assert!(test.backend.subscribed_scopes(Level::Leaf).is_empty());
    Ok(())
}
