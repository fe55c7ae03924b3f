mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::mocks::{MockContentGateway, MockPushChannel};
use common::{start_session, start_session_with, test_config, wait_for_empty_queue, wait_until};
use offline_sync::{
    ConfirmedItem, Connectivity, OperationPayload, RealtimeEvent, Scope, ViewHandle, ViewUpdate,
};
use std::time::Duration;

fn created(server_id: &str, minutes_ago: i64) -> RealtimeEvent {
    RealtimeEvent::Created(ConfirmedItem {
        server_id: server_id.to_string(),
        client_id: None,
        scope: Scope::global_feed(),
        version: 1,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        body: serde_json::json!({ "content": server_id }),
    })
}

async fn next_update(handle: &mut ViewHandle) -> ViewUpdate {
    tokio::time::timeout(Duration::from_secs(3), handle.next())
        .await
        .expect("view update")
        .expect("view open")
}

#[tokio::test]
async fn self_echo_does_not_duplicate_own_post() {
    let push = MockPushChannel::new();
    let gateway = MockContentGateway::new().with_echo(push.clone());
    let ctx = start_session_with(test_config(), Connectivity::Online, gateway, push).await;
    let feed = Scope::global_feed();
    let mut view = ctx.session.watch(feed.clone()).await.unwrap();

    let provisional = ctx
        .session
        .create_post(feed.clone(), OperationPayload::text("echo me"))
        .await
        .unwrap();
    wait_for_empty_queue(&ctx.session).await;
    ctx.session.wait_idle().await;

    // エコーと送信応答のどちらが先でも Confirmed が届く
    let (client_id, item) = loop {
        match next_update(&mut view).await {
            ViewUpdate::Confirmed { client_id, item } => break (client_id, item),
            ViewUpdate::Upserted(item) => assert_eq!(item.client_id, provisional.client_id),
            other => panic!("unexpected update: {other:?}"),
        }
    };
    assert_eq!(Some(client_id), provisional.client_id);
    assert_eq!(item.server_id.as_deref(), Some("p-500"));

    let page = ctx.session.feed(&feed, 0, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].server_id.as_deref(), Some("p-500"));
}

#[tokio::test]
async fn duplicate_delivery_keeps_one_item() {
    let ctx = start_session(test_config(), Connectivity::Online).await;
    let feed = Scope::global_feed();
    let mut view = ctx.session.watch(feed.clone()).await.unwrap();

    ctx.push.emit(created("p-1", 0)).await;
    ctx.push.emit(created("p-1", 0)).await;
    next_update(&mut view).await;
    next_update(&mut view).await;

    let page = ctx.session.feed(&feed, 0, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn unknown_delete_is_ignored_and_stream_continues() {
    let ctx = start_session(test_config(), Connectivity::Online).await;
    let feed = Scope::global_feed();
    let mut view = ctx.session.watch(feed.clone()).await.unwrap();

    ctx.push
        .emit(RealtimeEvent::Deleted {
            scope: feed.clone(),
            server_id: "p-missing".into(),
        })
        .await;
    ctx.push.emit(created("p-2", 0)).await;

    match next_update(&mut view).await {
        ViewUpdate::Upserted(item) => assert_eq!(item.server_id.as_deref(), Some("p-2")),
        other => panic!("unexpected update: {other:?}"),
    }
}

#[tokio::test]
async fn delete_removes_item_from_cache_and_view() {
    let ctx = start_session(test_config(), Connectivity::Online).await;
    let feed = Scope::global_feed();
    let mut view = ctx.session.watch(feed.clone()).await.unwrap();

    ctx.push.emit(created("p-3", 0)).await;
    next_update(&mut view).await;
    ctx.push
        .emit(RealtimeEvent::Deleted {
            scope: feed.clone(),
            server_id: "p-3".into(),
        })
        .await;

    match next_update(&mut view).await {
        ViewUpdate::Removed { server_id, .. } => assert_eq!(server_id, "p-3"),
        other => panic!("unexpected update: {other:?}"),
    }
    assert!(ctx.session.feed(&feed, 0, None).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn cache_stays_bounded_and_keeps_pending_items() {
    let mut config = test_config();
    config.cache.max_items_per_scope = 10;
    let ctx = start_session(config, Connectivity::Offline).await;
    let feed = Scope::global_feed();
    let mut view = ctx.session.watch(feed.clone()).await.unwrap();

    let pending = ctx
        .session
        .create_post(feed.clone(), OperationPayload::text("offline draft"))
        .await
        .unwrap();

    for n in 0..30 {
        // 新しいものほど後に届く
        ctx.push.emit(created(&format!("p-{n}"), 60 - n)).await;
    }
    for _ in 0..30 {
        next_update(&mut view).await;
    }

    let page = ctx.session.feed(&feed, 100, None).await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert!(page
        .items
        .iter()
        .any(|item| item.client_id == pending.client_id));
    assert_eq!(page.items[0].client_id, pending.client_id);
    assert_eq!(page.items[1].server_id.as_deref(), Some("p-29"));
}

#[tokio::test]
async fn closing_last_view_unsubscribes() {
    let ctx = start_session(test_config(), Connectivity::Online).await;
    let feed = Scope::global_feed();

    let first = ctx.session.watch(feed.clone()).await.unwrap();
    let second = ctx.session.watch(feed.clone()).await.unwrap();
    assert_eq!(ctx.push.subscriber_count().await, 1);

    drop(first);
    drop(second);

    let push = ctx.push.clone();
    wait_until("push stream to close", move || {
        let push = push.clone();
        async move { push.subscriber_count().await == 0 }
    })
    .await;
}
