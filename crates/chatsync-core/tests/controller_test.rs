// Controller lifecycle: cached snapshot first, fetch progress events,
// start/stop/restart semantics and pagination.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use chatsync_api::models::{ChannelPayload, MemberPayload, MessagePayload, UserPayload};
use chatsync_core::{
    Change, ChannelController, ChannelEvent, ChannelId, ChannelListController, ChannelListEvent,
    ChannelListQuery, ChannelListUpdater, ChannelUpdater, CoreError, EntityChange, Filter,
    LocalStore, Pagination, QueryMembership,
};

use common::{ScriptedClient, channel_list, eventually, within};

fn cid(raw: &str) -> ChannelId {
    raw.parse().unwrap()
}

fn drain<E>(events: &mut UnboundedReceiver<E>) -> Vec<E> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Seed `store` with `c1` listed under `query`.
async fn seed(store: &LocalStore, query: &ChannelListQuery) {
    let query = query.clone();
    store
        .write(move |state| {
            let cid = state.upsert_channel(&ChannelPayload::with_cid("messaging:c1"))?;
            state.upsert_member(&cid, &MemberPayload::for_user(UserPayload::with_id("u1")));
            state.apply_query_page(&query, QueryMembership::from([cid]));
            Ok(())
        })
        .await
        .unwrap();
}

fn list_controller(
    client: std::sync::Arc<ScriptedClient>,
    store: &LocalStore,
    query: ChannelListQuery,
) -> (ChannelListController, UnboundedReceiver<ChannelListEvent>) {
    ChannelListController::new(
        query,
        store.clone(),
        ChannelListUpdater::new(client, store.clone()),
    )
}

// ── Channel list controller ─────────────────────────────────────────

#[tokio::test]
async fn cached_list_is_published_before_network() {
    let client = ScriptedClient::gated();
    client.push_ok(channel_list(&[("messaging:c1", &["u1"])]));
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::default();
    seed(&store, &query).await;
    let (mut controller, mut events) = list_controller(client.clone(), &store, query);

    let completion = controller.start_updating();

    match within(events.recv()).await.unwrap() {
        ChannelListEvent::Changed(changes) => {
            assert_eq!(changes.len(), 1);
            assert!(matches!(
                &changes[0],
                Change::Added { index: 0, item } if item.cid == cid("messaging:c1")
            ));
        }
        other => panic!("expected cached snapshot, got {other:?}"),
    }
    assert_eq!(
        within(events.recv()).await.unwrap(),
        ChannelListEvent::WillStartFetching
    );
    assert_eq!(controller.channels().len(), 1);

    client.release();
    within(completion).await.unwrap();
    assert_eq!(
        drain(&mut events).last(),
        Some(&ChannelListEvent::DidStopFetching { error: None })
    );
}

#[tokio::test]
async fn starting_twice_fetches_once() {
    let client = ScriptedClient::new();
    client.push_ok(channel_list(&[("messaging:c1", &[])]));
    let store = LocalStore::in_memory();
    let (mut controller, mut events) =
        list_controller(client.clone(), &store, ChannelListQuery::default());

    within(controller.start_updating()).await.unwrap();
    drain(&mut events);
    within(controller.start_updating()).await.unwrap();

    assert_eq!(client.requests().len(), 1);
    assert!(drain(&mut events).is_empty());
    assert!(controller.is_running());
}

#[tokio::test]
async fn fetch_failure_is_reported_and_cache_kept() {
    let client = ScriptedClient::new();
    client.push_err(chatsync_api::Error::Api {
        status: 500,
        code: None,
        message: "boom".into(),
    });
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::default();
    seed(&store, &query).await;
    let (mut controller, mut events) = list_controller(client, &store, query);

    let result = within(controller.start_updating()).await;

    assert!(matches!(result, Err(CoreError::Api { status: Some(500), .. })));
    let events = drain(&mut events);
    assert!(matches!(
        events.last(),
        Some(ChannelListEvent::DidStopFetching { error: Some(_) })
    ));
    assert_eq!(controller.channels().len(), 1);
}

#[tokio::test]
async fn nothing_is_delivered_after_stop() {
    let client = ScriptedClient::new();
    client.push_ok(channel_list(&[("messaging:c1", &["u1"])]));
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::new(Filter::is_in("members", ["u1"]));
    let (mut controller, mut events) = list_controller(client, &store, query.clone());

    within(controller.start_updating()).await.unwrap();
    drain(&mut events);
    controller.stop();

    store
        .write(|state| {
            let cid = state.upsert_channel(&ChannelPayload::with_cid("messaging:c2"))?;
            state.upsert_member(&cid, &MemberPayload::for_user(UserPayload::with_id("u1")));
            state.reevaluate_queries(&cid);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(store.query_membership(&query).len(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut events).is_empty());
    assert!(!controller.is_running());
}

#[tokio::test]
async fn stop_mid_fetch_cancels_completion() {
    let client = ScriptedClient::gated();
    let store = LocalStore::in_memory();
    let (mut controller, _events) =
        list_controller(client, &store, ChannelListQuery::default());

    let completion = controller.start_updating();
    controller.stop();

    assert!(matches!(
        within(completion).await,
        Err(CoreError::Cancelled)
    ));
}

#[tokio::test]
async fn stopped_controller_refuses_refresh() {
    let store = LocalStore::in_memory();
    let (mut controller, _events) =
        list_controller(ScriptedClient::new(), &store, ChannelListQuery::default());

    assert!(matches!(
        within(controller.refresh()).await,
        Err(CoreError::ControllerStopped)
    ));
}

#[tokio::test]
async fn restart_behaves_like_first_start() {
    let client = ScriptedClient::new();
    let page = channel_list(&[("messaging:c1", &[])]);
    client.push_ok(page.clone());
    client.push_ok(page);
    let store = LocalStore::in_memory();
    let (mut controller, mut events) =
        list_controller(client.clone(), &store, ChannelListQuery::default());

    within(controller.start_updating()).await.unwrap();
    controller.stop();
    drain(&mut events);

    within(controller.start_updating()).await.unwrap();
    let events = drain(&mut events);

    assert!(matches!(
        &events[0],
        ChannelListEvent::Changed(changes) if changes.len() == 1
    ));
    assert_eq!(events[1], ChannelListEvent::WillStartFetching);
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn next_page_extends_the_list() {
    let client = ScriptedClient::new();
    client.push_ok(channel_list(&[("messaging:c1", &[])]));
    client.push_ok(channel_list(&[("messaging:c2", &[])]));
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::default().with_pagination(Pagination {
        limit: 1,
        offset: 0,
    });
    let (mut controller, mut events) = list_controller(client.clone(), &store, query.clone());

    within(controller.start_updating()).await.unwrap();
    drain(&mut events);
    within(controller.load_next_page()).await.unwrap();

    assert_eq!(
        store.query_membership(&query),
        QueryMembership::from([cid("messaging:c1"), cid("messaging:c2")])
    );
    let sent = client.requests();
    assert_eq!(sent[1].body.as_ref().unwrap()["offset"], 1);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        ChannelListEvent::Changed(changes)
            if matches!(&changes[..], [Change::Added { item, .. }] if item.cid == cid("messaging:c2"))
    )));
}

#[tokio::test]
async fn refresh_refetches_first_page_and_keeps_later_pages() {
    let client = ScriptedClient::new();
    client.push_ok(channel_list(&[("messaging:c1", &[])]));
    client.push_ok(channel_list(&[("messaging:c2", &[])]));
    client.push_ok(channel_list(&[("messaging:c3", &[])]));
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::default().with_pagination(Pagination {
        limit: 1,
        offset: 0,
    });
    let (mut controller, _events) = list_controller(client.clone(), &store, query.clone());

    within(controller.start_updating()).await.unwrap();
    within(controller.load_next_page()).await.unwrap();
    within(controller.refresh()).await.unwrap();

    assert_eq!(client.requests()[2].body.as_ref().unwrap()["offset"], 0);
    assert_eq!(
        store.query_membership(&query),
        QueryMembership::from([cid("messaging:c1"), cid("messaging:c2"), cid("messaging:c3")])
    );
}

#[tokio::test]
async fn identical_refresh_after_next_page_keeps_every_channel() {
    let client = ScriptedClient::new();
    client.push_ok(channel_list(&[("messaging:c1", &[])]));
    client.push_ok(channel_list(&[("messaging:c2", &[])]));
    client.push_ok(channel_list(&[("messaging:c1", &[])]));
    let store = LocalStore::in_memory();
    let query = ChannelListQuery::default().with_pagination(Pagination {
        limit: 1,
        offset: 0,
    });
    let (mut controller, mut events) = list_controller(client.clone(), &store, query.clone());

    within(controller.start_updating()).await.unwrap();
    within(controller.load_next_page()).await.unwrap();
    let both = QueryMembership::from([cid("messaging:c1"), cid("messaging:c2")]);
    assert_eq!(store.query_membership(&query), both);
    drain(&mut events);

    within(controller.refresh()).await.unwrap();

    assert_eq!(store.query_membership(&query), both);
    assert_eq!(controller.channels().len(), 2);
    assert_eq!(
        drain(&mut events),
        vec![
            ChannelListEvent::WillStartFetching,
            ChannelListEvent::DidStopFetching { error: None },
        ]
    );
}

// ── Channel controller ──────────────────────────────────────────────

#[tokio::test]
async fn channel_controller_publishes_cache_then_fetch() {
    let client = ScriptedClient::gated();
    client.push_ok(json!({
        "channel": { "cid": "messaging:c1", "name": "General" },
        "members": [{ "user": { "id": "u1" } }, { "user": { "id": "u2" } }],
    }));
    let store = LocalStore::in_memory();
    seed(&store, &ChannelListQuery::default()).await;
    let (mut controller, mut events) = ChannelController::new(
        cid("messaging:c1"),
        store.clone(),
        ChannelUpdater::new(client.clone(), store.clone()),
    );

    let completion = controller.start_updating();

    assert!(matches!(
        within(events.recv()).await.unwrap(),
        ChannelEvent::ChannelChanged(EntityChange::Created(_))
    ));
    match within(events.recv()).await.unwrap() {
        ChannelEvent::MembersChanged(changes) => assert_eq!(changes.len(), 1),
        other => panic!("expected cached members, got {other:?}"),
    }
    assert_eq!(
        within(events.recv()).await.unwrap(),
        ChannelEvent::MessagesChanged(Vec::new())
    );
    assert_eq!(
        within(events.recv()).await.unwrap(),
        ChannelEvent::WillStartFetching
    );

    client.release();
    within(completion).await.unwrap();
    let rest = drain(&mut events);

    assert!(rest.iter().any(|e| matches!(
        e,
        ChannelEvent::ChannelChanged(EntityChange::Updated(channel))
            if channel.name().as_deref() == Some("General")
    )));
    assert!(rest.iter().any(|e| matches!(
        e,
        ChannelEvent::MembersChanged(changes)
            if matches!(&changes[..], [Change::Added { item, .. }] if item.user_id == "u2")
    )));
    assert_eq!(
        rest.last(),
        Some(&ChannelEvent::DidStopFetching { error: None })
    );
    assert_eq!(controller.members().len(), 2);
}

#[tokio::test]
async fn channel_controller_reports_deletion() {
    let client = ScriptedClient::new();
    client.push_ok(json!({ "channel": { "cid": "messaging:c1" } }));
    let store = LocalStore::in_memory();
    let (mut controller, mut events) = ChannelController::new(
        cid("messaging:c1"),
        store.clone(),
        ChannelUpdater::new(client, store.clone()),
    );

    within(controller.start_updating()).await.unwrap();
    assert!(controller.channel().is_some());
    drain(&mut events);

    store
        .write(|state| Ok(state.delete_channel(&"messaging:c1".parse().unwrap())))
        .await
        .unwrap();

    let event = within(events.recv()).await.unwrap();
    assert!(matches!(
        event,
        ChannelEvent::ChannelChanged(EntityChange::Removed(_))
    ));
    eventually(|| controller.channel().is_none()).await;
}

#[tokio::test]
async fn channel_controller_reports_new_messages() {
    let client = ScriptedClient::new();
    client.push_ok(json!({ "channel": { "cid": "messaging:c1" } }));
    let store = LocalStore::in_memory();
    let (mut controller, mut events) = ChannelController::new(
        cid("messaging:c1"),
        store.clone(),
        ChannelUpdater::new(client, store.clone()),
    );

    within(controller.start_updating()).await.unwrap();
    drain(&mut events);

    let message: MessagePayload = serde_json::from_value(json!({
        "id": "m1", "text": "hi", "user": { "id": "u2" },
        "created_at": "2024-05-01T10:00:00Z"
    }))
    .unwrap();
    store
        .write(move |state| {
            state.upsert_message(&"messaging:c1".parse().unwrap(), &message);
            Ok(())
        })
        .await
        .unwrap();

    match within(events.recv()).await.unwrap() {
        ChannelEvent::MessagesChanged(changes) => assert!(matches!(
            &changes[..],
            [Change::Added { index: 0, item }] if item.id == "m1" && item.text == "hi"
        )),
        other => panic!("expected a message change, got {other:?}"),
    }
    assert_eq!(controller.messages().len(), 1);
}
