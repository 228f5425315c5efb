//! Multi-device scenarios over one shared remote.

use serde_json::json;

use habit_sync::remote::MemoryDocumentService;
use habit_sync::storage::keys::{SYNC_ENABLED_KEY, SYNC_ID_KEY};
use habit_sync::storage::LocalStore;
use habit_sync::sync::*;
use habit_sync::types::parse_remote_data;

use super::support::*;

#[tokio::test(start_paused = true)]
async fn second_device_joins_and_adopts_first_devices_state() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    a.tracker.toggle("h1", day(1)).unwrap();
    a.tracker.add_habit("Piano", "#ff00ff").unwrap();

    let outcome = a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Initialized);
    let pushed = remote.document(SYNC_ID).unwrap();
    assert_eq!(pushed["updatedBy"], json!("A"));

    let b = device("B", &remote);
    let outcome = b.engine.connect(SYNC_ID, ConnectOptions::silent()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::AdoptedRemote);
    assert_eq!(b.tracker.snapshot(), parse_remote_data(&pushed).unwrap());
    assert_eq!(b.tracker.snapshot(), a.tracker.snapshot());
}

#[tokio::test(start_paused = true)]
async fn edits_flow_both_ways() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    let b = device("B", &remote);
    a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    b.engine.connect(SYNC_ID, ConnectOptions::silent()).await.unwrap();

    a.tracker.toggle("h2", day(3)).unwrap();
    settle().await;
    assert!(b.tracker.is_completed("h2", day(3)));

    b.tracker.toggle("h2", day(3)).unwrap();
    b.tracker.toggle("h5", day(4)).unwrap();
    settle().await;
    assert!(!a.tracker.is_completed("h2", day(3)));
    assert!(a.tracker.is_completed("h5", day(4)));

    assert_eq!(a.tracker.snapshot(), b.tracker.snapshot());
    assert_eq!(a.engine.phase(), SyncPhase::Idle);
    assert_eq!(b.engine.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn restart_reconnects_to_latest_remote_state() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    let b = device("B", &remote);
    a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    b.engine.connect(SYNC_ID, ConnectOptions::silent()).await.unwrap();

    let store = a.store.clone();
    a.engine.shutdown().await;
    drop(a);

    b.tracker.toggle("h7", day(20)).unwrap();
    settle().await;

    let restarted = device_on_store(store, &remote, |_| {});
    assert_eq!(restarted.engine.client_id(), "A");
    assert!(!restarted.tracker.is_completed("h7", day(20)));

    let result = restarted.engine.init().await;
    assert_eq!(result, AutoConnect::Connected(ConnectOutcome::AdoptedRemote));
    assert!(restarted.tracker.is_completed("h7", day(20)));
    assert_eq!(restarted.tracker.snapshot(), b.tracker.snapshot());
}

#[tokio::test(start_paused = true)]
async fn concurrent_edits_resolve_to_last_writer() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    let b = device("B", &remote);
    a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    b.engine.connect(SYNC_ID, ConnectOptions::silent()).await.unwrap();

    // Both edit inside one debounce window; B's timer fires last.
    a.tracker.toggle("h1", day(1)).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    b.tracker.toggle("h3", day(1)).unwrap();
    settle().await;

    // A's push lands first and B applies it wholesale, dropping B's pending
    // toggle; B's timer then pushes that applied state.
    assert!(a.tracker.is_completed("h1", day(1)));
    assert!(!a.tracker.is_completed("h3", day(1)));
    assert!(!b.tracker.is_completed("h3", day(1)));
    assert_eq!(remote.document(SYNC_ID).unwrap()["updatedBy"], json!("B"));
    assert_eq!(a.tracker.snapshot(), b.tracker.snapshot());
}

#[tokio::test(start_paused = true)]
async fn joining_with_local_state_can_keep_it() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();

    let b = device_with("B", &remote, |options| {
        options.on_merge_prompt = Some(std::sync::Arc::new(|_doc: &serde_json::Value| {
            MergeChoice::OverwriteRemote
        }));
    });
    b.tracker.delete_habit("h1").unwrap();
    let outcome = b.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::OverwroteRemote);

    // A is subscribed and takes B's overwrite.
    assert!(a.tracker.habit("h1").is_none());
    assert_eq!(a.tracker.snapshot(), b.tracker.snapshot());
}

#[tokio::test(start_paused = true)]
async fn local_reset_disconnects_without_touching_peers() {
    let remote = MemoryDocumentService::new();
    let a = device("A", &remote);
    a.tracker.toggle("h1", day(1)).unwrap();
    a.tracker.toggle("h1", day(2)).unwrap();
    a.engine.connect(SYNC_ID, ConnectOptions::interactive()).await.unwrap();
    let b = device("B", &remote);
    b.engine.connect(SYNC_ID, ConnectOptions::silent()).await.unwrap();
    let writes = remote.merge_writes();

    // A pending edit is dropped along with the session.
    a.tracker.toggle("h2", day(3)).unwrap();
    a.tracker.reset().unwrap();
    settle().await;

    assert!(!a.engine.is_enabled());
    assert_eq!(a.engine.status(), SyncStatus::Off);
    assert_eq!(remote.subscriber_count(SYNC_ID), 1);
    assert_eq!(remote.merge_writes(), writes);
    assert!(a.tracker.app_data().is_empty());

    assert!(b.tracker.is_completed("h1", day(1)));
    assert!(b.tracker.is_completed("h1", day(2)));
    assert!(!b.tracker.is_completed("h2", day(3)));

    assert_eq!(a.store.get(SYNC_ENABLED_KEY).unwrap(), None);
    assert_eq!(a.store.get(SYNC_ID_KEY).unwrap().as_deref(), Some(SYNC_ID));
    assert_eq!(a.engine.last_sync_id().as_deref(), Some(SYNC_ID));

    // Later edits on A stay local.
    a.tracker.toggle("h5", day(4)).unwrap();
    settle().await;
    assert_eq!(remote.merge_writes(), writes);
    assert!(!b.tracker.is_completed("h5", day(4)));
}
