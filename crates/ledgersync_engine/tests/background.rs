//! Tests for the timer and reconnect driver.

use ledgersync_engine::{ManualProbe, MemoryRemoteStore, RemoteProbe, SyncConfig, SyncEngine};
use ledgersync_protocol::{EntityKind, Operation};
use ledgersync_storage::InMemoryCache;
use ledgersync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn config() -> SyncConfig {
    SyncConfig::new()
        .with_sync_interval(Duration::from_secs(30))
        .with_probe_interval(Duration::from_secs(5))
        .with_completion_grace(Duration::ZERO)
        .with_sync_on_enqueue(false)
}

#[tokio::test(start_paused = true)]
async fn timer_drains_queue() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let probe = Arc::new(ManualProbe::new(true));
    let engine = SyncEngine::open(
        config().with_probe_interval(Duration::from_secs(3600)),
        InMemoryCache::new(),
        Arc::clone(&remote),
        Arc::clone(&probe),
    )
    .unwrap();

    let background = engine.spawn_background();
    tokio::time::sleep(Duration::from_secs(1)).await;

    engine.enqueue(Operation::create(client("c1", "Ana", 40)));
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!remote.contains(EntityKind::Client, "c1"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(remote.contains(EntityKind::Client, "c1"));

    background.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_triggers_immediate_pass() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let probe = Arc::new(ManualProbe::new(false));
    let engine = SyncEngine::open(
        config(),
        InMemoryCache::new(),
        Arc::clone(&remote),
        Arc::clone(&probe),
    )
    .unwrap();

    let background = engine.spawn_background();
    engine.enqueue(Operation::create(client("c1", "Ana", 40)));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!engine.current_status().is_online);

    probe.set_online(true);
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(remote.contains(EntityKind::Client, "c1"));
    assert!(engine.current_status().is_online);

    background.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remote_probe_drives_reconnect() {
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.set_reachable(false);
    let probe = RemoteProbe::new(Arc::clone(&remote));
    let engine = SyncEngine::open(config(), InMemoryCache::new(), Arc::clone(&remote), probe)
        .unwrap();

    let background = engine.spawn_background();
    engine.enqueue(Operation::create(client("c1", "Ana", 40)));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.current_status().pending_count, 1);

    remote.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(remote.contains(EntityKind::Client, "c1"));

    background.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_driver() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::open(
        config(),
        InMemoryCache::new(),
        Arc::clone(&remote),
        ManualProbe::new(true),
    )
    .unwrap();

    let background = engine.spawn_background();
    tokio::time::sleep(Duration::from_secs(1)).await;
    background.shutdown().await;

    engine.enqueue(Operation::create(client("c1", "Ana", 40)));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(!remote.contains(EntityKind::Client, "c1"));
    assert_eq!(engine.current_status().pending_count, 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_driver() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::open(
        config(),
        InMemoryCache::new(),
        Arc::clone(&remote),
        ManualProbe::new(true),
    )
    .unwrap();

    drop(engine.spawn_background());
    tokio::time::sleep(Duration::from_secs(1)).await;

    engine.enqueue(Operation::create(client("c1", "Ana", 40)));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(!remote.contains(EntityKind::Client, "c1"));
}
