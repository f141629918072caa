/// Saving, restoring and trimming the cache
mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use twister_client::{
    jobs::TrimScheduler, kinds::PostTimeline, ClientSnapshot, QuerySettings, VerificationMode,
    NEVER_UPDATED,
};

fn seeded(h: &Harness) {
    h.transport.dht(dht_map([
        (
            "profile",
            signed_result(&signer(1), "alice", json!({"fullname": "Alice"}), 2),
        ),
        (
            "status",
            signed_result(&signer(2), "bob", user_post("bob", 6, "six"), 6),
        ),
    ]));
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    let h = harness(VerificationMode::None);
    seeded(&h);
    h.ctx
        .user("alice")
        .await
        .profile()
        .satisfy(&h.ctx, QuerySettings::new())
        .await
        .unwrap();
    h.ctx
        .account("alice")
        .await
        .torrent("bob")
        .await
        .satisfy(&h.ctx, QuerySettings::new())
        .await
        .unwrap();
    h.ctx.save_to(&path).await.unwrap();

    let restored = harness(VerificationMode::None);
    restored.ctx.load_from(&path).await.unwrap();
    assert_eq!(restored.ctx.flatten().await, h.ctx.flatten().await);

    let profile = restored
        .ctx
        .user("alice")
        .await
        .profile()
        .satisfy(&restored.ctx, QuerySettings::new())
        .await
        .unwrap();
    assert_eq!(profile.data["fullname"], "Alice");
    let timeline = restored
        .ctx
        .account("alice")
        .await
        .torrent("bob")
        .await
        .satisfy(&restored.ctx, QuerySettings::new())
        .await
        .unwrap();
    assert_eq!(PostTimeline::new(&timeline).latest_id(), Some(6));
    assert_eq!(restored.transport.count("dhtget"), 0);
}

#[tokio::test]
async fn test_saved_file_uses_wire_field_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    let h = harness(VerificationMode::None);
    h.ctx.account("alice").await;
    h.ctx.save_to(&path).await.unwrap();

    let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let account = &saved["accounts"][0];
    assert_eq!(account["name"], "alice");
    assert_eq!(account["wallettype"], "server");
    assert!(account["directmessages"].is_array());
    assert_eq!(account["lastUpdate"], json!(NEVER_UPDATED));
}

#[tokio::test]
async fn test_unverified_restore_is_refetched() {
    let h = harness(VerificationMode::None);
    seeded(&h);
    h.ctx
        .user("alice")
        .await
        .profile()
        .satisfy(&h.ctx, QuerySettings::new())
        .await
        .unwrap();

    let mut snapshot: ClientSnapshot = h.ctx.flatten().await;
    snapshot.users[0].profile.verified = false;
    assert_eq!(snapshot.users[0].profile.last_update, BASE_TIME);

    let restored = harness(VerificationMode::None);
    seeded(&restored);
    restored.ctx.inflate(snapshot).await;

    let profile = restored.ctx.user("alice").await.profile();
    assert_eq!(profile.last_update().await, NEVER_UPDATED);
    assert_eq!(profile.state().await.data["fullname"], "Alice");

    profile
        .satisfy(&restored.ctx, QuerySettings::new())
        .await
        .unwrap();
    assert_eq!(restored.transport.count("dhtget"), 1);
}

#[tokio::test]
async fn test_load_of_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let h = harness(VerificationMode::None);

    assert!(h.ctx.load_from(dir.path().join("absent.json")).await.is_err());
    assert!(h.ctx.known_users().await.is_empty());
}

#[tokio::test]
async fn test_trim_drops_only_stale_entries() {
    let h = harness(VerificationMode::None);
    h.transport.dht(dht_map([(
        "profile",
        signed_result(&signer(1), "alice", json!({"fullname": "Someone"}), 1),
    )]));

    let alice = h.ctx.user("alice").await.profile();
    alice.satisfy(&h.ctx, QuerySettings::new()).await.unwrap();
    h.clock.advance(100.0);
    let bob = h.ctx.user("bob").await.profile();
    bob.satisfy(&h.ctx, QuerySettings::new()).await.unwrap();

    h.ctx.trim(Some(BASE_TIME + 50.0)).await;

    assert_eq!(alice.last_update().await, NEVER_UPDATED);
    assert!(alice.state().await.data.is_null());
    assert_eq!(bob.last_update().await, BASE_TIME + 100.0);
    assert_eq!(bob.state().await.revision_number, Some(1));
}

#[tokio::test]
async fn test_trim_everything() {
    let h = harness(VerificationMode::None);
    seeded(&h);
    let profile = h.ctx.user("alice").await.profile();
    profile.satisfy(&h.ctx, QuerySettings::new()).await.unwrap();
    let timeline = h.ctx.account("alice").await.torrent("bob").await;
    timeline.satisfy(&h.ctx, QuerySettings::new()).await.unwrap();

    assert!(h.ctx.trim(None).await > 0);

    assert_eq!(profile.last_update().await, NEVER_UPDATED);
    assert!(timeline.state().await.latest_id.is_none());
    assert!(h.ctx.known_users().await.contains(&"alice".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_trim_scheduler_drops_stale_entries() {
    let h = harness(VerificationMode::None);
    seeded(&h);
    let profile = h.ctx.user("alice").await.profile();
    profile.satisfy(&h.ctx, QuerySettings::new()).await.unwrap();

    let scheduler = Arc::new(TrimScheduler::with_schedule(
        h.ctx.clone(),
        Duration::from_secs(60),
        30,
    ));
    let handle = scheduler.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(profile.last_update().await, BASE_TIME);

    h.clock.advance(40.0);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(profile.last_update().await, NEVER_UPDATED);

    handle.abort();
}
