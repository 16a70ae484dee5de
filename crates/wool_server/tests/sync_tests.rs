//! Integration tests for the sync service.

use std::sync::Arc;

use wool_core::checksum;
use wool_core::ids::{BuildingType, ResourceTier};
use wool_core::reconcile::{ConflictPolicy, Resolution, SyncRequest};
use wool_core::save::{BuildingState, GameSave};
use wool_server::{FileStore, MemoryStore, SaveStore, ServerConfig, StoredSave, SyncService};
use wool_test_utils::fixtures::{amount, catalog, corrupted_save_document, sample_save, HOUR_MS, NOW};

fn service_with(config: &ServerConfig) -> SyncService<MemoryStore> {
    SyncService::new(MemoryStore::new(), catalog(), config)
}

fn request(save: GameSave, last_sync_time: Option<i64>, policy: Option<ConflictPolicy>) -> SyncRequest {
    SyncRequest {
        game_state: save,
        last_sync_time,
        conflict_resolution: policy,
    }
}

#[tokio::test]
async fn test_first_write_then_overwrite() {
    let service = service_with(&ServerConfig::default());

    let first = service
        .sync(request(sample_save("llama-1"), None, None), NOW - 10_000)
        .await
        .unwrap();
    assert_eq!(first.response.resolution, Some(Resolution::FirstWrite));
    assert!(first.report.is_clean(), "{:#?}", first.report.issues);
    let revision = first.response.game_state.revision;

    let mut next = first.response.game_state.clone();
    next.resources[ResourceTier::Basic] = amount("2000");
    checksum::seal(&mut next);
    let second = service
        .sync(request(next, Some(NOW - 10_000), None), NOW)
        .await
        .unwrap();
    assert!(!second.response.conflict);
    assert_eq!(second.response.resolution, Some(Resolution::Overwrite));
    assert_eq!(second.response.game_state.revision, revision + 1);

    let stored = service.load("llama-1", NOW).await.unwrap().unwrap();
    assert_eq!(stored.save.resources[ResourceTier::Basic], amount("2000"));
    assert_eq!(stored.updated_at, NOW);
}

#[tokio::test]
async fn test_conflict_without_policy_writes_nothing() {
    let service = service_with(&ServerConfig::default());
    service
        .sync(request(sample_save("llama-1"), None, None), NOW - 5_000)
        .await
        .unwrap();
    let before = service.store().load("llama-1").unwrap();

    let mut stale = sample_save("llama-1");
    stale.revision = 1;
    let outcome = service
        .sync(request(stale, Some(NOW - 60_000), None), NOW)
        .await
        .unwrap();

    assert!(outcome.response.conflict);
    assert_eq!(outcome.response.resolution, Some(Resolution::Manual));
    assert!(outcome.response.server_state.is_some());
    assert_eq!(service.store().load("llama-1").unwrap(), before);
}

#[tokio::test]
async fn test_config_policy_applies_when_request_has_none() {
    let config = ServerConfig {
        default_policy: Some(ConflictPolicy::Merge),
        ..ServerConfig::default()
    };
    let service = service_with(&config);

    let mut server_copy = sample_save("llama-1");
    server_copy.buildings[BuildingType::Barn] = BuildingState::at_level(30);
    checksum::seal(&mut server_copy);
    service
        .sync(request(server_copy, None, None), NOW - 5_000)
        .await
        .unwrap();

    let mut client_copy = sample_save("llama-1");
    client_copy.revision = 1;
    client_copy.resources[ResourceTier::Basic] = amount("9000");
    checksum::seal(&mut client_copy);
    let outcome = service
        .sync(request(client_copy, Some(NOW - 60_000), None), NOW)
        .await
        .unwrap();

    let merged = outcome.response.game_state;
    assert_eq!(outcome.response.resolution, Some(Resolution::Merge));
    assert_eq!(merged.buildings[BuildingType::Barn].level, 30);
    assert_eq!(merged.resources[ResourceTier::Basic], amount("9000"));
}

#[tokio::test]
async fn test_corrupted_client_save_is_repaired_before_storing() {
    let service = service_with(&ServerConfig::default());
    let mut document = corrupted_save_document();
    // The typed boundary rejects unknown keys; drop the orphan first.
    document["resources"].as_object_mut().unwrap().remove("mythril");
    let client = GameSave::from_document(document).unwrap();

    let outcome = service.sync(request(client, None, None), NOW).await.unwrap();
    assert!(outcome.remediated);
    let saved = outcome.response.game_state;
    assert_eq!(saved.buildings[BuildingType::Barn].level, 10_000);
    assert!(!saved.purchased_upgrades.contains("diamond_shears"));
    assert!(checksum::verify(&saved, saved.checksum.as_deref().unwrap()));
}

#[tokio::test]
async fn test_damaged_stored_save_is_repaired_on_read() {
    let service = service_with(&ServerConfig::default());
    service
        .store()
        .store(
            "llama-1",
            &StoredSave {
                document: corrupted_save_document(),
                updated_at: NOW - 1_000,
            },
        )
        .unwrap();

    let record = service.load("llama-1", NOW).await.unwrap().unwrap();
    assert!(record.save.resources[ResourceTier::Basic].is_zero());
    assert!(record.save.last_save_time <= record.save.timestamp);

    let healed = service.store().load("llama-1").unwrap().unwrap();
    assert!(healed.document["resources"].get("mythril").is_none());
    assert_eq!(healed.updated_at, NOW - 1_000);
}

#[tokio::test]
async fn test_stored_save_with_bad_revision_stays_usable() {
    let service = service_with(&ServerConfig::default());
    let mut document = sample_save("llama-1").to_document().unwrap();
    document["revision"] = serde_json::json!("seven");
    service
        .store()
        .store(
            "llama-1",
            &StoredSave {
                document,
                updated_at: NOW - 1_000,
            },
        )
        .unwrap();

    let record = service.load("llama-1", NOW).await.unwrap().unwrap();
    assert_eq!(record.save.revision, 0);
    assert_eq!(record.save.resources[ResourceTier::Basic], amount("1500"));

    let mut client = sample_save("llama-1");
    client.revision = 1;
    let outcome = service
        .sync(request(client, Some(NOW - 500), None), NOW)
        .await
        .unwrap();
    assert!(!outcome.response.conflict);
}

#[tokio::test]
async fn test_offline_progress_and_claim() {
    let service = service_with(&ServerConfig::default());
    let mut save = GameSave::new("llama-1", NOW - 30 * HOUR_MS as i64);
    save.buildings[BuildingType::Barn] = BuildingState::at_level(10);
    checksum::seal(&mut save);
    service
        .sync(request(save, None, None), NOW - 30 * HOUR_MS as i64)
        .await
        .unwrap();

    let preview = service.offline_progress("llama-1", NOW, false).await.unwrap();
    assert_eq!(preview.elapsed_ms, 30 * HOUR_MS);
    // (10 + 0.1) × 0.5 × 24 h
    assert_eq!(preview.earned[ResourceTier::Basic], amount("436320"));
    assert!(preview.save.is_none());

    let claimed = service.offline_progress("llama-1", NOW, true).await.unwrap();
    let save = claimed.save.unwrap();
    assert_eq!(save.resources[ResourceTier::Basic], amount("436320"));
    assert_eq!(save.last_save_time, NOW);
    assert!(checksum::verify(&save, save.checksum.as_deref().unwrap()));

    let again = service.offline_progress("llama-1", NOW, false).await.unwrap();
    assert!(again.earned[ResourceTier::Basic].is_zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_player_syncs_are_serialized() {
    let config = ServerConfig {
        default_policy: Some(ConflictPolicy::Merge),
        ..ServerConfig::default()
    };
    let service = Arc::new(service_with(&config));

    let tasks: Vec<_> = (1..=16)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let mut save = GameSave::new("llama-1", NOW - 1_000);
                save.resources[ResourceTier::Basic] = amount(&(i * 10).to_string());
                service.sync(request(save, None, None), NOW).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Every sync after the first merges onto the previous write.
    let record = service.load("llama-1", NOW).await.unwrap().unwrap();
    assert_eq!(record.save.revision, 16);
    assert_eq!(record.save.resources[ResourceTier::Basic], amount("160"));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::default();
    {
        let service = SyncService::new(FileStore::open(dir.path()).unwrap(), catalog(), &config);
        service
            .sync(request(sample_save("llama-1"), None, None), NOW)
            .await
            .unwrap();
    }

    let service = SyncService::new(FileStore::open(dir.path()).unwrap(), catalog(), &config);
    let record = service.load("llama-1", NOW).await.unwrap().unwrap();
    assert_eq!(record.save.resources[ResourceTier::Basic], amount("1500"));
    assert_eq!(record.updated_at, NOW);
}
