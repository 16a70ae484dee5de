//! The sync service: per-player serialized read-reconcile-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{Mutex as PlayerLock, OwnedMutexGuard};
use wool_core::catalog::Catalog;
use wool_core::checksum;
use wool_core::decimal::Amount;
use wool_core::economy::{apply_production, prestige_multiplier};
use wool_core::ids::TierMap;
use wool_core::integrity::{CorruptionReport, IntegrityEngine, Severity};
use wool_core::production::{ProductionConfig, ProductionEngine};
use wool_core::reconcile::{
    reconcile, ConflictPolicy, Reconciliation, SaveRecord, SyncRequest, SyncResponse,
};
use wool_core::save::GameSave;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::store::{SaveStore, StoredSave};

/// Result of one sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Wire response for the client.
    pub response: SyncResponse,
    /// Findings on the incoming client save.
    pub report: CorruptionReport,
    /// Whether high or critical problems in the client save were repaired.
    pub remediated: bool,
}

/// Offline earnings since the last save.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineProgress {
    /// Time away (ms), before the cap.
    pub elapsed_ms: u64,
    /// Earnings per tier, after the cap and efficiency.
    pub earned: TierMap<Amount>,
    /// The updated save, when the earnings were claimed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<GameSave>,
}

type LockTable = Mutex<HashMap<String, Arc<PlayerLock<()>>>>;

/// Holds one player's lock. The table entry is dropped with the last holder.
struct PlayerGuard<'a> {
    player_id: String,
    locks: &'a LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PlayerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(&self.player_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.player_id);
        }
    }
}

/// Serializes every operation on a player's save and runs the save core
/// between store reads and writes.
///
/// Different players proceed in parallel.
pub struct SyncService<S> {
    store: S,
    catalog: Arc<Catalog>,
    integrity: IntegrityEngine,
    production: ProductionConfig,
    default_policy: Option<ConflictPolicy>,
    locks: LockTable,
}

impl<S: SaveStore> SyncService<S> {
    /// Create a service over `store`.
    pub fn new(store: S, catalog: Arc<Catalog>, config: &ServerConfig) -> Self {
        Self {
            store,
            integrity: IntegrityEngine::new(catalog.clone(), config.integrity.clone()),
            catalog,
            production: config.production.clone(),
            default_policy: config.default_policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile an incoming client save with the stored copy.
    ///
    /// The client save is validated and repaired first. A conflict without
    /// a policy (in the request or the config) writes nothing and returns
    /// both copies.
    pub async fn sync(&self, request: SyncRequest, now: i64) -> Result<SyncOutcome> {
        let player_id = request.game_state.player_id.clone();
        if player_id.is_empty() {
            return Err(ServerError::InvalidRequest("gameState.playerId is empty".into()));
        }

        let _guard = self.lock_player(&player_id).await?;

        let stored = self.read_record(&player_id, now)?;
        let (client, report) = self.integrity.repair_save(&request.game_state, now)?;
        let remediated = report.issues.iter().any(|issue| issue.severity >= Severity::High);
        if !report.is_clean() {
            tracing::warn!(
                player = %player_id,
                issues = report.issues.len(),
                remediated,
                "Repaired incoming save"
            );
        }

        let policy = request.conflict_resolution.or(self.default_policy);
        let reconciliation = reconcile(stored.as_ref(), client, request.last_sync_time, policy, now);
        if let Reconciliation::Write { record, .. } = &reconciliation {
            self.store.store(&player_id, &StoredSave::from_record(record)?)?;
        }

        tracing::info!(
            player = %player_id,
            conflict = reconciliation.conflict(),
            resolution = %reconciliation.resolution(),
            "Sync"
        );

        Ok(SyncOutcome {
            response: reconciliation.into_response(now),
            report,
            remediated,
        })
    }

    /// The stored save for `player_id`, repaired if needed.
    pub async fn load(&self, player_id: &str, now: i64) -> Result<Option<SaveRecord>> {
        let _guard = self.lock_player(player_id).await?;
        self.read_record(player_id, now)
    }

    /// Offline earnings since the stored save's last save time.
    ///
    /// With `claim`, the earnings are credited, the save times move to
    /// `now` and the result is stored.
    pub async fn offline_progress(
        &self,
        player_id: &str,
        now: i64,
        claim: bool,
    ) -> Result<OfflineProgress> {
        let _guard = self.lock_player(player_id).await?;

        let Some(mut record) = self.read_record(player_id, now)? else {
            return Err(ServerError::UnknownPlayer(player_id.to_string()));
        };
        let save = &mut record.save;

        let mut engine = ProductionEngine::new(self.catalog.clone(), self.production.clone());
        engine.set_achievements(&save.unlocked_achievements);
        engine.calculate_production(
            &save.buildings,
            &save.purchased_upgrades,
            &prestige_multiplier(save.total_prestiges),
        );
        let earned = engine.offline_since(save.last_save_time, now);
        let elapsed_ms = u64::try_from(now.saturating_sub(save.last_save_time)).unwrap_or(0);

        if !claim {
            return Ok(OfflineProgress {
                elapsed_ms,
                earned,
                save: None,
            });
        }

        apply_production(save, &earned);
        save.last_save_time = now;
        save.timestamp = save.timestamp.max(now);
        save.revision = save.revision.saturating_add(1);
        checksum::seal(save);
        record.updated_at = now;
        self.store.store(player_id, &StoredSave::from_record(&record)?)?;
        tracing::info!(player = %player_id, elapsed_ms, "Offline earnings claimed");

        Ok(OfflineProgress {
            elapsed_ms,
            earned,
            save: Some(record.save),
        })
    }

    async fn lock_player(&self, player_id: &str) -> Result<PlayerGuard<'_>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| ServerError::Store("player lock table poisoned".into()))?;
            locks.entry(player_id.to_string()).or_default().clone()
        };
        Ok(PlayerGuard {
            player_id: player_id.to_string(),
            locks: &self.locks,
            guard: Some(lock.lock_owned().await),
        })
    }

    /// Read and validate the stored save. Callers hold the player lock.
    fn read_record(&self, player_id: &str, now: i64) -> Result<Option<SaveRecord>> {
        let Some(stored) = self.store.load(player_id)? else {
            return Ok(None);
        };

        let (report, outcome) = self.integrity.validate_and_repair(&stored.document, now);
        if report.is_clean() {
            let save = GameSave::from_document(stored.document)?;
            return Ok(Some(SaveRecord {
                save,
                updated_at: stored.updated_at,
            }));
        }

        let mut save = match GameSave::from_document(outcome.document) {
            Ok(save) => save,
            Err(e) => {
                tracing::warn!(player = %player_id, error = %e, "Stored save unusable, starting fresh");
                GameSave::new(player_id, now)
            }
        };
        if save.player_id.is_empty() {
            save.player_id = player_id.to_string();
        }

        if outcome.remediated {
            tracing::warn!(
                player = %player_id,
                issues = report.issues.len(),
                severity = ?report.severity(),
                "Repaired stored save"
            );
        } else {
            tracing::debug!(player = %player_id, issues = report.issues.len(), "Repaired stored save");
        }

        let record = SaveRecord {
            save,
            updated_at: stored.updated_at,
        };
        self.store.store(player_id, &StoredSave::from_record(&record)?)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn service() -> SyncService<MemoryStore> {
        SyncService::new(
            MemoryStore::new(),
            Arc::new(Catalog::llama_farm()),
            &ServerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_player_id_rejected() {
        let request = SyncRequest {
            game_state: GameSave::new("", NOW),
            last_sync_time: None,
            conflict_resolution: None,
        };
        let err = service().sync(request, NOW).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_damaged_stored_save_is_repaired_on_load() {
        let service = service();
        let mut document = GameSave::new("llama-1", NOW - 1_000).to_document().unwrap();
        document["resources"]["basic"] = json!("-5");
        document["resources"]["mythril"] = json!("3");
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
        assert!(record.save.resources[wool_core::ids::ResourceTier::Basic].is_zero());
        assert_eq!(record.updated_at, NOW - 1_000);

        let stored = service.store().load("llama-1").unwrap().unwrap();
        assert!(stored.document["resources"].get("mythril").is_none());
    }

    #[tokio::test]
    async fn test_lock_table_is_emptied_after_use() {
        let service = Arc::new(service());
        let mut tasks = Vec::new();
        for n in 0..8 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                let player = format!("llama-{}", n % 3);
                service
                    .sync(
                        SyncRequest {
                            game_state: GameSave::new(player, NOW),
                            last_sync_time: None,
                            conflict_resolution: Some(ConflictPolicy::Client),
                        },
                        NOW,
                    )
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(service.load("nobody", NOW).await.unwrap().is_none());

        assert!(service.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_progress_requires_a_save() {
        let err = service().offline_progress("nobody", NOW, false).await.unwrap_err();
        assert!(matches!(err, ServerError::UnknownPlayer(_)));
    }
}
