//! Save persistence behind the [`SaveStore`] trait.
//!
//! Stores hand back raw JSON documents. Nothing read from a store is
//! trusted until the integrity engine has checked it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wool_core::reconcile::SaveRecord;

use crate::error::{Result, ServerError};

/// A save as persisted, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSave {
    /// The save document.
    pub document: Value,
    /// Last write time (ms since the Unix epoch).
    #[serde(default)]
    pub updated_at: i64,
}

impl StoredSave {
    /// Wrap a typed record for storage.
    pub fn from_record(record: &SaveRecord) -> Result<Self> {
        Ok(Self {
            document: record.save.to_document()?,
            updated_at: record.updated_at,
        })
    }
}

/// Persistent storage for one save per player.
pub trait SaveStore: Send + Sync {
    /// Fetch the stored save for `player_id`, if any.
    fn load(&self, player_id: &str) -> Result<Option<StoredSave>>;

    /// Replace the stored save for `player_id`.
    fn store(&self, player_id: &str, save: &StoredSave) -> Result<()>;
}

impl<T: SaveStore + ?Sized> SaveStore for Box<T> {
    fn load(&self, player_id: &str) -> Result<Option<StoredSave>> {
        (**self).load(player_id)
    }

    fn store(&self, player_id: &str, save: &StoredSave) -> Result<()> {
        (**self).store(player_id, save)
    }
}

/// In-process store, used by tests and when no save directory is set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: Mutex<HashMap<String, StoredSave>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored saves.
    pub fn len(&self) -> usize {
        self.saves.lock().map_or(0, |saves| saves.len())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SaveStore for MemoryStore {
    fn load(&self, player_id: &str) -> Result<Option<StoredSave>> {
        let saves = self
            .saves
            .lock()
            .map_err(|_| ServerError::Store("memory store lock poisoned".into()))?;
        Ok(saves.get(player_id).cloned())
    }

    fn store(&self, player_id: &str, save: &StoredSave) -> Result<()> {
        let mut saves = self
            .saves
            .lock()
            .map_err(|_| ServerError::Store("memory store lock poisoned".into()))?;
        saves.insert(player_id.to_string(), save.clone());
        Ok(())
    }
}

/// One JSON file per player under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, player_id: &str) -> Result<PathBuf> {
        let valid = !player_id.is_empty()
            && player_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ServerError::InvalidRequest(format!(
                "player id '{player_id}' is not usable as a file name"
            )));
        }
        Ok(self.dir.join(format!("{player_id}.json")))
    }
}

impl SaveStore for FileStore {
    fn load(&self, player_id: &str) -> Result<Option<StoredSave>> {
        let path = self.path_for(player_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;

        // A damaged file still yields a (possibly empty) document; the
        // integrity engine decides what is salvageable.
        let stored = match serde_json::from_str::<StoredSave>(&text) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Save file is damaged");
                StoredSave {
                    document: serde_json::from_str(&text).unwrap_or(Value::Null),
                    updated_at: 0,
                }
            }
        };
        Ok(Some(stored))
    }

    fn store(&self, player_id: &str, save: &StoredSave) -> Result<()> {
        let path = self.path_for(player_id)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(save)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}
