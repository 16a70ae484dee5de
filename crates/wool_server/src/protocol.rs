//! JSON lines protocol for the sync server.
//!
//! One JSON object per line in each direction:
//!
//! **Input (stdin):** requests from the game client or a gateway
//! **Output (stdout):** one response per request
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0.0"}
//! -> {"cmd":"sync","request":{"gameState":{...},"lastSyncTime":1700000000000,"conflictResolution":"merge"}}
//! <- {"type":"synced","response":{"gameState":{...},"conflict":true,"resolution":"merge","timestamp":...},...}
//! -> {"cmd":"offline","player_id":"llama-1","claim":true}
//! <- {"type":"offline","elapsedMs":3600000,"earned":{"basic":"1800",...},"save":{...}}
//! -> {"cmd":"quit"}
//! <- {"type":"bye"}
//! ```

use serde::{Deserialize, Serialize};
use wool_core::reconcile::{SaveRecord, SyncRequest};

use crate::service::{OfflineProgress, SyncOutcome};

/// Requests accepted by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Reconcile a client save with the stored copy.
    Sync {
        /// The sync payload.
        request: SyncRequest,
    },

    /// Fetch the stored save.
    Load {
        /// Owning player.
        player_id: String,
    },

    /// Compute (and optionally claim) offline earnings.
    Offline {
        /// Owning player.
        player_id: String,
        /// Credit the earnings and store the result.
        #[serde(default)]
        claim: bool,
    },

    /// Stop the server.
    Quit,
}

impl Command {
    /// Command name, for error responses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
            Self::Load { .. } => "load",
            Self::Offline { .. } => "offline",
            Self::Quit => "quit",
        }
    }
}

/// Responses sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Server is ready to accept requests.
    Ready {
        /// Save schema version.
        version: String,
    },

    /// Outcome of a sync.
    Synced(SyncOutcome),

    /// Stored save, if any.
    Save {
        /// The record, absent for unknown players.
        record: Option<SaveRecord>,
    },

    /// Offline earnings.
    Offline(OfflineProgress),

    /// Error processing a request.
    Error {
        /// What went wrong.
        message: String,
        /// Command that failed, if it could be parsed.
        cmd: Option<String>,
    },

    /// Goodbye message before shutdown.
    Bye,
}
