//! # Wool Sync Server
//!
//! Authoritative save sync for Llama Wool Farm.
//!
//! Reads JSON requests on stdin and answers on stdout. Each request runs
//! the save core between a store read and a store write, serialized per
//! player:
//!
//! - incoming client saves are validated and repaired
//! - stored saves are validated and repaired on every read
//! - conflicts are reconciled per policy
//!
//! Transport beyond stdio (HTTP, auth) is a gateway concern.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod store;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use service::{OfflineProgress, SyncOutcome, SyncService};
pub use store::{FileStore, MemoryStore, SaveStore, StoredSave};
