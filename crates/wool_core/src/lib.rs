//! # Wool Core
//!
//! Save core for Llama Wool Farm.
//!
//! This crate contains **only** game-state logic:
//! - No rendering
//! - No IO (callers pass `now` and read files themselves)
//! - No floating-point amounts (uses arbitrary-precision decimals)
//!
//! This separation enables:
//! - An authoritative sync server that shares math with clients
//! - Offline tooling that validates and repairs save files
//! - Deterministic tests with fixed clocks
//!
//! ## Crate Structure
//!
//! - [`catalog`] - Tier, building, upgrade and achievement definitions
//! - [`production`] - Rates, multipliers and offline earnings
//! - [`economy`] - Costs, purchases, unlocks and prestige
//! - [`save`] - The persisted save model
//! - [`checksum`] - Canonical save digests
//! - [`reconcile`] - Client/server sync and merge
//! - [`integrity`] - Corruption detection and repair

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod catalog;
pub mod checksum;
pub mod decimal;
pub mod economy;
pub mod error;
pub mod ids;
pub mod integrity;
pub mod production;
pub mod reconcile;
pub mod save;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{BuildingDef, Catalog, TierDef, UpgradeDef};
    pub use crate::decimal::{Amount, Fraction};
    pub use crate::error::{Result, WoolError};
    pub use crate::ids::{BuildingMap, BuildingType, ResourceTier, TierMap};
    pub use crate::integrity::{
        CorruptionIssue, CorruptionKind, CorruptionReport, IntegrityConfig, IntegrityEngine,
        LoadedSave, RecoveryOutcome, RecoveryPlan, Severity,
    };
    pub use crate::production::{
        ProductionConfig, ProductionEngine, ProductionEvent, ProductionSnapshot, TemporaryBoost,
    };
    pub use crate::reconcile::{
        reconcile, ConflictPolicy, Reconciliation, Resolution, SaveRecord, SyncRequest,
        SyncResponse,
    };
    pub use crate::save::{BuildingState, GameSave};
}
