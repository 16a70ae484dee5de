//! Error types for the save core.

use thiserror::Error;

use crate::decimal::Amount;
use crate::ids::{BuildingType, ResourceTier};

/// Result type alias using [`WoolError`].
pub type Result<T> = std::result::Result<T, WoolError>;

/// Top-level error type for all save-core errors.
///
/// Malformed persisted saves never surface here: the integrity engine
/// repairs them instead. These errors cover catalog loading, player actions
/// that are not allowed, and strict (de)serialization of typed saves.
#[derive(Debug, Error)]
pub enum WoolError {
    /// Catalog file parsing error.
    #[error("Failed to parse catalog '{path}': {message}")]
    CatalogParse {
        /// Path (or label) of the catalog source.
        path: String,
        /// Error message.
        message: String,
    },

    /// Catalog does not define every tier and building exactly once.
    #[error("Incomplete catalog: {0}")]
    CatalogIncomplete(String),

    /// A string could not be parsed as a decimal amount.
    #[error("Invalid decimal amount: '{0}'")]
    InvalidAmount(String),

    /// Upgrade identifier not present in the catalog.
    #[error("Unknown upgrade: {0}")]
    UnknownUpgrade(String),

    /// Upgrade was already purchased.
    #[error("Upgrade already purchased: {0}")]
    AlreadyPurchased(String),

    /// Building unlock requirement not met.
    #[error("{building} is locked: {requirement}")]
    LockedBuilding {
        /// Building that was requested.
        building: BuildingType,
        /// Human-readable requirement that is not met.
        requirement: String,
    },

    /// Building already at the level ceiling.
    #[error("{building} is already at max level {level}")]
    MaxLevel {
        /// Building that was requested.
        building: BuildingType,
        /// Current level.
        level: u32,
    },

    /// Insufficient resources.
    #[error("Insufficient resources: need {required} {resource}, have {available}")]
    InsufficientResources {
        /// Resource tier.
        resource: ResourceTier,
        /// Amount required.
        required: Amount,
        /// Amount available.
        available: Amount,
    },

    /// Typed save (de)serialization failed.
    #[error("Save format error: {0}")]
    SaveFormat(#[from] serde_json::Error),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
