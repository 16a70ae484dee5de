//! # Wool Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Save fixtures with fixed clocks
//! - Corrupted save documents for integrity tests
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
