//! # Wool Development Tools
//!
//! Command-line tools for development and support:
//! - Save validation and repair
//! - Catalog consistency checks
//! - Offline earnings estimates

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod offline;
pub mod validate;

pub use error::{Result, ToolError};
