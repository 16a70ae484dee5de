//! Server configuration, loaded from RON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wool_core::catalog::Catalog;
use wool_core::integrity::IntegrityConfig;
use wool_core::production::ProductionConfig;
use wool_core::reconcile::ConflictPolicy;

use crate::error::{Result, ServerError};

/// Server configuration.
///
/// Every field has a default, so an empty `()` RON document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Policy applied to conflicting syncs that do not name one.
    /// `None` hands such conflicts back to the client.
    pub default_policy: Option<ConflictPolicy>,
    /// Catalog file; the built-in catalog when unset.
    pub catalog_path: Option<PathBuf>,
    /// Directory for file-backed saves; in-memory when unset.
    pub save_dir: Option<PathBuf>,
    /// Production tunables used for offline progress.
    pub production: ProductionConfig,
    /// Save validation limits.
    pub integrity: IntegrityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_policy: None,
            catalog_path: None,
            save_dir: None,
            production: ProductionConfig::default(),
            integrity: IntegrityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a configuration from RON text.
    pub fn from_ron(text: &str, label: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| ServerError::Config {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ServerError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text, &path.display().to_string())
    }

    /// Load the configured catalog and check it for content errors.
    ///
    /// Catalog findings are logged, not fatal: a cycle only locks the
    /// affected buildings.
    pub fn load_catalog(&self, now: i64) -> Result<Arc<Catalog>> {
        let catalog = match &self.catalog_path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| ServerError::Config {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Catalog::from_ron(&text, &path.display().to_string())?
            }
            None => Catalog::llama_farm(),
        };

        let report = catalog.validate(now);
        for issue in &report.issues {
            tracing::warn!(
                kind = %issue.kind,
                path = %issue.path,
                actual = %issue.actual,
                "Catalog problem"
            );
        }
        Ok(Arc::new(catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ServerConfig::from_ron("()", "inline").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = ServerConfig::from_ron(
            r#"(default_policy: Some(merge), production: (max_offline_hours: 8))"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.default_policy, Some(ConflictPolicy::Merge));
        assert_eq!(config.production.max_offline_hours, 8);
        assert_eq!(config.integrity, IntegrityConfig::default());
    }

    #[test]
    fn test_bad_document_names_source() {
        let err = ServerConfig::from_ron("(default_policy: 7)", "server.ron").unwrap_err();
        assert!(err.to_string().contains("server.ron"));
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = ServerConfig::default().load_catalog(0).unwrap();
        assert!(catalog.upgrade("golden_shears").is_some());
    }
}
