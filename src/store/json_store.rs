// src/store/json_store.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{validate_scope, Layer, ProductStore};

/// Stores each dataset as a JSON array at `<root>/<layer>/<scope>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn dataset_path(&self, layer: Layer, scope: &str) -> PathBuf {
        self.root.join(layer.as_str()).join(format!("{}.json", scope))
    }
}

#[async_trait]
impl ProductStore for JsonFileStore {
    async fn read(&self, layer: Layer, scope: &str) -> Result<Vec<JsonValue>> {
        validate_scope(scope)?;
        let path = self.dataset_path(layer, scope);
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rows: Vec<JsonValue> = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a JSON array of rows", path.display()))?;
        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }

    async fn write(&self, layer: Layer, scope: &str, rows: &[JsonValue]) -> Result<()> {
        validate_scope(scope)?;
        let path = self.dataset_path(layer, scope);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let bytes = serde_json::to_vec_pretty(rows).context("Failed to serialize rows")?;
        // Readers never see a half-written dataset.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", tmp_path.display()))?;

        info!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}
