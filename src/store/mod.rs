// src/store/mod.rs
//! Layered product storage. A store holds datasets addressed by
//! `(layer, scope)`, where the scope names one retailer's dataset. Rows are
//! JSON objects; typed access goes through the helpers at the bottom.

pub mod db;
pub mod json_store;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use crate::models::{ConsolidatedProduct, NormalizedRow};
use crate::utils::db_connect;
use crate::utils::pipeline_config::{StoreBackend, StoreConfig};

pub use db::PgStore;
pub use json_store::JsonFileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Raw,
    Normalized,
    Consolidated,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Raw, Layer::Normalized, Layer::Consolidated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Normalized => "normalized",
            Layer::Consolidated => "consolidated",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All rows of `scope` in `layer`, in stored order.
    async fn read(&self, layer: Layer, scope: &str) -> Result<Vec<JsonValue>>;

    /// Replaces the rows of `scope` in `layer` with `rows`.
    async fn write(&self, layer: Layer, scope: &str, rows: &[JsonValue]) -> Result<()>;
}

/// Scopes end up in file names and SQL parameters; keep them to a plain
/// identifier alphabet.
pub fn validate_scope(scope: &str) -> Result<()> {
    if scope.is_empty() {
        bail!("store scope must not be empty");
    }
    if scope.starts_with('.')
        || !scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        bail!("invalid store scope '{}'", scope);
    }
    Ok(())
}

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn ProductStore>> {
    match config.backend {
        StoreBackend::Json => {
            info!("Using JSON file store at {}", config.data_dir.display());
            Ok(Arc::new(JsonFileStore::new(&config.data_dir)))
        }
        StoreBackend::Postgres => {
            let pool = db_connect::connect()
                .await
                .context("Failed to connect to the PostgreSQL store")?;
            Ok(Arc::new(PgStore::new(pool).await?))
        }
    }
}

pub async fn read_normalized_rows(store: &dyn ProductStore, scope: &str) -> Result<Vec<NormalizedRow>> {
    let rows = store
        .read(Layer::Normalized, scope)
        .await
        .with_context(|| format!("Failed to read normalized rows for '{}'", scope))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value::<NormalizedRow>(value)
                .with_context(|| format!("Malformed normalized row {} in '{}'", i, scope))
        })
        .collect()
}

pub async fn write_consolidated(
    store: &dyn ProductStore,
    scope: &str,
    products: &[ConsolidatedProduct],
) -> Result<()> {
    let rows = products
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to serialize consolidated products")?;

    store
        .write(Layer::Consolidated, scope, &rows)
        .await
        .with_context(|| format!("Failed to write consolidated catalog for '{}'", scope))
}
