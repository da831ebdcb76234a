// src/store/db.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;

use super::{validate_scope, Layer, ProductStore};
use crate::utils::db_connect::{get_pool_status, PgPool};

const SCHEMA: &str = "product_catalog";
const BATCH_SIZE_DB_OPS: usize = 500;

/// Keeps every layer in `product_catalog.<layer>_rows`, one JSONB row per
/// dataset row.
pub struct PgStore {
    pool: PgPool,
}

fn table_name(layer: Layer) -> String {
    format!("{}.{}_rows", SCHEMA, layer.as_str())
}

/// Multi-row INSERT with three parameters per row.
fn insert_statement(table: &str, row_count: usize) -> String {
    let values: Vec<String> = (0..row_count)
        .map(|r| {
            let i = r * 3 + 1;
            format!("(${}, ${}, ${})", i, i + 1, i + 2)
        })
        .collect();
    format!(
        "INSERT INTO {} (scope, row_index, data) VALUES {}",
        table,
        values.join(", ")
    )
}

impl PgStore {
    pub async fn new(pool: PgPool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for schema setup")?;

        client
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA), &[])
            .await
            .context("Failed to create product_catalog schema")?;

        for layer in Layer::ALL {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    scope TEXT NOT NULL,
                    row_index INTEGER NOT NULL,
                    data JSONB NOT NULL,
                    PRIMARY KEY (scope, row_index)
                )",
                table_name(layer)
            );
            client
                .execute(&ddl, &[])
                .await
                .with_context(|| format!("Failed to create table for layer {}", layer))?;
        }
        debug!("product_catalog schema is in place");
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn read(&self, layer: Layer, scope: &str) -> Result<Vec<JsonValue>> {
        validate_scope(scope)?;
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for read")?;

        let query = format!(
            "SELECT data FROM {} WHERE scope = $1 ORDER BY row_index",
            table_name(layer)
        );
        let rows = client
            .query(&query, &[&scope])
            .await
            .with_context(|| format!("Failed to read {} rows for '{}'", layer, scope))?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, JsonValue>(0)
                    .context("Failed to decode JSONB row")
            })
            .collect()
    }

    async fn write(&self, layer: Layer, scope: &str, rows: &[JsonValue]) -> Result<()> {
        validate_scope(scope)?;
        let table = table_name(layer);
        let mut client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for write")?;

        let transaction = client
            .transaction()
            .await
            .context("Failed to start transaction for dataset write")?;

        let deleted = transaction
            .execute(&format!("DELETE FROM {} WHERE scope = $1", table), &[&scope])
            .await
            .with_context(|| format!("Failed to clear {} rows for '{}'", layer, scope))?;
        debug!("Cleared {} previous {} rows for '{}'", deleted, layer, scope);

        for (chunk_idx, chunk) in rows.chunks(BATCH_SIZE_DB_OPS).enumerate() {
            let offset = chunk_idx * BATCH_SIZE_DB_OPS;
            let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(chunk.len() * 3);
            for (i, row) in chunk.iter().enumerate() {
                let row_index = i32::try_from(offset + i)
                    .context("Dataset has more rows than an INTEGER row_index can hold")?;
                params.push(Box::new(scope.to_string()));
                params.push(Box::new(row_index));
                params.push(Box::new(row.clone()));
            }

            let params_slice: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|b| b.as_ref() as &(dyn ToSql + Sync))
                .collect();

            transaction
                .execute(&insert_statement(&table, chunk.len()), &params_slice[..])
                .await
                .with_context(|| {
                    format!(
                        "Failed to insert {} rows batch {} for '{}'",
                        layer, chunk_idx, scope
                    )
                })?;
        }

        transaction
            .commit()
            .await
            .with_context(|| format!("Failed to commit {} rows for '{}'", layer, scope))?;

        drop(client);
        let (total, idle, in_use) = get_pool_status(&self.pool);
        info!(
            "Wrote {} {} rows for '{}' (DB pool: {} total, {} idle, {} in use)",
            rows.len(),
            layer,
            scope,
            total,
            idle,
            in_use
        );
        Ok(())
    }
}
