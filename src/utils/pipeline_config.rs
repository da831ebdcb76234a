// src/utils/pipeline_config.rs

use anyhow::{anyhow, Result};
use log::{info, warn};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::clustering::DbscanParams;
use crate::embedding::contextual::DEFAULT_BATCH_SIZE;
use crate::embedding::sentence::DEFAULT_SENTENCE_BATCH_SIZE;
use crate::embedding::EmbeddingMode;

pub const DEFAULT_CONTEXTUAL_MODEL_DIR: &str = "models/bert-base-portuguese-cased";
/// `sentence-transformers/paraphrase-multilingual-mpnet-base-v2`, an XLM-R encoder.
pub const DEFAULT_SENTENCE_MODEL_DIR: &str = "models/paraphrase-multilingual-mpnet-base-v2";
pub const DEFAULT_MAX_LENGTH: usize = 64;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub default_mode: EmbeddingMode,
    pub contextual_model_dir: PathBuf,
    pub sentence_model_dir: PathBuf,
    /// Contextual strategy batch size.
    pub batch_size: usize,
    /// Chunk size the sentence strategy feeds its encoder.
    pub sentence_batch_size: usize,
    pub max_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            default_mode: EmbeddingMode::Contextual,
            contextual_model_dir: PathBuf::from(DEFAULT_CONTEXTUAL_MODEL_DIR),
            sentence_model_dir: PathBuf::from(DEFAULT_SENTENCE_MODEL_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            sentence_batch_size: DEFAULT_SENTENCE_BATCH_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Json => f.write_str("json"),
            StoreBackend::Postgres => f.write_str("postgres"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" | "file" => Ok(StoreBackend::Json),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root of the JSON file store. Ignored by the PostgreSQL backend.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// Everything a consolidation run reads from the environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub embedding: EmbeddingConfig,
    pub clustering: DbscanParams,
    /// Replaces the built-in Portuguese stop-word list when set.
    pub stopwords_path: Option<PathBuf>,
    pub store: StoreConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PipelineConfig::default();

        let default_mode = match lookup("EMBEDDING_MODE") {
            Some(raw) => raw
                .parse::<EmbeddingMode>()
                .map_err(|e| anyhow!("EMBEDDING_MODE: {}", e))?,
            None => defaults.embedding.default_mode,
        };
        let backend = match lookup("STORE_BACKEND") {
            Some(raw) => raw
                .parse::<StoreBackend>()
                .map_err(|e| anyhow!("STORE_BACKEND: {}", e))?,
            None => defaults.store.backend,
        };

        let path_or = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let embedding = EmbeddingConfig {
            default_mode,
            contextual_model_dir: path_or(
                "CONTEXTUAL_MODEL_DIR",
                defaults.embedding.contextual_model_dir,
            ),
            sentence_model_dir: path_or("SENTENCE_MODEL_DIR", defaults.embedding.sentence_model_dir),
            batch_size: parse_or(
                &lookup,
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding.batch_size,
                |v: &usize| *v >= 1,
            ),
            sentence_batch_size: parse_or(
                &lookup,
                "SENTENCE_BATCH_SIZE",
                defaults.embedding.sentence_batch_size,
                |v: &usize| *v >= 1,
            ),
            max_length: parse_or(
                &lookup,
                "EMBEDDING_MAX_LENGTH",
                defaults.embedding.max_length,
                |v: &usize| *v >= 1,
            ),
        };

        // Cosine distance lives in [0, 2].
        let clustering = DbscanParams {
            eps: parse_or(&lookup, "CLUSTER_EPS", defaults.clustering.eps, |v: &f64| {
                *v > 0.0 && *v <= 2.0
            }),
            min_samples: parse_or(
                &lookup,
                "CLUSTER_MIN_SAMPLES",
                defaults.clustering.min_samples,
                |v: &usize| *v >= 1,
            ),
        };

        Ok(Self {
            embedding,
            clustering,
            stopwords_path: lookup("STOPWORDS_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            store: StoreConfig {
                backend,
                data_dir: path_or("DATA_DIR", defaults.store.data_dir),
            },
        })
    }

    pub fn log_config(&self) {
        info!("🧠 Embedding: default mode {}", self.embedding.default_mode);
        info!(
            "   Contextual model: {}",
            self.embedding.contextual_model_dir.display()
        );
        info!(
            "   Sentence model: {}",
            self.embedding.sentence_model_dir.display()
        );
        info!(
            "   Batch size: {} contextual / {} sentence, max tokens: {}",
            self.embedding.batch_size, self.embedding.sentence_batch_size, self.embedding.max_length
        );
        info!(
            "🔗 Clustering: DBSCAN eps={} min_samples={} (cosine)",
            self.clustering.eps, self.clustering.min_samples
        );
        match &self.stopwords_path {
            Some(path) => info!("📝 Stop-words: {}", path.display()),
            None => info!("📝 Stop-words: built-in Portuguese list"),
        }
        match self.store.backend {
            StoreBackend::Json => info!("💾 Store: JSON files under {}", self.store.data_dir.display()),
            StoreBackend::Postgres => info!("💾 Store: PostgreSQL"),
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Invalid {}='{}', using default {}", key, raw, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.embedding.default_mode, EmbeddingMode::Contextual);
        assert_eq!(config.embedding.batch_size, 128);
        assert_eq!(config.embedding.sentence_batch_size, 32);
        assert_eq!(config.embedding.max_length, 64);
        assert_eq!(
            config.embedding.sentence_model_dir,
            PathBuf::from("models/paraphrase-multilingual-mpnet-base-v2")
        );
        assert_eq!(config.clustering.eps, 0.01);
        assert_eq!(config.clustering.min_samples, 1);
        assert_eq!(config.store.backend, StoreBackend::Json);
        assert!(config.stopwords_path.is_none());
    }

    #[test]
    fn test_values_are_read() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("EMBEDDING_MODE", "sentence"),
            ("SENTENCE_MODEL_DIR", "/models/sbert"),
            ("EMBEDDING_BATCH_SIZE", "32"),
            ("SENTENCE_BATCH_SIZE", "16"),
            ("CLUSTER_EPS", "0.02"),
            ("CLUSTER_MIN_SAMPLES", "2"),
            ("STOPWORDS_PATH", "/etc/stopwords.txt"),
            ("STORE_BACKEND", "postgres"),
            ("DATA_DIR", "/var/catalog"),
        ]))
        .unwrap();

        assert_eq!(config.embedding.default_mode, EmbeddingMode::Sentence);
        assert_eq!(config.embedding.sentence_model_dir, PathBuf::from("/models/sbert"));
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.embedding.sentence_batch_size, 16);
        assert_eq!(config.clustering.eps, 0.02);
        assert_eq!(config.clustering.min_samples, 2);
        assert_eq!(config.stopwords_path, Some(PathBuf::from("/etc/stopwords.txt")));
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.data_dir, PathBuf::from("/var/catalog"));
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("EMBEDDING_BATCH_SIZE", "0"),
            ("EMBEDDING_MAX_LENGTH", "lots"),
            ("CLUSTER_EPS", "-1"),
            ("CLUSTER_MIN_SAMPLES", "0"),
        ]))
        .unwrap();
        assert_eq!(config.embedding.batch_size, 128);
        assert_eq!(config.embedding.max_length, 64);
        assert_eq!(config.clustering.eps, 0.01);
        assert_eq!(config.clustering.min_samples, 1);
    }

    #[test]
    fn test_unknown_mode_or_backend_is_an_error() {
        assert!(PipelineConfig::from_lookup(lookup(&[("EMBEDDING_MODE", "tfidf")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("STORE_BACKEND", "s3")])).is_err());
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("pg".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" JSON ".parse::<StoreBackend>().unwrap(), StoreBackend::Json);
        assert_eq!(StoreBackend::Postgres.to_string(), "postgres");
    }
}
