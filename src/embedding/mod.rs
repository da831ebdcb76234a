//! Sentence-level embeddings for product names.
//!
//! Two strategies implement [`EmbeddingProvider`]:
//!
//! - [`ContextualEmbedder`] runs a transformer encoder in fixed-size batches and
//!   mean-pools the per-token hidden states.
//! - [`SentenceEmbedder`] runs a sentence-embedding model over the whole input
//!   in one `embed` call (chunked internally) and returns L2-normalized vectors.
//!
//! The strategy is picked once, when the provider is built, from an
//! [`EmbeddingMode`]. Both go through the [`TokenEncoder`] seam so the pooling
//! and batching logic can be exercised without model files.

pub mod contextual;
pub mod pooling;
pub mod sentence;
pub mod transformer;

use candle_core::Tensor;
use indicatif::MultiProgress;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::EmbeddingError;
use crate::utils::candle::candle_device;
use crate::utils::pipeline_config::EmbeddingConfig;

pub use transformer::{Architecture, ModelPaths, TransformerEncoder};
pub use contextual::ContextualEmbedder;
pub use sentence::SentenceEmbedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Contextual,
    Sentence,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingMode::Contextual => "contextual",
            EmbeddingMode::Sentence => "sentence",
        }
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contextual" | "bert" | "0" => Ok(EmbeddingMode::Contextual),
            "sentence" | "sbert" | "sentence-bert" | "1" => Ok(EmbeddingMode::Sentence),
            other => Err(format!("unknown embedding mode '{}'", other)),
        }
    }
}

/// Turns a sequence of texts into an `[N, D]` matrix.
///
/// Row `i` of the result always belongs to `names[i]`; callers re-attach
/// vectors to records by position. An empty input yields a `[0, D]` matrix.
pub trait EmbeddingProvider: Send + Sync {
    fn mode(&self) -> EmbeddingMode;

    fn dimension(&self) -> usize;

    fn embed(&self, names: &[String]) -> Result<Array2<f32>, EmbeddingError>;
}

/// Per-token output of an encoder for one batch of texts.
pub struct EncodedBatch {
    /// `[batch, tokens, hidden]`
    pub hidden_states: Tensor,
    /// `[batch, tokens]`, 1 for real tokens and 0 for padding.
    pub attention_mask: Tensor,
}

/// A tokenizer + transformer pair producing contextual token representations.
pub trait TokenEncoder: Send + Sync {
    fn hidden_size(&self) -> usize;

    fn encode(&self, texts: &[String]) -> Result<EncodedBatch, EmbeddingError>;
}

/// Loads the model for `mode` and wraps it in the matching strategy.
pub fn build_provider(
    mode: EmbeddingMode,
    config: &EmbeddingConfig,
    multi_progress: Option<MultiProgress>,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let device = candle_device();
    match mode {
        EmbeddingMode::Contextual => {
            info!(
                "Loading contextual encoder from {}",
                config.contextual_model_dir.display()
            );
            let paths = ModelPaths::from_dir(&config.contextual_model_dir);
            let encoder = TransformerEncoder::load(&paths, config.max_length, device)?;
            let embedder = ContextualEmbedder::new(encoder, config.batch_size)
                .with_progress(multi_progress);
            Ok(Arc::new(embedder))
        }
        EmbeddingMode::Sentence => {
            info!(
                "Loading sentence-embedding model from {}",
                config.sentence_model_dir.display()
            );
            let paths = ModelPaths::from_dir(&config.sentence_model_dir);
            let encoder = TransformerEncoder::load(&paths, config.max_length, device)?;
            let embedder =
                SentenceEmbedder::new(encoder).with_batch_size(config.sentence_batch_size);
            Ok(Arc::new(embedder))
        }
    }
}

pub(crate) fn check_shape(
    matrix: &Array2<f32>,
    expected_rows: usize,
    expected_dim: usize,
) -> Result<(), EmbeddingError> {
    let (rows, cols) = matrix.dim();
    if rows != expected_rows {
        return Err(EmbeddingError::RowCountMismatch {
            expected: expected_rows,
            actual: rows,
        });
    }
    if cols != expected_dim {
        return Err(EmbeddingError::DimensionMismatch {
            expected: expected_dim,
            actual: cols,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use candle_core::Device;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub const FAKE_HIDDEN: usize = 4;
    const PAD_VALUE: f32 = 1000.0;

    /// Deterministic stand-in for a transformer: one hidden vector per
    /// whitespace token, padding filled with a large sentinel so unmasked
    /// pooling would be visible in tests.
    pub struct FakeEncoder {
        pub max_tokens: usize,
        pub calls: Mutex<Vec<usize>>,
        pub drop_last_row: bool,
    }

    impl FakeEncoder {
        pub fn new() -> Self {
            Self {
                max_tokens: 8,
                calls: Mutex::new(Vec::new()),
                drop_last_row: false,
            }
        }

        pub fn batch_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }

        fn token_vector(token: &str) -> [f32; FAKE_HIDDEN] {
            let sum: u32 = token.bytes().map(u32::from).sum();
            let mut v = [0f32; FAKE_HIDDEN];
            for (h, slot) in v.iter_mut().enumerate() {
                *slot = ((sum * (h as u32 + 1)) % 97) as f32 / 97.0 + 0.01;
            }
            v
        }
    }

    impl TokenEncoder for FakeEncoder {
        fn hidden_size(&self) -> usize {
            FAKE_HIDDEN
        }

        fn encode(&self, texts: &[String]) -> Result<EncodedBatch, EmbeddingError> {
            self.calls.lock().unwrap().push(texts.len());
            let rows = if self.drop_last_row {
                &texts[..texts.len().saturating_sub(1)]
            } else {
                texts
            };

            let tokenized: Vec<Vec<&str>> = rows
                .iter()
                .map(|t| {
                    let mut toks: Vec<&str> = t.split_whitespace().take(self.max_tokens).collect();
                    if toks.is_empty() {
                        toks.push("");
                    }
                    toks
                })
                .collect();
            let seq_len = tokenized.iter().map(Vec::len).max().unwrap_or(1);

            let mut hidden = Vec::with_capacity(rows.len() * seq_len * FAKE_HIDDEN);
            let mut mask = Vec::with_capacity(rows.len() * seq_len);
            for toks in &tokenized {
                for t in 0..seq_len {
                    match toks.get(t) {
                        Some(tok) => {
                            hidden.extend_from_slice(&Self::token_vector(tok));
                            mask.push(1u32);
                        }
                        None => {
                            hidden.extend(std::iter::repeat(PAD_VALUE).take(FAKE_HIDDEN));
                            mask.push(0u32);
                        }
                    }
                }
            }

            let hidden_states =
                Tensor::from_vec(hidden, (rows.len(), seq_len, FAKE_HIDDEN), &Device::Cpu)?;
            let attention_mask = Tensor::from_vec(mask, (rows.len(), seq_len), &Device::Cpu)?;
            Ok(EncodedBatch {
                hidden_states,
                attention_mask,
            })
        }
    }

    pub struct FailingEncoder;

    impl TokenEncoder for FailingEncoder {
        fn hidden_size(&self) -> usize {
            FAKE_HIDDEN
        }

        fn encode(&self, _texts: &[String]) -> Result<EncodedBatch, EmbeddingError> {
            Err(EmbeddingError::Tokenizer("model unavailable".to_string()))
        }
    }

    /// Provider returning fixed vectors keyed by (normalized) text.
    pub struct StaticEmbeddingProvider {
        pub vectors: HashMap<String, Vec<f32>>,
        pub dimension: usize,
        pub seen: Mutex<Vec<String>>,
    }

    impl StaticEmbeddingProvider {
        pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
            Self {
                vectors: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                dimension,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl EmbeddingProvider for StaticEmbeddingProvider {
        fn mode(&self) -> EmbeddingMode {
            EmbeddingMode::Sentence
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, names: &[String]) -> Result<Array2<f32>, EmbeddingError> {
            self.seen.lock().unwrap().extend(names.iter().cloned());
            let mut flat = Vec::with_capacity(names.len() * self.dimension);
            for name in names {
                let v = self.vectors.get(name).ok_or_else(|| {
                    EmbeddingError::Tokenizer(format!("no fixture vector for '{}'", name))
                })?;
                flat.extend_from_slice(v);
            }
            Ok(Array2::from_shape_vec((names.len(), self.dimension), flat).unwrap())
        }
    }
}
