// src/embedding/contextual.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::debug;
use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::embedding::pooling::masked_mean_pool;
use crate::embedding::{check_shape, EmbeddingMode, EmbeddingProvider, TokenEncoder};
use crate::error::EmbeddingError;
use crate::utils::candle::tensor_to_array2;

pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Mean-pooled transformer embeddings computed in fixed-size batches, which
/// bounds peak memory to one batch of hidden states.
///
/// Pooling averages real tokens only (padding is masked out), so a name's
/// vector does not depend on the other names in its batch.
pub struct ContextualEmbedder<E: TokenEncoder> {
    encoder: E,
    batch_size: usize,
    multi_progress: Option<MultiProgress>,
}

impl<E: TokenEncoder> ContextualEmbedder<E> {
    pub fn new(encoder: E, batch_size: usize) -> Self {
        Self {
            encoder,
            batch_size: batch_size.max(1),
            multi_progress: None,
        }
    }

    pub fn with_progress(mut self, multi_progress: Option<MultiProgress>) -> Self {
        self.multi_progress = multi_progress;
        self
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Array2<f32>, EmbeddingError> {
        let encoded = self.encoder.encode(batch)?;
        let pooled = masked_mean_pool(&encoded.hidden_states, &encoded.attention_mask)?;
        let matrix = tensor_to_array2(&pooled)?;
        check_shape(&matrix, batch.len(), self.encoder.hidden_size())?;
        Ok(matrix)
    }
}

impl<E: TokenEncoder> EmbeddingProvider for ContextualEmbedder<E> {
    fn mode(&self) -> EmbeddingMode {
        EmbeddingMode::Contextual
    }

    fn dimension(&self) -> usize {
        self.encoder.hidden_size()
    }

    fn embed(&self, names: &[String]) -> Result<Array2<f32>, EmbeddingError> {
        if names.is_empty() {
            return Ok(Array2::zeros((0, self.dimension())));
        }

        let batch_count = names.len().div_ceil(self.batch_size);
        let pb = self.multi_progress.as_ref().map(|mp| {
            let pb = mp.add(ProgressBar::new(batch_count as u64));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "    {spinner:.green} [{elapsed_precise}] {bar:25.cyan/blue} {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            pb.set_message("Embedding batches...");
            pb
        });

        let mut batches = Vec::with_capacity(batch_count);
        for (i, batch) in names.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding batch {}/{} ({} names)",
                i + 1,
                batch_count,
                batch.len()
            );
            batches.push(self.embed_batch(batch)?);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        let views: Vec<ArrayView2<f32>> = batches.iter().map(|b| b.view()).collect();
        let embeddings = concatenate(Axis(0), &views).map_err(|_| EmbeddingError::DimensionMismatch {
            expected: self.dimension(),
            actual: batches.first().map(|b| b.ncols()).unwrap_or(0),
        })?;
        check_shape(&embeddings, names.len(), self.dimension())?;
        Ok(embeddings)
    }
}
