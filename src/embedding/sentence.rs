// src/embedding/sentence.rs

use log::debug;
use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::embedding::pooling::{l2_normalize, masked_mean_pool};
use crate::embedding::{check_shape, EmbeddingMode, EmbeddingProvider, TokenEncoder};
use crate::error::EmbeddingError;
use crate::utils::candle::tensor_to_array2;

pub const DEFAULT_SENTENCE_BATCH_SIZE: usize = 32;

/// Sentence-embedding model: mean pooling, then unit-length rows. One `embed`
/// call covers the whole input; the encoder sees it in chunks of
/// `batch_size`.
pub struct SentenceEmbedder<E: TokenEncoder> {
    encoder: E,
    batch_size: usize,
}

impl<E: TokenEncoder> SentenceEmbedder<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            batch_size: DEFAULT_SENTENCE_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    fn embed_chunk(&self, chunk: &[String]) -> Result<Array2<f32>, EmbeddingError> {
        let encoded = self.encoder.encode(chunk)?;
        let pooled = masked_mean_pool(&encoded.hidden_states, &encoded.attention_mask)?;
        let normalized = l2_normalize(&pooled)?;
        let matrix = tensor_to_array2(&normalized)?;
        check_shape(&matrix, chunk.len(), self.encoder.hidden_size())?;
        Ok(matrix)
    }
}

impl<E: TokenEncoder> EmbeddingProvider for SentenceEmbedder<E> {
    fn mode(&self) -> EmbeddingMode {
        EmbeddingMode::Sentence
    }

    fn dimension(&self) -> usize {
        self.encoder.hidden_size()
    }

    fn embed(&self, names: &[String]) -> Result<Array2<f32>, EmbeddingError> {
        if names.is_empty() {
            return Ok(Array2::zeros((0, self.dimension())));
        }

        let chunks = names
            .chunks(self.batch_size)
            .map(|chunk| self.embed_chunk(chunk))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Sentence-embedded {} names in {} chunks", names.len(), chunks.len());

        let views: Vec<ArrayView2<f32>> = chunks.iter().map(|c| c.view()).collect();
        let embeddings = concatenate(Axis(0), &views).map_err(|_| EmbeddingError::DimensionMismatch {
            expected: self.dimension(),
            actual: chunks.first().map(|c| c.ncols()).unwrap_or(0),
        })?;
        check_shape(&embeddings, names.len(), self.dimension())?;
        Ok(embeddings)
    }
}
