// src/embedding/pooling.rs

use candle_core::Tensor;

/// Averages token vectors over the sequence axis, ignoring padded positions.
///
/// `hidden_states` is `[batch, tokens, hidden]`, `attention_mask` is
/// `[batch, tokens]`. Returns `[batch, hidden]`.
pub fn masked_mean_pool(hidden_states: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask
        .to_dtype(hidden_states.dtype())?
        .unsqueeze(2)?;
    let summed = hidden_states.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.affine(1.0, 1e-9)?;
    summed.broadcast_div(&counts)
}

/// Scales every row to unit L2 norm. All-zero rows stay zero.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .affine(1.0, 1e-12)?;
    embeddings.broadcast_div(&norms)
}
