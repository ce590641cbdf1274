//! Bi-encoder embedding model.
//!
//! Encodes each input independently into a fixed-size, L2-normalized vector
//! (768 dimensions for BGE-base, 1024 for BGE-large).

use crate::config::Pooling;
use crate::error::{AppError, Result};
use crate::inference::session::SessionPool;
use crate::inference::tokenize::TokenizerWrapper;
use crate::inference::Embedder;
use ndarray::{Array2, ArrayD, Axis};

pub struct OnnxEmbedder {
    pool: SessionPool,
    tokenizer: TokenizerWrapper,
    pooling: Pooling,
    batch_size: usize,
    with_token_types: bool,
}

impl OnnxEmbedder {
    pub fn new(
        pool: SessionPool,
        tokenizer: TokenizerWrapper,
        pooling: Pooling,
        batch_size: usize,
        with_token_types: bool,
    ) -> Self {
        Self {
            pool,
            tokenizer,
            pooling,
            batch_size: batch_size.max(1),
            with_token_types,
        }
    }

    fn encode_chunk(&self, texts: &[String]) -> Result<Array2<f32>> {
        let batch = self.tokenizer.tokenize_texts(texts)?;

        let mut session = self.pool.acquire()?;
        let (dims, data) = session.run(&batch, self.with_token_types, "last_hidden_state")?;
        drop(session);

        pool_hidden_states(&dims, &data, &batch.attention_mask, self.pooling)
    }
}

impl Embedder for OnnxEmbedder {
    fn encode(&self, texts: &[String]) -> Result<ArrayD<f32>> {
        let mut rows: Vec<Array2<f32>> = Vec::with_capacity(texts.len().div_ceil(self.batch_size));
        for chunk in texts.chunks(self.batch_size) {
            rows.push(self.encode_chunk(chunk)?);
        }

        let views: Vec<_> = rows.iter().map(|r| r.view()).collect();
        let embeddings = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| AppError::InferenceError(e.to_string()))?;

        tracing::debug!(
            batch_size = texts.len(),
            dim = embeddings.ncols(),
            "Embeddings computed"
        );

        Ok(embeddings.into_dyn())
    }
}

/// Reduce a (batch, seq_len, hidden) tensor to (batch, hidden) and L2-normalize each row.
pub fn pool_hidden_states(
    dims: &[usize],
    data: &[f32],
    attention_mask: &Array2<i64>,
    pooling: Pooling,
) -> Result<Array2<f32>> {
    let [batch_size, seq_len, hidden_size] = dims else {
        return Err(AppError::InferenceError(format!(
            "Expected hidden states of rank 3, got shape {:?}",
            dims
        )));
    };
    let (batch_size, seq_len, hidden_size) = (*batch_size, *seq_len, *hidden_size);

    if data.len() != batch_size * seq_len * hidden_size {
        return Err(AppError::InferenceError(format!(
            "Hidden state buffer has {} values, shape {:?} needs {}",
            data.len(),
            dims,
            batch_size * seq_len * hidden_size
        )));
    }

    let mut embeddings = Array2::<f32>::zeros((batch_size, hidden_size));

    for i in 0..batch_size {
        let mut row = embeddings.row_mut(i);
        match pooling {
            Pooling::Cls => {
                let base_idx = i * seq_len * hidden_size;
                for (k, val) in row.iter_mut().enumerate() {
                    *val = data[base_idx + k];
                }
            }
            Pooling::Mean => {
                let mut count = 0.0f32;
                for j in 0..seq_len {
                    if attention_mask.get([i, j]).copied().unwrap_or(0) == 1 {
                        let base_idx = i * seq_len * hidden_size + j * hidden_size;
                        for (k, val) in row.iter_mut().enumerate() {
                            *val += data[base_idx + k];
                        }
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    row.mapv_inplace(|v| v / count);
                }
            }
        }

        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }

    Ok(embeddings)
}
