use crate::error::{AppError, Result};
use crate::inference::session::SessionPool;
use crate::inference::tokenize::TokenizerWrapper;
use crate::inference::Reranker;
use ndarray::{Array1, ArrayD};

/// Cross-encoder that scores (query, document) pairs jointly.
pub struct CrossEncoder {
    pool: SessionPool,
    tokenizer: TokenizerWrapper,
    batch_size: usize,
    with_token_types: bool,
}

impl CrossEncoder {
    pub fn new(
        pool: SessionPool,
        tokenizer: TokenizerWrapper,
        batch_size: usize,
        with_token_types: bool,
    ) -> Self {
        Self {
            pool,
            tokenizer,
            batch_size: batch_size.max(1),
            with_token_types,
        }
    }

    /// Raw logits (pre-sigmoid) for one chunk of pairs.
    fn score_chunk(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let batch = self.tokenizer.tokenize_pairs(pairs)?;
        let batch_size = batch.batch_size();

        let mut session = self.pool.acquire()?;
        let (_dims, data) = session.run(&batch, self.with_token_types, "logits")?;

        if data.len() < batch_size {
            return Err(AppError::InferenceError(format!(
                "Model returned {} logits for {} pairs",
                data.len(),
                batch_size
            )));
        }

        // Logits are (batch, 1); take first `batch_size` scores if output is flattened
        Ok(data.into_iter().take(batch_size).collect())
    }
}

impl Reranker for CrossEncoder {
    fn compute_score(&self, pairs: &[(String, String)], normalize: bool) -> Result<ArrayD<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.batch_size) {
            scores.extend(self.score_chunk(chunk)?);
        }

        if normalize {
            scores.iter_mut().for_each(|s| *s = sigmoid(*s));
        }

        tracing::debug!(pairs = pairs.len(), normalize, "Pairs scored");

        Ok(Array1::from(scores).into_dyn())
    }
}

/// Sigmoid activation: 1 / (1 + e^-x)
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
