use crate::error::{AppError, Result};
use ndarray::Array2;
use std::path::Path;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};

/// Padded model inputs for one batch, each shaped (batch_size, seq_len).
pub struct EncodedBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub token_type_ids: Array2<i64>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Tokenizer truncating to `max_length` while keeping the special tokens.
///
/// Single texts and fallback pairs trim the longest sequence first. Pairs
/// normally trim only the document so the query survives intact; a query
/// too long for that falls back to trimming both.
pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
    pair_tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerWrapper {
    pub fn load(tokenizer_path: &Path, max_length: usize) -> Result<Self> {
        let base = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| AppError::ModelInitError(format!("Failed to load tokenizer: {}", e)))?;

        let tokenizer = truncating(base.clone(), max_length, TruncationStrategy::LongestFirst)?;
        let pair_tokenizer = truncating(base, max_length, TruncationStrategy::OnlySecond)?;

        tracing::info!(
            path = %tokenizer_path.display(),
            max_length,
            "Tokenizer loaded successfully"
        );

        Ok(Self {
            tokenizer,
            pair_tokenizer,
            max_length,
        })
    }

    /// Tokenize independent texts for embedding.
    pub fn tokenize_texts(&self, texts: &[String]) -> Result<EncodedBatch> {
        let mut encodings = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| AppError::TokenizationError(e.to_string()))?;
            encodings.push(encoding);
        }
        Ok(self.pad(&encodings))
    }

    /// Tokenize (query, document) pairs for cross-encoder scoring.
    pub fn tokenize_pairs(&self, pairs: &[(String, String)]) -> Result<EncodedBatch> {
        let mut encodings = Vec::with_capacity(pairs.len());
        for (query, doc) in pairs {
            let input = (query.as_str(), doc.as_str());
            let encoding = match self.pair_tokenizer.encode(input, true) {
                Ok(encoding) => encoding,
                Err(e) => {
                    tracing::debug!(error = %e, "Query exceeds window, truncating both sides");
                    self.tokenizer
                        .encode(input, true)
                        .map_err(|e| AppError::TokenizationError(e.to_string()))?
                }
            };
            encodings.push(encoding);
        }
        Ok(self.pad(&encodings))
    }

    /// Pad to the longest encoding in the batch, capped at `max_length`.
    fn pad(&self, encodings: &[Encoding]) -> EncodedBatch {
        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch_size, max_len));
        let mut attention_mask = Array2::<i64>::zeros((batch_size, max_len));
        let mut token_type_ids = Array2::<i64>::zeros((batch_size, max_len));

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[[i, j]] = ids[j] as i64;
                attention_mask[[i, j]] = mask[j] as i64;
                token_type_ids[[i, j]] = types[j] as i64;
            }
        }

        EncodedBatch {
            input_ids,
            attention_mask,
            token_type_ids,
        }
    }
}

fn truncating(
    mut tokenizer: Tokenizer,
    max_length: usize,
    strategy: TruncationStrategy,
) -> Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            strategy,
            ..Default::default()
        }))
        .map_err(|e| AppError::ModelInitError(format!("Invalid truncation settings: {}", e)))?;
    Ok(tokenizer)
}
