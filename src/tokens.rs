//! Usage accounting.
//!
//! Token counts reported by the API are a character-count proxy, not real
//! sub-word tokens: one Unicode scalar value counts as one token.

/// Sum of character counts across `texts`.
pub fn estimate_tokens<S: AsRef<str>>(texts: &[S]) -> usize {
    texts.iter().map(|t| t.as_ref().chars().count()).sum()
}
