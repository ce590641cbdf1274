/// Which inference capability a model provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Embedding,
    Reranking,
}

/// Policy deciding the kind of model an identifier names.
pub trait ModelClassifier: Send + Sync {
    fn classify(&self, model_id: &str) -> ModelKind;
}

impl<F> ModelClassifier for F
where
    F: Fn(&str) -> ModelKind + Send + Sync,
{
    fn classify(&self, model_id: &str) -> ModelKind {
        self(model_id)
    }
}

/// Identifiers whose lowercase form contains `needle` are rerankers;
/// everything else is an embedding model.
#[derive(Debug, Clone)]
pub struct SubstringClassifier {
    needle: String,
}

impl SubstringClassifier {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into().to_lowercase(),
        }
    }
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self::new("rerank")
    }
}

impl ModelClassifier for SubstringClassifier {
    fn classify(&self, model_id: &str) -> ModelKind {
        if model_id.to_lowercase().contains(&self.needle) {
            ModelKind::Reranking
        } else {
            ModelKind::Embedding
        }
    }
}
