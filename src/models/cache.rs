use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    HfHub, LoadedModel, ModelClassifier, ModelFactory, ModelHub, OnnxModelFactory, PointerFile,
    SubstringClassifier,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Subdirectory of the storage path handed to the hub as its download cache.
const HUB_CACHE_DIR: &str = "cache";

/// Per-identifier model cache with lazy download and initialization.
///
/// # Concurrency
/// Every identifier owns a `OnceCell`. Concurrent first requests for the same
/// identifier share one materialization; the rest await its result. A failed
/// load drops the empty cell so the next request starts over. Loaded entries
/// are never evicted.
pub struct ModelCache {
    storage_dir: PathBuf,
    use_fp16: bool,
    hub: Arc<dyn ModelHub>,
    classifier: Arc<dyn ModelClassifier>,
    factory: Arc<dyn ModelFactory>,
    entries: Mutex<HashMap<String, Arc<OnceCell<LoadedModel>>>>,
    /// Identifiers in the order their loads completed
    loaded: Mutex<Vec<String>>,
}

impl ModelCache {
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        use_fp16: bool,
        hub: Arc<dyn ModelHub>,
        factory: Arc<dyn ModelFactory>,
    ) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            use_fp16,
            hub,
            classifier: Arc::new(SubstringClassifier::default()),
            factory,
            entries: Mutex::new(HashMap::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Cache backed by the HuggingFace Hub and ONNX Runtime.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.model_storage_path.clone(),
            config.use_fp16,
            Arc::new(HfHub::new(config.use_fp16)),
            Arc::new(OnnxModelFactory::from_config(config)),
        )
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ModelClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Identifiers of all models loaded so far.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Return the cached model for `model_id`, downloading and initializing it on first use.
    pub async fn get_or_load(&self, model_id: &str) -> Result<LoadedModel> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(model_id.to_string()).or_default())
        };

        if let Some(model) = cell.get() {
            tracing::debug!(model = %model_id, "Model cache hit");
            return Ok(model.clone());
        }

        match cell.get_or_try_init(|| self.materialize(model_id)).await {
            Ok(model) => Ok(model.clone()),
            Err(e) => {
                self.forget_failed(model_id, &cell);
                Err(e)
            }
        }
    }

    /// Drop the entry for `model_id` if it is still the empty cell of a failed load.
    fn forget_failed(&self, model_id: &str, cell: &Arc<OnceCell<LoadedModel>>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stale = entries
            .get(model_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            entries.remove(model_id);
        }
    }

    async fn materialize(&self, model_id: &str) -> Result<LoadedModel> {
        let model_dir = self.resolve_model_dir(model_id).await?;
        let kind = self.classifier.classify(model_id);

        let factory = Arc::clone(&self.factory);
        let use_fp16 = self.use_fp16;
        let dir = model_dir.clone();
        let start = std::time::Instant::now();

        let model = tokio::task::spawn_blocking(move || factory.create(kind, &dir, use_fp16))
            .await
            .map_err(|e| AppError::ModelInitError(format!("Task join error: {}", e)))?
            .map_err(|e| match e {
                AppError::ModelInitError(_) => e,
                other => AppError::ModelInitError(other.to_string()),
            })?;

        {
            let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
            if !loaded.iter().any(|id| id == model_id) {
                loaded.push(model_id.to_string());
            }
        }

        tracing::info!(
            model = %model_id,
            kind = ?kind,
            path = %model_dir.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model loaded"
        );
        metrics::counter!("model_loads_total").increment(1);

        Ok(model)
    }

    /// Find the artifact directory via the pointer file, downloading when there is none.
    async fn resolve_model_dir(&self, model_id: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| {
                AppError::StorageError(format!(
                    "Failed to create model storage directory {}: {}",
                    self.storage_dir.display(),
                    e
                ))
            })?;

        let pointer = PointerFile::for_model(&self.storage_dir, model_id);
        if let Some(dir) = pointer.read().await? {
            tracing::info!(model = %model_id, path = %dir.display(), "Using cached model path");
            return Ok(dir);
        }

        tracing::info!(model = %model_id, "Downloading model");
        let cache_dir = self.storage_dir.join(HUB_CACHE_DIR);
        let dir = self
            .hub
            .fetch(model_id, &cache_dir)
            .await
            .map_err(|e| AppError::DownloadError(format!("{:#}", e)))?;
        let dir = match tokio::fs::canonicalize(&dir).await {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::warn!(
                    model = %model_id,
                    path = %dir.display(),
                    error = %e,
                    "Failed to canonicalize model path, recording it as returned"
                );
                dir
            }
        };

        pointer.write(&dir).await?;
        metrics::counter!("model_downloads_total").increment(1);

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Embedder, Reranker};
    use crate::models::ModelKind;
    use async_trait::async_trait;
    use ndarray::{ArrayD, IxDyn};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hub that creates an empty snapshot directory and counts calls.
    #[derive(Default)]
    struct CountingHub {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelHub for CountingHub {
        async fn fetch(&self, model_id: &str, cache_dir: &Path) -> anyhow::Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let dir = cache_dir.join(model_id.replace('/', "--"));
            tokio::fs::create_dir_all(&dir).await?;
            Ok(dir)
        }
    }

    struct FailingHub;

    #[async_trait]
    impl ModelHub for FailingHub {
        async fn fetch(&self, _model_id: &str, _cache_dir: &Path) -> anyhow::Result<PathBuf> {
            anyhow::bail!("hub unreachable")
        }
    }

    struct NullModel;

    impl Embedder for NullModel {
        fn encode(&self, texts: &[String]) -> Result<ArrayD<f32>> {
            Ok(ArrayD::zeros(IxDyn(&[texts.len(), 2])))
        }
    }

    impl Reranker for NullModel {
        fn compute_score(&self, pairs: &[(String, String)], _normalize: bool) -> Result<ArrayD<f32>> {
            Ok(ArrayD::zeros(IxDyn(&[pairs.len()])))
        }
    }

    struct NullFactory;

    impl ModelFactory for NullFactory {
        fn create(&self, kind: ModelKind, _dir: &Path, _use_fp16: bool) -> Result<LoadedModel> {
            Ok(match kind {
                ModelKind::Embedding => LoadedModel::Embedding(Arc::new(NullModel)),
                ModelKind::Reranking => LoadedModel::Reranking(Arc::new(NullModel)),
            })
        }
    }

    fn cache_with(storage: &Path, hub: Arc<dyn ModelHub>) -> ModelCache {
        ModelCache::new(storage, false, hub, Arc::new(NullFactory))
    }

    #[tokio::test]
    async fn test_second_load_hits_cache() {
        let storage = tempfile::tempdir().unwrap();
        let hub = Arc::new(CountingHub::default());
        let cache = cache_with(storage.path(), hub.clone());

        cache.get_or_load("BAAI/bge-base-en-v1.5").await.unwrap();
        cache.get_or_load("BAAI/bge-base-en-v1.5").await.unwrap();

        assert_eq!(hub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loaded(), vec!["BAAI/bge-base-en-v1.5".to_string()]);
    }

    #[tokio::test]
    async fn test_download_writes_pointer() {
        let storage = tempfile::tempdir().unwrap();
        let hub = Arc::new(CountingHub::default());
        let cache = cache_with(storage.path(), hub);

        cache.get_or_load("org/model").await.unwrap();

        let pointer = storage.path().join("org_model-key");
        let recorded = std::fs::read_to_string(pointer).unwrap();
        assert!(Path::new(recorded.trim()).is_dir());
    }

    #[tokio::test]
    async fn test_fresh_cache_reuses_pointer() {
        let storage = tempfile::tempdir().unwrap();
        let first_hub = Arc::new(CountingHub::default());
        cache_with(storage.path(), first_hub.clone())
            .get_or_load("org/model")
            .await
            .unwrap();

        // Simulates a process restart: new in-memory cache, same storage dir
        let second_hub = Arc::new(CountingHub::default());
        let cache = cache_with(storage.path(), second_hub.clone());
        cache.get_or_load("org/model").await.unwrap();

        assert_eq!(first_hub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_hub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_pointer_forces_download() {
        let storage = tempfile::tempdir().unwrap();
        std::fs::write(
            storage.path().join("org_model-key"),
            storage.path().join("does-not-exist").display().to_string(),
        )
        .unwrap();

        let hub = Arc::new(CountingHub::default());
        let cache = cache_with(storage.path(), hub.clone());
        cache.get_or_load("org/model").await.unwrap();

        assert_eq!(hub.calls.load(Ordering::SeqCst), 1);
        let recorded = std::fs::read_to_string(storage.path().join("org_model-key")).unwrap();
        assert!(!recorded.contains("does-not-exist"));
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_download_once() {
        let storage = tempfile::tempdir().unwrap();
        let hub = Arc::new(CountingHub::default());
        let cache = Arc::new(cache_with(storage.path(), hub.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_load("org/model").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(hub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loaded().len(), 1);
    }

    #[tokio::test]
    async fn test_kind_follows_classifier() {
        let storage = tempfile::tempdir().unwrap();
        let cache = cache_with(storage.path(), Arc::new(CountingHub::default()));

        let reranker = cache.get_or_load("BAAI/bge-reranker-base").await.unwrap();
        let embedder = cache.get_or_load("BAAI/bge-base-en-v1.5").await.unwrap();
        assert_eq!(reranker.kind(), ModelKind::Reranking);
        assert_eq!(embedder.kind(), ModelKind::Embedding);

        let custom = cache_with(storage.path(), Arc::new(CountingHub::default()))
            .with_classifier(Arc::new(|_: &str| ModelKind::Reranking));
        let model = custom.get_or_load("BAAI/bge-base-en-v1.5").await.unwrap();
        assert_eq!(model.kind(), ModelKind::Reranking);
    }

    #[tokio::test]
    async fn test_download_failure_is_reported_and_not_cached() {
        let storage = tempfile::tempdir().unwrap();
        let cache = cache_with(storage.path(), Arc::new(FailingHub));

        let err = cache.get_or_load("org/model").await.err().unwrap();
        assert!(matches!(err, AppError::DownloadError(ref m) if m.contains("hub unreachable")));
        assert!(cache.loaded().is_empty());
        assert!(!storage.path().join("org_model-key").exists());
    }

    #[tokio::test]
    async fn test_failed_loads_leave_no_entries() {
        let storage = tempfile::tempdir().unwrap();
        let cache = cache_with(storage.path(), Arc::new(FailingHub));

        for i in 0..50 {
            let id = format!("bogus/model-{}", i);
            assert!(cache.get_or_load(&id).await.is_err());
        }

        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_succeeds_after_failed_attempt() {
        let storage = tempfile::tempdir().unwrap();
        let failing = cache_with(storage.path(), Arc::new(FailingHub));
        assert!(failing.get_or_load("org/model").await.is_err());

        let hub = Arc::new(CountingHub::default());
        let cache = ModelCache {
            hub: hub.clone(),
            ..failing
        };
        cache.get_or_load("org/model").await.unwrap();

        assert_eq!(hub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_dir_created_on_demand() {
        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("nested").join("models");
        let cache = cache_with(&storage, Arc::new(CountingHub::default()));

        cache.get_or_load("org/model").await.unwrap();
        assert!(storage.is_dir());
    }

    #[tokio::test]
    async fn test_storage_dir_failure_is_storage_error() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let cache = cache_with(&blocker.join("models"), Arc::new(CountingHub::default()));

        let err = cache.get_or_load("org/model").await.err().unwrap();
        assert!(matches!(err, AppError::StorageError(_)));
    }
}
