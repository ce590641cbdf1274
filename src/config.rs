use serde::Serialize;
use std::env;
use std::path::PathBuf;

/// Pooling strategy used to turn token embeddings into a sentence embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// Take the first ([CLS]) token. BGE-style models are trained for this.
    Cls,
    /// Attention-masked mean over all tokens.
    Mean,
}

impl Pooling {
    fn from_env() -> Self {
        match env::var("EMBEDDING_POOLING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "mean" | "avg" => Self::Mean,
            _ => Self::Cls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding pointer files and the hub download cache.
    pub model_storage_path: PathBuf,
    /// Log level name, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Prefer half-precision weights when a model ships them.
    pub use_fp16: bool,
    pub max_sequence_length: usize,
    /// Batch size for internal chunking during inference.
    pub batch_size: usize,
    /// Number of threads per ONNX session for intra-op parallelism.
    pub intra_threads: usize,
    /// Optional override for the per-model session pool size. If None, uses available cores.
    pub pool_size: Option<usize>,
    pub pooling: Pooling,
    pub shutdown_timeout_secs: u64,
}

/// The subset of settings exposed on `GET /config` and in the startup banner.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigInfo {
    pub model_storage_path: String,
    pub api_host: String,
    pub api_port: u16,
    pub log_level: String,
    pub use_fp16: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_storage_path: PathBuf::from("./model"),
            log_level: "INFO".to_string(),
            use_fp16: true,
            max_sequence_length: 512,
            batch_size: 32,
            intra_threads: 1,
            pool_size: None,
            pooling: Pooling::Cls,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Numeric values are parsed as-is; a malformed value aborts startup with
    /// the parse error rather than silently falling back.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()?,
            model_storage_path: PathBuf::from(
                env::var("MODEL_STORAGE_PATH").unwrap_or_else(|_| "./model".to_string()),
            ),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            use_fp16: parse_flag(&env::var("USE_FP16").unwrap_or_else(|_| "true".to_string())),
            max_sequence_length: env::var("MAX_SEQ_LENGTH")
                .unwrap_or_else(|_| "512".to_string())
                .parse()?,
            batch_size: env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "32".to_string())
                .parse()?,
            intra_threads: env::var("INTRA_THREADS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            pool_size: env::var("POOL_SIZE").ok().and_then(|s| s.parse().ok()),
            pooling: Pooling::from_env(),
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }

    pub fn info(&self) -> ConfigInfo {
        ConfigInfo {
            model_storage_path: self.model_storage_path.display().to_string(),
            api_host: self.host.clone(),
            api_port: self.port,
            log_level: self.log_level.clone(),
            use_fp16: self.use_fp16,
        }
    }

    /// Emit the startup banner listing the active settings and endpoints.
    pub fn log_banner(&self) {
        let info = self.info();
        tracing::info!(
            model_storage_path = %info.model_storage_path,
            address = %format!("{}:{}", info.api_host, info.api_port),
            log_level = %info.log_level,
            use_fp16 = info.use_fp16,
            "Current configuration"
        );
        let base = format!("http://{}:{}", info.api_host, info.api_port);
        tracing::info!("Health check:   GET  {base}/health");
        tracing::info!("Loaded models:  GET  {base}/models");
        tracing::info!("Embeddings:     POST {base}/v1/embeddings");
        tracing::info!("Rerank:         POST {base}/v1/rerank");
    }

    /// Session pool size for each loaded model.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}
