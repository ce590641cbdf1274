use crate::error::{AppError, Result};
use crate::inference::tokenize::EncodedBatch;
use crossbeam::channel::{bounded, Receiver, Sender};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::cell::UnsafeCell;
use std::path::Path;

/// A pool of ONNX Runtime Sessions for parallel inference over one model.
///
/// # Design Rationale
/// ONNX `Session::run` requires `&mut self`, but several requests may hit the
/// same model at once. Instead of a Mutex around one session (which
/// serializes all requests), we create N independent sessions and hand out
/// exclusive checkouts through a bounded channel of free indices. A caller
/// blocks in `acquire` only when every session is busy, which is fine since
/// inference always runs on the blocking thread pool.
///
/// # Safety
/// Each index lives in the channel at most once, so between `recv` and the
/// matching `send` in `PooledSession::drop` exactly one thread can reach the
/// corresponding `UnsafeCell<Session>`.
pub struct SessionPool {
    sessions: Vec<UnsafeCell<Session>>,
    release: Sender<usize>,
    available: Receiver<usize>,
}

/// Exclusive checkout of one session; returned to the pool on drop.
pub struct PooledSession<'a> {
    pool: &'a SessionPool,
    index: usize,
}

impl SessionPool {
    /// Load `pool_size` sessions from one model file with Level3 optimization.
    pub fn load(model_path: &Path, pool_size: usize, intra_threads: usize) -> Result<Self> {
        let pool_size = pool_size.max(1);

        // Read model file once
        let model_bytes = std::fs::read(model_path).map_err(|e| {
            AppError::ModelInitError(format!(
                "Failed to read model file {}: {}",
                model_path.display(),
                e
            ))
        })?;

        let mut sessions = Vec::with_capacity(pool_size);
        let (release, available) = bounded(pool_size);

        for i in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| AppError::ModelInitError(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::ModelInitError(e.to_string()))?
                .with_intra_threads(intra_threads.max(1))
                .map_err(|e| AppError::ModelInitError(e.to_string()))?
                .commit_from_memory(&model_bytes)
                .map_err(|e| AppError::ModelInitError(e.to_string()))?;

            sessions.push(UnsafeCell::new(session));
            release
                .send(i)
                .map_err(|_| AppError::ModelInitError("Failed to initialize session pool".into()))?;
        }

        tracing::info!(
            path = %model_path.display(),
            pool_size,
            intra_threads,
            "ONNX session pool loaded"
        );

        Ok(Self {
            sessions,
            release,
            available,
        })
    }

    /// Check out a session, blocking until one is free.
    pub fn acquire(&self) -> Result<PooledSession<'_>> {
        let index = self
            .available
            .recv()
            .map_err(|_| AppError::InferenceError("Session pool closed".into()))?;
        Ok(PooledSession { pool: self, index })
    }
}

impl PooledSession<'_> {
    pub fn session(&mut self) -> &mut Session {
        // SAFETY: the index was received from the pool channel, so no other
        // checkout holds it until this guard is dropped.
        unsafe { &mut *self.pool.sessions[self.index].get() }
    }

    /// Run one padded batch and copy out the named f32 output.
    ///
    /// XLM-RoBERTa style exports take no `token_type_ids`; pass
    /// `with_token_types = false` for those.
    pub fn run(
        &mut self,
        batch: &EncodedBatch,
        with_token_types: bool,
        output_name: &str,
    ) -> Result<(Vec<usize>, Vec<f32>)> {
        let shape = [batch.batch_size(), batch.seq_len()];
        let input_ids: Vec<i64> = batch.input_ids.iter().cloned().collect();
        let attention_mask: Vec<i64> = batch.attention_mask.iter().cloned().collect();

        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| AppError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
            .map_err(|e| AppError::InferenceError(e.to_string()))?;

        let session = self.session();
        let outputs = if with_token_types {
            let token_type_ids: Vec<i64> = batch.token_type_ids.iter().cloned().collect();
            let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
                .map_err(|e| AppError::InferenceError(e.to_string()))?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
            ])
        }
        .map_err(|e| AppError::InferenceError(e.to_string()))?;

        let output = outputs.get(output_name).ok_or_else(|| {
            AppError::InferenceError(format!("No '{}' output found", output_name))
        })?;

        let (dims, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::InferenceError(e.to_string()))?;

        let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
        Ok((dims, data.to_vec()))
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        // The receiver lives in the same pool, so this cannot fail.
        let _ = self.pool.release.send(self.index);
    }
}

// SAFETY: SessionPool is Send + Sync because:
// - crossbeam channels are thread-safe
// - every session index is held by at most one PooledSession at a time
// - sessions are never touched without first receiving their index
unsafe impl Send for SessionPool {}
unsafe impl Sync for SessionPool {}
