//! Shared parallel processing configuration types.

use crate::core::errors::{FormError, FormResult, ProcessingStage};
use serde::{Deserialize, Serialize};

/// Configuration for a bounded worker pool.
///
/// Both the per-image recognizer (one task per text region) and the batch runner
/// (one task per image) size their rayon pools through this policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use for parallel processing.
    /// If None, the pool is sized to the amount of work capped at the number of CPU cores.
    #[serde(default)]
    pub max_threads: Option<usize>,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Resolves the number of worker threads for `work_items` units of work.
    ///
    /// The result is never zero and never exceeds the available parallelism or
    /// the configured maximum.
    pub fn effective_threads(&self, work_items: usize) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let cap = self.max_threads.map_or(cores, |max| max.min(cores));
        work_items.min(cap).max(1)
    }

    /// Builds a dedicated rayon pool sized for `work_items` units of work.
    ///
    /// # Arguments
    ///
    /// * `work_items` - Number of tasks the pool will run.
    /// * `name` - Prefix used for the worker thread names.
    pub fn build_pool(&self, work_items: usize, name: &str) -> FormResult<rayon::ThreadPool> {
        let prefix = name.to_string();
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_threads(work_items))
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| {
                FormError::stage_failure(
                    ProcessingStage::Generic,
                    format!("failed to build {name} thread pool"),
                    e,
                )
            })
    }
}
