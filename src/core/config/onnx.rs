//! ONNX Runtime configuration types and utilities.

use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
///
/// This enum represents the different levels of graph optimization that can be applied
/// during ONNX Runtime session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    #[default]
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

/// Execution providers for ONNX Runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA execution provider, requires the `cuda` feature.
    Cuda {
        /// CUDA device ID (default: 0)
        #[serde(default)]
        device_id: Option<i32>,
        /// Memory limit in bytes (optional)
        #[serde(default)]
        gpu_mem_limit: Option<usize>,
    },
}

/// Configuration for ONNX Runtime sessions.
///
/// Shared by the detection model and the token classification model. Every field is
/// optional; unset fields keep the ONNX Runtime defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes
    pub inter_threads: Option<usize>,
    /// Graph optimization level
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Number of sessions kept per model for concurrent callers (default: 1)
    pub session_pool_size: Option<usize>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the number of inter-op threads.
    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Adds a single execution provider.
    ///
    /// # Arguments
    ///
    /// * `provider` - The execution provider to add.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn add_execution_provider(mut self, provider: OrtExecutionProvider) -> Self {
        if let Some(ref mut providers) = self.execution_providers {
            providers.push(provider);
        } else {
            self.execution_providers = Some(vec![provider]);
        }
        self
    }

    /// Sets the number of pooled sessions.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = Some(size);
        self
    }

    /// Gets the effective number of pooled sessions (at least one).
    pub fn get_session_pool_size(&self) -> usize {
        self.session_pool_size.unwrap_or(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ort_session_config_builder() {
        let config = OrtSessionConfig::new()
            .with_intra_threads(4)
            .with_inter_threads(2)
            .with_optimization_level(OrtGraphOptimizationLevel::Level2)
            .add_execution_provider(OrtExecutionProvider::Cpu);

        assert_eq!(config.intra_threads, Some(4));
        assert_eq!(config.inter_threads, Some(2));
        assert_eq!(
            config.optimization_level,
            Some(OrtGraphOptimizationLevel::Level2)
        );
        assert_eq!(
            config.execution_providers,
            Some(vec![OrtExecutionProvider::Cpu])
        );
    }

    #[test]
    fn test_session_pool_size_never_zero() {
        assert_eq!(OrtSessionConfig::new().get_session_pool_size(), 1);
        assert_eq!(
            OrtSessionConfig::new()
                .with_session_pool_size(0)
                .get_session_pool_size(),
            1
        );
        assert_eq!(
            OrtSessionConfig::new()
                .with_session_pool_size(3)
                .get_session_pool_size(),
            3
        );
    }

    #[test]
    fn test_execution_provider_from_toml() {
        let config: OrtSessionConfig = toml::from_str(
            r#"
            intra_threads = 2
            optimization_level = "level3"
            execution_providers = [{ kind = "cuda", device_id = 1 }, { kind = "cpu" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.intra_threads, Some(2));
        assert_eq!(
            config.execution_providers,
            Some(vec![
                OrtExecutionProvider::Cuda {
                    device_id: Some(1),
                    gpu_mem_limit: None
                },
                OrtExecutionProvider::Cpu
            ])
        );
    }
}
