//! Configuration management for the extraction pipeline.
//!
//! This module provides the TOML configuration file types, the validation trait,
//! ONNX Runtime session settings and the worker pool policy.

pub mod form;
pub mod onnx;
pub mod parallel;
pub mod validation;

pub use form::{
    BatchConfig, DetectorConfig, EntityRuleConfig, ExtractorConfig, FormConfig,
    ImpersonationConfig, LineFilterConfig, PathsConfig, RecognizerConfig, ServerConfig,
};
pub use onnx::*;
pub use parallel::ParallelPolicy;
pub use validation::ConfigValidator;
