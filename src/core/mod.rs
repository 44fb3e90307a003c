//! The core module of the extraction pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Configuration management
//! - Error handling
//! - ONNX Runtime inference engine integration

pub mod config;
pub mod errors;
pub mod inference;

pub use config::{ConfigValidator, FormConfig, ParallelPolicy};
pub use errors::{FormError, FormResult, ProcessingStage};
pub use inference::OrtInfer;
