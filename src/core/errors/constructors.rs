//! Error constructor utilities.
//!
//! Small helpers that keep error construction at stage boundaries short and consistent.

use super::types::{FormError, ProcessingStage};
use std::path::Path;

/// A plain string error used as the `source` of wrapped errors.
#[derive(Debug)]
pub struct SimpleError(String);

impl SimpleError {
    /// Creates a new simple error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SimpleError {}

impl FormError {
    /// Creates a processing error for the given stage from a message.
    pub fn stage_error(kind: ProcessingStage, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Processing {
            kind,
            context: message.clone(),
            source: Box::new(SimpleError::new(message)),
        }
    }

    /// Wraps an underlying error as a failure of the given stage.
    pub fn stage_failure(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error raised by an external model.
    pub fn inference_error(
        model_name: impl Into<String>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.into(),
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates a tensor shape mismatch error.
    pub fn tensor_shape_error(context: &str, expected: &[usize], actual: &[usize]) -> Self {
        Self::stage_error(
            ProcessingStage::TensorOperation,
            format!("{context}: expected shape {expected:?}, got {actual:?}"),
        )
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates a configuration error for missing required fields.
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!(
                "missing required field '{}' in {}",
                field.into(),
                context.into()
            ),
        }
    }

    /// Creates a configuration error for invalid field values.
    pub fn invalid_field(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ConfigError {
            message: format!(
                "invalid value for field '{}': expected {}, got {}",
                field.into(),
                expected.into(),
                actual.into()
            ),
        }
    }

    /// Creates a model load error with an optional suggestion and source.
    pub fn model_load_error(
        path: &Path,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self::ModelLoad {
            model_path: path.display().to_string(),
            reason: reason.into(),
            suggestion: suggestion.map(|s| format!("; {s}")).unwrap_or_default(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }
}
