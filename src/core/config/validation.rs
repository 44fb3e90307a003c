//! Configuration validation trait.

use crate::core::errors::{FormError, FormResult};
use std::path::Path;

/// A trait for validating configuration parameters.
///
/// Implementors check their own fields in [`ConfigValidator::validate`] and can use
/// the provided helpers for the common range checks.
pub trait ConfigValidator {
    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// A Result indicating success or a configuration error if validation fails.
    fn validate(&self) -> FormResult<()>;

    /// Validates that a count is greater than zero.
    fn validate_positive(&self, value: usize, field: &str) -> FormResult<()> {
        if value == 0 {
            Err(FormError::invalid_field(field, "a value greater than 0", "0"))
        } else {
            Ok(())
        }
    }

    /// Validates that a float lies within `[0.0, 1.0]`.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to validate.
    /// * `field` - The name of the field being validated.
    fn validate_unit_interval(&self, value: f32, field: &str) -> FormResult<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            Err(FormError::invalid_field(
                field,
                "a value between 0.0 and 1.0",
                value.to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a model path exists and is a file.
    fn validate_model_path(&self, path: &Path, field: &str) -> FormResult<()> {
        if !path.is_file() {
            Err(FormError::invalid_field(
                field,
                "an existing model file",
                path.display().to_string(),
            ))
        } else {
            Ok(())
        }
    }
}
