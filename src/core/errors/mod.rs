//! Error handling for the extraction pipeline.

mod constructors;
mod types;

pub use constructors::SimpleError;
pub use types::{FormError, FormResult, ProcessingStage};
