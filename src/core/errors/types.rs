//! Core error types for the extraction pipeline.
//!
//! This module defines the [`FormError`] enum used by every stage of the pipeline
//! together with the [`ProcessingStage`] tag that tells which stage produced a failure.
//! Stage boundaries convert these errors into their degraded results; only
//! configuration and model loading errors are allowed to escape to the caller.

use thiserror::Error;

/// Enum representing the stages of the extraction pipeline.
///
/// This enum is used to identify which stage an error occurred in, providing
/// context for logging and degraded-result handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred while decoding the input image.
    ImageDecode,
    /// Error occurred while removing ruled lines from the page.
    LineRemoval,
    /// Error occurred while detecting text regions.
    TextDetection,
    /// Error occurred while recognizing text inside a region.
    TextRecognition,
    /// Error occurred while running the entity recognizer.
    EntityRecognition,
    /// Error occurred while assembling key-value pairs.
    KeyValueExtraction,
    /// Error occurred while dispatching a batch of images.
    BatchProcessing,
    /// Error occurred while impersonating another principal.
    Impersonation,
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::ImageDecode => write!(f, "image decode"),
            ProcessingStage::LineRemoval => write!(f, "line removal"),
            ProcessingStage::TextDetection => write!(f, "text detection"),
            ProcessingStage::TextRecognition => write!(f, "text recognition"),
            ProcessingStage::EntityRecognition => write!(f, "entity recognition"),
            ProcessingStage::KeyValueExtraction => write!(f, "key-value extraction"),
            ProcessingStage::BatchProcessing => write!(f, "batch processing"),
            ProcessingStage::Impersonation => write!(f, "impersonation"),
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Enum representing the errors that can occur in the extraction pipeline.
#[derive(Error, Debug)]
pub enum FormError {
    /// Error occurred while loading or decoding an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred inside a pipeline stage.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred while running an external model.
    #[error("inference failed in model '{model_name}': {context}")]
    Inference {
        /// The name of the model where inference failed.
        model_name: String,
        /// Additional context about the inference error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error returned by the OCR engine.
    #[error("ocr engine: {message}")]
    Ocr {
        /// A message describing the OCR failure.
        message: String,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor reshaping.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// Error loading a model file, with context and suggestions.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the model that failed to load
        model_path: String,
        /// Short reason string
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present)
        suggestion: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<image::ImageError> for FormError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<regex::Error> for FormError {
    fn from(error: regex::Error) -> Self {
        Self::ConfigError {
            message: format!("invalid pattern: {error}"),
        }
    }
}

impl FormError {
    /// Returns true for errors that must abort startup rather than degrade a single image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigError { .. } | Self::ModelLoad { .. })
    }
}

/// Result alias used throughout the crate.
pub type FormResult<T> = Result<T, FormError>;
