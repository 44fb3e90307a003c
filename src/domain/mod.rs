//! The extraction stages and the traits they are plugged in through.
//!
//! Each stage is a trait ([`ImageFilter`], [`TextDetector`], [`TextRecognizer`],
//! [`KeyValueExtractor`]) with one production implementation. Stages convert their own
//! failures into a degraded result, so a page always produces a (possibly empty) map.

pub mod doc_classifier;
pub mod entities;
pub mod field_cleanup;
pub mod key_value;
pub mod line_filter;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod text_detector;
pub mod text_recognizer;

pub use doc_classifier::{DocumentClassification, SignatureClassifier};
pub use entities::{Entity, EntityRecognizer, OnnxEntityRecognizer, PatternEntityRecognizer};
pub use field_cleanup::FieldCleanup;
pub use key_value::{KeyValueExtractor, KeyValueMap, NerKeyValueExtractor, NoiseRemover};
pub use line_filter::{FilterOutcome, ImageFilter, LinesFilter};
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;
pub use text_detector::{
    DetectionModel, DetectionOutput, EastTextDetector, OnnxEastModel, TextDetector,
};
pub use text_recognizer::{OcrEngine, ParallelTextRecognizer, TextRecognizer};
