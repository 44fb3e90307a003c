//! Single-image pipeline: line removal, detection, recognition, extraction.

use super::result::ImageAnalysis;
use crate::core::errors::{FormResult, ProcessingStage};
use crate::domain::{ImageFilter, KeyValueExtractor, KeyValueMap, TextDetector, TextRecognizer};
use image::DynamicImage;
use std::path::Path;

/// Runs the four extraction stages on one image.
///
/// Every stage degrades to an empty result on failure, so the processor itself never
/// returns an error for a page.
pub struct ImageProcessor {
    filter: Box<dyn ImageFilter>,
    detector: Box<dyn TextDetector>,
    recognizer: Box<dyn TextRecognizer>,
    extractor: Box<dyn KeyValueExtractor>,
}

impl std::fmt::Debug for ImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessor").finish_non_exhaustive()
    }
}

impl ImageProcessor {
    pub fn new(
        filter: Box<dyn ImageFilter>,
        detector: Box<dyn TextDetector>,
        recognizer: Box<dyn TextRecognizer>,
        extractor: Box<dyn KeyValueExtractor>,
    ) -> Self {
        Self {
            filter,
            detector,
            recognizer,
            extractor,
        }
    }

    /// Loads an image from disk and extracts its fields.
    ///
    /// An image that cannot be read or decoded yields an empty map.
    pub fn process_single_image(&self, path: &Path) -> KeyValueMap {
        tracing::info!(path = %path.display(), "processing image");
        match load_image(path) {
            Ok(image) => self.process_image(&image),
            Err(err) => {
                tracing::error!(
                    stage = %ProcessingStage::ImageDecode,
                    path = %path.display(),
                    error = %err,
                    "image could not be loaded"
                );
                KeyValueMap::new()
            }
        }
    }

    /// Extracts the fields of an already decoded image.
    pub fn process_image(&self, image: &DynamicImage) -> KeyValueMap {
        self.analyze_image(image).key_values
    }

    /// Runs the pipeline and reports the intermediate counts and the classification.
    pub fn analyze_image(&self, image: &DynamicImage) -> ImageAnalysis {
        let Some(filtered) = self.filter.apply(image) else {
            return ImageAnalysis::default();
        };
        let filtered = DynamicImage::ImageLuma8(filtered);
        tracing::debug!("image filtering completed");

        let detection = self.detector.detect(&filtered);
        tracing::debug!(boxes = detection.boxes.len(), "text detection completed");

        let source = match detection.annotated {
            Some(annotated) => DynamicImage::ImageRgb8(annotated),
            None => filtered,
        };
        let fragments = self.recognizer.recognize(&source, &detection.boxes);
        tracing::debug!(fragments = fragments.len(), "text recognition completed");

        let (classification, key_values) = self.extractor.classify_and_extract(&fragments);

        ImageAnalysis {
            key_values,
            classification,
            region_count: detection.boxes.len(),
            fragment_count: fragments.len(),
        }
    }
}

/// Reads and decodes an image file.
pub fn load_image(path: &Path) -> FormResult<DynamicImage> {
    Ok(image::open(path)?)
}
