//! Concurrent OCR over detected regions.
//!
//! Regions are sorted top-to-bottom then left-to-right before recognition, and the
//! results are collected in that order no matter which crop finishes first.

use crate::core::config::ParallelPolicy;
use crate::core::errors::{FormResult, ProcessingStage};
use crate::processors::BoundingBox;
use crate::utils::BBoxCrop;
use image::DynamicImage;
use rayon::prelude::*;
use std::sync::Arc;

/// An OCR engine reading a single cropped region.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> FormResult<String>;
}

/// Reads the text of every region on a page.
pub trait TextRecognizer: Send + Sync {
    /// Returns one fragment per region that produced text, in reading order.
    fn recognize(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Vec<String>;
}

/// Runs an [`OcrEngine`] on a dedicated rayon pool, one task per region.
#[derive(Clone)]
pub struct ParallelTextRecognizer {
    engine: Arc<dyn OcrEngine>,
    policy: ParallelPolicy,
}

impl std::fmt::Debug for ParallelTextRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelTextRecognizer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ParallelTextRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            policy: ParallelPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ParallelPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn read_region(&self, image: &DynamicImage, bbox: &BoundingBox) -> String {
        let Some(crop) = BBoxCrop::crop_bounding_box(image, bbox) else {
            return String::new();
        };
        match self.engine.recognize(&crop) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    stage = %ProcessingStage::TextRecognition,
                    error = %err,
                    region = ?bbox,
                    "region recognition failed"
                );
                String::new()
            }
        }
    }
}

impl TextRecognizer for ParallelTextRecognizer {
    fn recognize(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Vec<String> {
        if boxes.is_empty() {
            return Vec::new();
        }
        let mut ordered = boxes.to_vec();
        ordered.sort_by_key(BoundingBox::reading_order_key);

        let raw: Vec<String> = match self.policy.build_pool(ordered.len(), "ocr") {
            Ok(pool) => pool.install(|| {
                ordered
                    .par_iter()
                    .map(|bbox| self.read_region(image, bbox))
                    .collect()
            }),
            Err(err) => {
                tracing::warn!(error = %err, "falling back to sequential recognition");
                ordered
                    .iter()
                    .map(|bbox| self.read_region(image, bbox))
                    .collect()
            }
        };

        raw.into_iter()
            .map(|text| normalize_fragment(&text))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

/// Trims a fragment and joins its lines with single spaces.
pub fn normalize_fragment(text: &str) -> String {
    text.trim().replace('\n', " ")
}
