//! Text region detection with the EAST model.
//!
//! Detection runs in five steps: resize to a multiple of 32, run the model, decode and
//! suppress candidates, merge them into regions, and map the regions back to the input
//! image. The model sits behind [`DetectionModel`] so the geometry can be exercised
//! without an ONNX file.

use crate::core::config::{DetectorConfig, OrtSessionConfig};
use crate::core::errors::{FormError, FormResult, ProcessingStage};
use crate::core::inference::OrtInfer;
use crate::processors::east::{
    EastOutput, ResizePlan, TensorLayout, build_blob, decode_candidates,
};
use crate::processors::geometry::{BoundingBox, SuppressionMode, non_max_suppression};
use crate::processors::region_merge::RegionMerger;
use crate::utils::BBoxCrop;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::ArrayView4;
use std::path::Path;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ANNOTATION_THICKNESS: u32 = 2;

/// Detected regions plus the annotated page.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutput {
    /// The RGB page with each region outlined, when annotation is enabled.
    pub annotated: Option<RgbImage>,
    /// Regions in input image coordinates, in no particular order.
    pub boxes: Vec<BoundingBox>,
}

/// Finds text regions on a page.
pub trait TextDetector: Send + Sync {
    /// Detects text regions. Failures are logged and yield an empty output.
    fn detect(&self, image: &DynamicImage) -> DetectionOutput;
}

/// A model producing EAST score and geometry grids.
pub trait DetectionModel: Send + Sync {
    /// Layout the input blob must be built in.
    fn layout(&self) -> TensorLayout;

    /// Runs the model on a mean-subtracted blob.
    fn predict(&self, blob: ArrayView4<'_, f32>) -> FormResult<EastOutput>;
}

/// EAST model served by ONNX Runtime.
#[derive(Debug)]
pub struct OnnxEastModel {
    infer: OrtInfer,
    layout: TensorLayout,
    input_name: String,
    score_output: String,
    geometry_output: String,
}

impl OnnxEastModel {
    /// Loads the model and binds the tensor names from the detector settings.
    pub fn load(
        model_path: impl AsRef<Path>,
        config: &DetectorConfig,
        session: &OrtSessionConfig,
    ) -> FormResult<Self> {
        Ok(Self {
            infer: OrtInfer::from_config(session, model_path)?,
            layout: config.layout,
            input_name: config.input_name.clone(),
            score_output: config.score_output.clone(),
            geometry_output: config.geometry_output.clone(),
        })
    }
}

impl DetectionModel for OnnxEastModel {
    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn predict(&self, blob: ArrayView4<'_, f32>) -> FormResult<EastOutput> {
        let mut outputs = self.infer.run_image(
            &self.input_name,
            blob,
            &[self.score_output.as_str(), self.geometry_output.as_str()],
        )?;
        let geometry = outputs.pop();
        let scores = outputs.pop();
        match (scores, geometry) {
            (Some(scores), Some(geometry)) => EastOutput::from_raw(scores, geometry, self.layout),
            _ => Err(FormError::stage_error(
                ProcessingStage::TextDetection,
                "model returned fewer outputs than requested",
            )),
        }
    }
}

/// EAST detection followed by suppression and region merging.
pub struct EastTextDetector {
    model: Box<dyn DetectionModel>,
    min_confidence: f32,
    overlap_thresh: f32,
    suppression: SuppressionMode,
    merger: RegionMerger,
    annotate: bool,
}

impl std::fmt::Debug for EastTextDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EastTextDetector")
            .field("min_confidence", &self.min_confidence)
            .field("overlap_thresh", &self.overlap_thresh)
            .field("suppression", &self.suppression)
            .field("merger", &self.merger)
            .field("annotate", &self.annotate)
            .finish_non_exhaustive()
    }
}

impl EastTextDetector {
    /// Creates a detector with default thresholds.
    pub fn new(model: Box<dyn DetectionModel>) -> Self {
        Self::from_config(model, &DetectorConfig::default())
    }

    pub fn from_config(model: Box<dyn DetectionModel>, config: &DetectorConfig) -> Self {
        Self {
            model,
            min_confidence: config.min_confidence,
            overlap_thresh: config.overlap_thresh,
            suppression: config.suppression,
            merger: RegionMerger::default().with_padding(config.padding),
            annotate: config.annotate,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_suppression(mut self, mode: SuppressionMode) -> Self {
        self.suppression = mode;
        self
    }

    pub fn with_annotation(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Runs detection and reports failures as errors.
    pub fn detect_regions(&self, image: &DynamicImage) -> FormResult<DetectionOutput> {
        let rgb = image.to_rgb8();
        let plan = ResizePlan::for_size(rgb.width(), rgb.height())?;
        let resized = imageops::resize(&rgb, plan.width, plan.height, FilterType::Triangle);

        let blob = build_blob(&resized, self.model.layout());
        let output = self.model.predict(blob.view())?;

        let candidates = decode_candidates(&output, self.min_confidence);
        let kept = non_max_suppression(&candidates, self.overlap_thresh, self.suppression);
        let regions = self.merger.merge(&kept, plan.width, plan.height)?;
        let boxes: Vec<BoundingBox> = regions
            .iter()
            .map(|r| r.scale(plan.ratio_w, plan.ratio_h))
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            kept = kept.len(),
            regions = boxes.len(),
            "text detection finished"
        );

        let annotated = self.annotate.then(|| {
            let mut annotated = rgb;
            BBoxCrop::outline_boxes(
                &mut annotated,
                &boxes,
                ANNOTATION_COLOR,
                ANNOTATION_THICKNESS,
            );
            annotated
        });

        Ok(DetectionOutput { annotated, boxes })
    }
}

impl TextDetector for EastTextDetector {
    fn detect(&self, image: &DynamicImage) -> DetectionOutput {
        match self.detect_regions(image) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    stage = %ProcessingStage::TextDetection,
                    error = %err,
                    "text detection failed"
                );
                DetectionOutput::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    /// Returns fixed grids: every listed cell scores 0.9 with the given distances.
    struct FakeModel {
        cells: Vec<(usize, usize, [f32; 5])>,
    }

    impl DetectionModel for FakeModel {
        fn layout(&self) -> TensorLayout {
            TensorLayout::Nchw
        }

        fn predict(&self, blob: ArrayView4<'_, f32>) -> FormResult<EastOutput> {
            let (rows, cols) = (blob.shape()[2] / 4, blob.shape()[3] / 4);
            let mut scores = Array2::<f32>::zeros((rows, cols));
            let mut geometry = Array3::<f32>::zeros((5, rows, cols));
            for &(y, x, geo) in &self.cells {
                scores[[y, x]] = 0.9;
                for (c, v) in geo.iter().enumerate() {
                    geometry[[c, y, x]] = *v;
                }
            }
            Ok(EastOutput { scores, geometry })
        }
    }

    struct FailingModel;

    impl DetectionModel for FailingModel {
        fn layout(&self) -> TensorLayout {
            TensorLayout::Nchw
        }

        fn predict(&self, _blob: ArrayView4<'_, f32>) -> FormResult<EastOutput> {
            Err(FormError::stage_error(ProcessingStage::TextDetection, "boom"))
        }
    }

    fn page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn test_no_scores_no_boxes() {
        let detector = EastTextDetector::new(Box::new(FakeModel { cells: vec![] }));
        let output = detector.detect(&page(320, 320));
        assert!(output.boxes.is_empty());
        let annotated = output.annotated.unwrap();
        assert_eq!(annotated.dimensions(), (320, 320));
    }

    #[test]
    fn test_too_narrow_image_yields_nothing() {
        let detector = EastTextDetector::new(Box::new(FakeModel { cells: vec![] }));
        let output = detector.detect(&page(20, 400));
        assert!(output.annotated.is_none());
        assert!(output.boxes.is_empty());
    }

    #[test]
    fn test_model_failure_yields_nothing() {
        let detector = EastTextDetector::new(Box::new(FailingModel));
        let output = detector.detect(&page(320, 320));
        assert!(output.annotated.is_none());
        assert!(output.boxes.is_empty());
    }

    #[test]
    fn test_single_detection_maps_back_to_input() {
        // Cell (10, 10) has offset (40, 40); the decoded box is (20, 30)-(60, 45).
        let model = FakeModel {
            cells: vec![(10, 10, [10.0, 20.0, 5.0, 20.0, 0.0])],
        };
        let detector = EastTextDetector::new(Box::new(model));
        // 330x330 resizes to 320x320.
        let output = detector.detect(&page(330, 330));
        assert_eq!(output.boxes.len(), 1);

        let bbox = output.boxes[0];
        assert!(bbox.start_x() < 20 && bbox.end_x() > 60);
        assert!(bbox.start_y() < 30 && bbox.end_y() > 45);
        assert!(bbox.end_x() <= 330 && bbox.end_y() <= 330);

        let annotated = output.annotated.unwrap();
        assert_eq!(
            *annotated.get_pixel(bbox.start_x() as u32, bbox.start_y() as u32),
            ANNOTATION_COLOR
        );
    }

    #[test]
    fn test_extreme_distances_stay_inside_the_page() {
        let model = FakeModel {
            cells: vec![
                (10, 10, [1e10, 1e10, 1e10, 1e10, 0.0]),
                (20, 40, [-1e10, 1e10, -1e10, 1e10, 0.7]),
                (70, 70, [f32::MAX, f32::MAX, 0.0, 0.0, 0.0]),
            ],
        };
        let detector = EastTextDetector::new(Box::new(model));
        let output = detector.detect(&page(330, 330));
        assert!(!output.boxes.is_empty());
        for bbox in &output.boxes {
            assert!(bbox.start_x() >= 0 && bbox.start_y() >= 0);
            assert!(bbox.end_x() <= 330 && bbox.end_y() <= 330);
        }
    }

    #[test]
    fn test_annotation_can_be_disabled() {
        let model = FakeModel {
            cells: vec![(10, 10, [10.0, 20.0, 5.0, 20.0, 0.0])],
        };
        let detector = EastTextDetector::new(Box::new(model)).with_annotation(false);
        let output = detector.detect(&page(320, 320));
        assert!(output.annotated.is_none());
        assert_eq!(output.boxes.len(), 1);
    }
}
