//! Geometric primitives for text regions.
//!
//! This module provides the axis-aligned [`BoundingBox`] used between the detector and
//! the recognizer, the scored [`Candidate`] produced by the detection decoder, and
//! greedy non-maximum suppression over candidates.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel coordinates.
///
/// The box is normalized on construction so that `start_x <= end_x` and
/// `start_y <= end_y`. Coordinates are signed because decoded detections may fall
/// slightly outside the image before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
}

impl BoundingBox {
    /// Creates a new bounding box from two corners.
    ///
    /// # Arguments
    ///
    /// * `x1`, `y1` - The first corner.
    /// * `x2`, `y2` - The opposite corner.
    ///
    /// # Returns
    ///
    /// A normalized `BoundingBox`, whatever the order of the corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            start_x: x1.min(x2),
            start_y: y1.min(y2),
            end_x: x1.max(x2),
            end_y: y1.max(y2),
        }
    }

    /// Creates a bounding box from an origin and a size.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub fn start_x(&self) -> i32 {
        self.start_x
    }

    #[inline]
    pub fn start_y(&self) -> i32 {
        self.start_y
    }

    #[inline]
    pub fn end_x(&self) -> i32 {
        self.end_x
    }

    #[inline]
    pub fn end_y(&self) -> i32 {
        self.end_y
    }

    /// Width as `end_x - start_x`, saturating at the `i32` range.
    #[inline]
    pub fn width(&self) -> i32 {
        self.end_x.saturating_sub(self.start_x)
    }

    /// Height as `end_y - start_y`, saturating at the `i32` range.
    #[inline]
    pub fn height(&self) -> i32 {
        self.end_y.saturating_sub(self.start_y)
    }

    /// Key used to sort boxes top-to-bottom, then left-to-right.
    #[inline]
    pub fn reading_order_key(&self) -> (i32, i32) {
        (self.start_y, self.start_x)
    }

    /// Area counting both corner pixels, `(w + 1) * (h + 1)`.
    pub fn inclusive_area(&self) -> i64 {
        (self.width() as i64 + 1) * (self.height() as i64 + 1)
    }

    /// Computes the overlap of two boxes counting both corner pixels.
    ///
    /// # Arguments
    ///
    /// * `other` - The other bounding box.
    ///
    /// # Returns
    ///
    /// The number of shared pixels. Returns 0 if the boxes do not touch.
    pub fn inclusive_intersection(&self, other: &BoundingBox) -> i64 {
        let xx1 = self.start_x.max(other.start_x);
        let yy1 = self.start_y.max(other.start_y);
        let xx2 = self.end_x.min(other.end_x);
        let yy2 = self.end_y.min(other.end_y);
        let w = (xx2 as i64 - xx1 as i64 + 1).max(0);
        let h = (yy2 as i64 - yy1 as i64 + 1).max(0);
        w * h
    }

    /// Computes the Intersection over Union with inclusive pixel sizes.
    ///
    /// # Returns
    ///
    /// The IoU value between 0.0 and 1.0.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.inclusive_intersection(other);
        if inter == 0 {
            return 0.0;
        }
        let union = self.inclusive_area() + other.inclusive_area() - inter;
        inter as f32 / union as f32
    }

    /// Clamps the box to an image of the given size.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let max_x = width as i32;
        let max_y = height as i32;
        let x1 = self.start_x.clamp(0, max_x);
        let y1 = self.start_y.clamp(0, max_y);
        let x2 = self.end_x.clamp(0, max_x);
        let y2 = self.end_y.clamp(0, max_y);
        (x2 > x1 && y2 > y1).then(|| BoundingBox::new(x1, y1, x2, y2))
    }

    /// Maps a box from a resized image back to the original one.
    ///
    /// Each coordinate is multiplied by its ratio and truncated toward zero.
    pub fn scale(&self, ratio_w: f32, ratio_h: f32) -> BoundingBox {
        BoundingBox::new(
            (self.start_x as f32 * ratio_w) as i32,
            (self.start_y as f32 * ratio_h) as i32,
            (self.end_x as f32 * ratio_w) as i32,
            (self.end_y as f32 * ratio_h) as i32,
        )
    }
}

/// A decoded detection before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    /// Score grid value in `[0, 1]`.
    pub confidence: f32,
}

impl Candidate {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// Denominator used when deciding whether two candidates overlap too much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionMode {
    /// Intersection over the remaining candidate's own area.
    #[default]
    Containment,
    /// Intersection over `(x2 - x1 + 1) * (y1 - y2 + 1)`.
    ///
    /// The height term is negated, so real boxes get a non-positive area and are
    /// never suppressed. Kept to reproduce historical outputs.
    LegacyParity,
    /// Symmetric intersection over union.
    Iou,
}

impl SuppressionMode {
    fn overlap(self, kept: &BoundingBox, other: &BoundingBox) -> f32 {
        let inter = kept.inclusive_intersection(other) as f32;
        match self {
            SuppressionMode::Containment => inter / other.inclusive_area() as f32,
            SuppressionMode::LegacyParity => {
                let w = other.width() as f32 + 1.0;
                let h = 1.0 - other.height() as f32;
                inter / (w * h)
            }
            SuppressionMode::Iou => kept.iou(other),
        }
    }
}

/// Greedy non-maximum suppression.
///
/// Candidates are stably sorted by ascending confidence and the highest one is popped
/// repeatedly; every remaining candidate whose overlap with it exceeds
/// `overlap_thresh` is discarded.
///
/// # Arguments
///
/// * `candidates` - Decoded detections.
/// * `overlap_thresh` - Overlap ratio above which a candidate is dropped.
/// * `mode` - How the overlap ratio is computed.
///
/// # Returns
///
/// The surviving boxes in order of decreasing confidence.
pub fn non_max_suppression(
    candidates: &[Candidate],
    overlap_thresh: f32,
    mode: SuppressionMode,
) -> Vec<BoundingBox> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[a]
            .confidence
            .total_cmp(&candidates[b].confidence)
    });

    let mut kept = Vec::new();
    while let Some(best) = order.pop() {
        let best_box = candidates[best].bbox;
        kept.push(best_box);
        order.retain(|&idx| mode.overlap(&best_box, &candidates[idx].bbox) <= overlap_thresh);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let bbox = BoundingBox::new(100, 80, 10, 20);
        assert_eq!(bbox.start_x(), 10);
        assert_eq!(bbox.start_y(), 20);
        assert_eq!(bbox.end_x(), 100);
        assert_eq!(bbox.end_y(), 80);
        assert_eq!(bbox.width(), 90);
        assert_eq!(bbox.height(), 60);
    }

    #[test]
    fn test_inclusive_intersection() {
        let a = BoundingBox::new(0, 0, 9, 9);
        let b = BoundingBox::new(5, 5, 14, 14);
        assert_eq!(a.inclusive_area(), 100);
        assert_eq!(a.inclusive_intersection(&b), 25);
        assert_eq!(a.inclusive_intersection(&BoundingBox::new(20, 20, 30, 30)), 0);
        // Touching edges share a single row of pixels.
        assert_eq!(a.inclusive_intersection(&BoundingBox::new(9, 0, 12, 9)), 10);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0, 0, 9, 9);
        let b = BoundingBox::new(5, 5, 14, 14);
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_and_scale() {
        let bbox = BoundingBox::new(-5, -5, 50, 50);
        assert_eq!(bbox.clamp_to(40, 30), Some(BoundingBox::new(0, 0, 40, 30)));
        assert_eq!(BoundingBox::new(50, 50, 60, 60).clamp_to(40, 30), None);

        let scaled = BoundingBox::new(10, 10, 21, 21).scale(1.5, 0.5);
        assert_eq!(scaled, BoundingBox::new(15, 5, 31, 10));
    }

    #[test]
    fn test_saturated_coordinates_do_not_overflow() {
        let huge = BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(huge.width(), i32::MAX);
        assert_eq!(huge.height(), i32::MAX);
        assert!(huge.inclusive_area() > 0);

        let candidates = [
            Candidate::new(huge, 0.9),
            Candidate::new(BoundingBox::new(0, 0, i32::MAX, 10), 0.8),
            Candidate::new(BoundingBox::new(5, 5, 15, 15), 0.7),
        ];
        for mode in [
            SuppressionMode::Containment,
            SuppressionMode::LegacyParity,
            SuppressionMode::Iou,
        ] {
            let kept = non_max_suppression(&candidates, 0.3, mode);
            assert!(!kept.is_empty() && kept.len() <= candidates.len());
            assert_eq!(kept[0], huge);
        }
    }

    #[test]
    fn test_nms_drops_contained_lower_scores() {
        let candidates = vec![
            Candidate::new(BoundingBox::new(0, 0, 99, 99), 0.9),
            Candidate::new(BoundingBox::new(10, 10, 59, 59), 0.8),
            Candidate::new(BoundingBox::new(200, 200, 299, 299), 0.7),
        ];
        let kept = non_max_suppression(&candidates, 0.3, SuppressionMode::Containment);
        assert_eq!(
            kept,
            vec![
                BoundingBox::new(0, 0, 99, 99),
                BoundingBox::new(200, 200, 299, 299)
            ]
        );
    }

    #[test]
    fn test_nms_keeps_box_with_highest_confidence() {
        let candidates = vec![
            Candidate::new(BoundingBox::new(0, 0, 99, 99), 0.6),
            Candidate::new(BoundingBox::new(2, 2, 101, 101), 0.95),
        ];
        let kept = non_max_suppression(&candidates, 0.3, SuppressionMode::Containment);
        assert_eq!(kept, vec![BoundingBox::new(2, 2, 101, 101)]);
    }

    #[test]
    fn test_nms_output_never_exceeds_input() {
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| Candidate::new(BoundingBox::from_xywh(i * 3, 0, 30, 10), i as f32 / 20.0))
            .collect();
        for mode in [
            SuppressionMode::Containment,
            SuppressionMode::LegacyParity,
            SuppressionMode::Iou,
        ] {
            let kept = non_max_suppression(&candidates, 0.3, mode);
            assert!(!kept.is_empty());
            assert!(kept.len() <= candidates.len());
        }
        assert!(non_max_suppression(&[], 0.3, SuppressionMode::Containment).is_empty());
    }

    #[test]
    fn test_legacy_parity_does_not_suppress() {
        let candidates = vec![
            Candidate::new(BoundingBox::new(0, 0, 99, 99), 0.9),
            Candidate::new(BoundingBox::new(10, 10, 59, 59), 0.8),
        ];
        let kept = non_max_suppression(&candidates, 0.3, SuppressionMode::LegacyParity);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_iou_mode_keeps_small_box_inside_large_one() {
        let candidates = vec![
            Candidate::new(BoundingBox::new(0, 0, 99, 99), 0.9),
            Candidate::new(BoundingBox::new(10, 10, 29, 29), 0.8),
        ];
        let kept = non_max_suppression(&candidates, 0.3, SuppressionMode::Iou);
        assert_eq!(kept.len(), 2);
        let kept = non_max_suppression(&candidates, 0.3, SuppressionMode::Containment);
        assert_eq!(kept.len(), 1);
    }
}
