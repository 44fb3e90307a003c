//! Merging of nearby text boxes into larger regions.
//!
//! Kept detections are painted on a mask, grown with a wide rectangular dilation so
//! that words on the same line touch, and re-extracted as the bounding rectangles of
//! the outer contours.

use super::geometry::BoundingBox;
use super::morphology::dilate_rect;
use crate::core::errors::FormResult;
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Dilation and padding settings for region merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMerger {
    pub kernel_w: u32,
    pub kernel_h: u32,
    pub iterations: u32,
    /// Padding added on every side of a merged region, clamped to the image.
    pub padding: u32,
}

impl Default for RegionMerger {
    fn default() -> Self {
        Self {
            kernel_w: 5,
            kernel_h: 4,
            iterations: 10,
            padding: 5,
        }
    }
}

impl RegionMerger {
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Merges boxes on a `width × height` canvas.
    ///
    /// # Arguments
    ///
    /// * `boxes` - Boxes in canvas coordinates; parts outside the canvas are clipped.
    /// * `width`, `height` - Canvas size.
    ///
    /// # Returns
    ///
    /// One box per connected region, padded and clamped to the canvas. The order is
    /// unspecified.
    pub fn merge(
        &self,
        boxes: &[BoundingBox],
        width: u32,
        height: u32,
    ) -> FormResult<Vec<BoundingBox>> {
        let mut mask = GrayImage::new(width, height);
        let (last_x, last_y) = (width as i32 - 1, height as i32 - 1);
        for bbox in boxes {
            let (x1, y1) = (bbox.start_x().max(0), bbox.start_y().max(0));
            let (x2, y2) = (bbox.end_x().min(last_x), bbox.end_y().min(last_y));
            if x2 < x1 || y2 < y1 {
                continue;
            }
            let rect = Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
            draw_filled_rect_mut(&mut mask, rect, Luma([255u8]));
        }

        let grown = dilate_rect(&mask, self.kernel_w, self.kernel_h, self.iterations)?;
        let pad = self.padding as i32;
        let (canvas_w, canvas_h) = (width as i32, height as i32);

        let regions = find_contours::<i32>(&grown)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                let (w, h) = (max_x - min_x + 1, max_y - min_y + 1);

                let x = (min_x - pad).max(0);
                let y = (min_y - pad).max(0);
                let w = (canvas_w - x).min(w + 2 * pad);
                let h = (canvas_h - y).min(h + 2 * pad);
                Some(BoundingBox::from_xywh(x, y, w, h))
            })
            .collect();
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbouring_words_merge_into_one_region() {
        let boxes = [
            BoundingBox::new(50, 50, 100, 70),
            BoundingBox::new(120, 50, 170, 70),
        ];
        let regions = RegionMerger::default().merge(&boxes, 400, 200).unwrap();
        // Dilation grows each pixel by 20 horizontally, 10 up and 20 down.
        assert_eq!(regions, vec![BoundingBox::from_xywh(25, 35, 171, 61)]);
    }

    #[test]
    fn test_distant_boxes_stay_separate() {
        let boxes = [
            BoundingBox::new(20, 20, 60, 40),
            BoundingBox::new(250, 140, 300, 160),
        ];
        let mut regions = RegionMerger::default().merge(&boxes, 400, 200).unwrap();
        regions.sort_by_key(|b| b.reading_order_key());
        assert_eq!(regions.len(), 2);
        assert!(regions[0].start_x() < 20 && regions[0].end_x() > 60);
        assert!(regions[1].start_x() < 250 && regions[1].end_x() > 300);
    }

    #[test]
    fn test_padding_is_clamped_to_canvas() {
        let merger = RegionMerger::default();
        let top_left = merger
            .merge(&[BoundingBox::new(0, 0, 10, 10)], 100, 100)
            .unwrap();
        assert_eq!(top_left, vec![BoundingBox::from_xywh(0, 0, 41, 41)]);

        let bottom_right = merger
            .merge(&[BoundingBox::new(90, 90, 99, 99)], 100, 100)
            .unwrap();
        assert_eq!(bottom_right, vec![BoundingBox::new(65, 75, 100, 100)]);
    }

    #[test]
    fn test_boxes_outside_canvas_are_clipped() {
        let regions = RegionMerger::default()
            .merge(&[BoundingBox::new(-30, -30, -5, -5)], 64, 64)
            .unwrap();
        assert!(regions.is_empty());
        assert!(RegionMerger::default().merge(&[], 64, 64).unwrap().is_empty());
    }

    #[test]
    fn test_saturated_boxes_cover_the_canvas() {
        let boxes = [
            BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
            BoundingBox::new(0, 0, i32::MAX, 0),
        ];
        let regions = RegionMerger::default().merge(&boxes, 64, 48).unwrap();
        assert_eq!(regions, vec![BoundingBox::from_xywh(0, 0, 64, 48)]);
    }
}
