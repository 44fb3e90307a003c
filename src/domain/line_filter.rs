//! Ruled line removal.
//!
//! Form scans are full of table borders and underlines that the detector would
//! otherwise pick up as text. The filter isolates long horizontal and vertical strokes
//! with morphological opening and paints over them with inpainting.

use crate::core::config::LineFilterConfig;
use crate::core::errors::{FormError, FormResult, ProcessingStage};
use crate::processors::inpaint::inpaint_telea;
use crate::processors::morphology::{dilate_rect, erode_rect, saturating_add, threshold_otsu_inv};
use image::{DynamicImage, GrayImage};

/// Result of a filter: the cleaned page, or `None` when the filter failed.
pub type FilterOutcome = Option<GrayImage>;

/// A page-level preprocessing step run before text detection.
pub trait ImageFilter: Send + Sync {
    /// Produces a cleaned single-channel page. Failures are logged and yield `None`.
    fn apply(&self, image: &DynamicImage) -> FilterOutcome;
}

const INPAINT_RADIUS: u32 = 3;

/// Removes ruled lines from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinesFilter {
    vertical_scale: u32,
    horizontal_scale: u32,
    dilation_iter: u32,
}

impl Default for LinesFilter {
    fn default() -> Self {
        Self::from_config(&LineFilterConfig::default())
    }
}

impl LinesFilter {
    /// Creates a filter with explicit scales.
    ///
    /// # Arguments
    ///
    /// * `vertical_scale` - Page height divided by this gives the vertical kernel length.
    /// * `horizontal_scale` - Page width divided by this gives the horizontal kernel length.
    /// * `dilation_iter` - Dilation passes after erosion.
    pub fn new(vertical_scale: u32, horizontal_scale: u32, dilation_iter: u32) -> FormResult<Self> {
        if vertical_scale == 0 || horizontal_scale == 0 || dilation_iter == 0 {
            return Err(FormError::config_error(format!(
                "line filter parameters must be positive, got vertical_scale={vertical_scale}, \
                 horizontal_scale={horizontal_scale}, dilation_iter={dilation_iter}"
            )));
        }
        Ok(Self {
            vertical_scale,
            horizontal_scale,
            dilation_iter,
        })
    }

    pub fn from_config(config: &LineFilterConfig) -> Self {
        Self {
            vertical_scale: config.vertical_scale.max(1),
            horizontal_scale: config.horizontal_scale.max(1),
            dilation_iter: config.dilation_iter.max(1),
        }
    }

    /// Runs the filter and reports failures as errors.
    pub fn remove_lines(&self, image: &DynamicImage) -> FormResult<GrayImage> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        let bw = threshold_otsu_inv(&gray);

        let vertical_len = height / self.vertical_scale;
        let horizontal_len = width / self.horizontal_scale;
        if vertical_len == 0 || horizontal_len == 0 {
            return Err(FormError::stage_error(
                ProcessingStage::LineRemoval,
                format!(
                    "image {width}x{height} is too small for line kernels \
                     ({horizontal_len}x1 and 1x{vertical_len})"
                ),
            ));
        }

        let vertical = erode_rect(&bw, 1, vertical_len)?;
        let vertical = dilate_rect(&vertical, 1, vertical_len, self.dilation_iter)?;
        let horizontal = erode_rect(&bw, horizontal_len, 1)?;
        let horizontal = dilate_rect(&horizontal, horizontal_len, 1, self.dilation_iter)?;

        let lines = saturating_add(&vertical, &horizontal)?;
        let mask = dilate_rect(&lines, 3, 3, 1)?;

        let mut page = bw;
        image::imageops::invert(&mut page);
        inpaint_telea(&page, &mask, INPAINT_RADIUS)
    }
}

impl ImageFilter for LinesFilter {
    fn apply(&self, image: &DynamicImage) -> FilterOutcome {
        match self.remove_lines(image) {
            Ok(cleaned) => Some(cleaned),
            Err(err) => {
                tracing::warn!(
                    stage = %ProcessingStage::LineRemoval,
                    error = %err,
                    width = image.width(),
                    height = image.height(),
                    "line removal failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ruled_page() -> GrayImage {
        let mut page = GrayImage::from_pixel(200, 200, Luma([255]));
        // A full-width rule two pixels thick.
        for x in 0..200 {
            page.put_pixel(x, 100, Luma([0]));
            page.put_pixel(x, 101, Luma([0]));
        }
        // A small glyph-sized blob away from the rule.
        for y in 40..44 {
            for x in 40..44 {
                page.put_pixel(x, y, Luma([0]));
            }
        }
        page
    }

    #[test]
    fn test_removes_rule_and_keeps_glyph() {
        let filter = LinesFilter::default();
        let cleaned = filter
            .apply(&DynamicImage::ImageLuma8(ruled_page()))
            .unwrap();

        assert_eq!(cleaned.dimensions(), (200, 200));
        for x in [0, 60, 150, 199] {
            assert!(cleaned.get_pixel(x, 100)[0] > 200, "rule left at x={x}");
        }
        assert_eq!(cleaned.get_pixel(41, 41)[0], 0);
        assert_eq!(cleaned.get_pixel(10, 10)[0], 255);
    }

    #[test]
    fn test_blank_page_stays_blank() {
        let page = GrayImage::from_pixel(100, 100, Luma([255]));
        let cleaned = LinesFilter::default()
            .apply(&DynamicImage::ImageLuma8(page))
            .unwrap();
        assert!(cleaned.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_tiny_image_fails() {
        let page = GrayImage::from_pixel(10, 10, Luma([255]));
        assert!(LinesFilter::default()
            .apply(&DynamicImage::ImageLuma8(page))
            .is_none());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(LinesFilter::new(0, 25, 1).is_err());
        assert!(LinesFilter::new(25, 25, 0).is_err());
        assert!(LinesFilter::new(25, 25, 1).is_ok());
    }
}
