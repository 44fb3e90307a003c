//! Bounding box based image cropping utilities.

use crate::processors::BoundingBox;
use image::{DynamicImage, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Bounding box based image cropping utilities.
pub struct BBoxCrop;

impl BBoxCrop {
    /// Crops an image to a bounding box.
    ///
    /// The box is clamped to the image first, so regions that hang over an edge are
    /// cut at the border.
    ///
    /// # Arguments
    ///
    /// * `image` - The source image
    /// * `bbox` - The region to cut out
    ///
    /// # Returns
    ///
    /// The cropped image, or `None` when the box does not overlap the image.
    pub fn crop_bounding_box(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
        let clamped = bbox.clamp_to(image.width(), image.height())?;
        Some(image.crop_imm(
            clamped.start_x() as u32,
            clamped.start_y() as u32,
            clamped.width() as u32,
            clamped.height() as u32,
        ))
    }

    /// Draws a rectangle outline of the given thickness around each box.
    ///
    /// Thickness grows inward from the box border.
    pub fn outline_boxes(
        image: &mut RgbImage,
        bboxes: &[BoundingBox],
        color: image::Rgb<u8>,
        thickness: u32,
    ) {
        for bbox in bboxes {
            for t in 0..thickness as i32 {
                let w = bbox.width() + 1 - 2 * t;
                let h = bbox.height() + 1 - 2 * t;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect =
                    Rect::at(bbox.start_x() + t, bbox.start_y() + t).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(image, rect, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crop_clamps_to_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        let crop = BBoxCrop::crop_bounding_box(&image, &BoundingBox::new(80, 40, 130, 90)).unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 10));

        assert!(BBoxCrop::crop_bounding_box(&image, &BoundingBox::new(200, 0, 250, 10)).is_none());
    }

    #[test]
    fn test_outline_boxes_draws_border_only() {
        let mut image = RgbImage::new(20, 20);
        let green = Rgb([0, 255, 0]);
        BBoxCrop::outline_boxes(&mut image, &[BoundingBox::new(2, 2, 12, 12)], green, 2);
        assert_eq!(*image.get_pixel(2, 2), green);
        assert_eq!(*image.get_pixel(3, 7), green);
        assert_eq!(*image.get_pixel(12, 12), green);
        assert_eq!(*image.get_pixel(7, 7), Rgb([0, 0, 0]));
    }
}
