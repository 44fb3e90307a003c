//! EAST text detector pre- and post-processing.
//!
//! The detector works on images whose sides are multiples of 32. Its outputs are a
//! score grid and a five-channel geometry grid (distances to the top, right, bottom and
//! left edges plus a rotation angle), both at a quarter of the input resolution.

use super::geometry::{BoundingBox, Candidate};
use crate::core::errors::{FormError, FormResult};
use image::RgbImage;
use ndarray::{Array2, Array3, Array4, ArrayD, Axis, Ix4};
use serde::{Deserialize, Serialize};

/// Per-channel mean subtracted from the RGB input.
pub const EAST_MEAN: [f32; 3] = [123.68, 116.78, 103.94];
/// Input sides are rounded down to a multiple of this.
pub const EAST_ALIGN: u32 = 32;
/// Pixels per output grid cell.
pub const EAST_STRIDE: f32 = 4.0;

/// Memory layout of the model input and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, channels, height, width]`
    #[default]
    Nchw,
    /// `[batch, height, width, channels]`, as produced by TensorFlow exports.
    Nhwc,
}

/// Target size for the model and the ratios to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub ratio_w: f32,
    pub ratio_h: f32,
}

impl ResizePlan {
    /// Rounds both sides down to a multiple of 32.
    ///
    /// # Errors
    ///
    /// Fails when either side of the image is smaller than 32 pixels.
    pub fn for_size(width: u32, height: u32) -> FormResult<Self> {
        let new_w = width / EAST_ALIGN * EAST_ALIGN;
        let new_h = height / EAST_ALIGN * EAST_ALIGN;
        if new_w == 0 || new_h == 0 {
            return Err(FormError::invalid_input(format!(
                "image {width}x{height} is too small for text detection (minimum {EAST_ALIGN}x{EAST_ALIGN})"
            )));
        }
        Ok(Self {
            width: new_w,
            height: new_h,
            ratio_w: width as f32 / new_w as f32,
            ratio_h: height as f32 / new_h as f32,
        })
    }
}

/// Builds the mean-subtracted input tensor with a batch of one.
pub fn build_blob(image: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut blob = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
    };
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = pixel[c] as f32 - EAST_MEAN[c];
            match layout {
                TensorLayout::Nchw => blob[[0, c, y, x]] = value,
                TensorLayout::Nhwc => blob[[0, y, x, c]] = value,
            }
        }
    }
    blob
}

/// Decoded model outputs in channel-first form.
#[derive(Debug, Clone)]
pub struct EastOutput {
    /// `[rows, cols]`
    pub scores: Array2<f32>,
    /// `[5, rows, cols]`: top, right, bottom, left, angle.
    pub geometry: Array3<f32>,
}

impl EastOutput {
    /// Validates and normalizes raw model outputs.
    pub fn from_raw(
        scores: ArrayD<f32>,
        geometry: ArrayD<f32>,
        layout: TensorLayout,
    ) -> FormResult<Self> {
        let scores = scores.into_dimensionality::<Ix4>()?;
        let geometry = geometry.into_dimensionality::<Ix4>()?;
        let (scores, geometry) = match layout {
            TensorLayout::Nchw => (scores, geometry),
            TensorLayout::Nhwc => (
                scores.permuted_axes([0, 3, 1, 2]),
                geometry.permuted_axes([0, 3, 1, 2]),
            ),
        };

        let s = scores.shape();
        let g = geometry.shape();
        if s[0] != 1 || s[1] != 1 {
            return Err(FormError::tensor_shape_error(
                "score grid",
                &[1, 1, g[2], g[3]],
                s,
            ));
        }
        if g[0] != 1 || g[1] != 5 || g[2] != s[2] || g[3] != s[3] {
            return Err(FormError::tensor_shape_error(
                "geometry grid",
                &[1, 5, s[2], s[3]],
                g,
            ));
        }

        Ok(Self {
            scores: scores.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_owned(),
            geometry: geometry.index_axis(Axis(0), 0).to_owned(),
        })
    }
}

/// Turns every grid cell scoring at least `min_confidence` into a candidate box.
///
/// Coordinates are in the resized image, truncated toward zero and clamped to the
/// `cols * 4` by `rows * 4` canvas the grid covers.
pub fn decode_candidates(output: &EastOutput, min_confidence: f32) -> Vec<Candidate> {
    let (rows, cols) = output.scores.dim();
    let geo = &output.geometry;
    let canvas_w = cols as f32 * EAST_STRIDE;
    let canvas_h = rows as f32 * EAST_STRIDE;
    let mut candidates = Vec::new();

    for y in 0..rows {
        for x in 0..cols {
            let score = output.scores[[y, x]];
            if score < min_confidence {
                continue;
            }

            let offset_x = x as f32 * EAST_STRIDE;
            let offset_y = y as f32 * EAST_STRIDE;
            let (d_top, d_right, d_bottom, d_left) =
                (geo[[0, y, x]], geo[[1, y, x]], geo[[2, y, x]], geo[[3, y, x]]);
            let angle = geo[[4, y, x]];
            let (sin, cos) = angle.sin_cos();

            let h = d_top + d_bottom;
            let w = d_right + d_left;
            let end_x = (offset_x + cos * d_right + sin * d_bottom).clamp(0.0, canvas_w) as i32;
            let end_y = (offset_y - sin * d_right + cos * d_bottom).clamp(0.0, canvas_h) as i32;
            let start_x = (end_x as f32 - w).clamp(0.0, canvas_w) as i32;
            let start_y = (end_y as f32 - h).clamp(0.0, canvas_h) as i32;

            candidates.push(Candidate::new(
                BoundingBox::new(start_x, start_y, end_x, end_y),
                score,
            ));
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::IxDyn;

    #[test]
    fn test_resize_plan() {
        let plan = ResizePlan::for_size(650, 333).unwrap();
        assert_eq!((plan.width, plan.height), (640, 320));
        assert!((plan.ratio_w - 650.0 / 640.0).abs() < 1e-6);
        assert!((plan.ratio_h - 333.0 / 320.0).abs() < 1e-6);
        assert!(ResizePlan::for_size(31, 500).is_err());
        assert!(ResizePlan::for_size(500, 20).is_err());
    }

    #[test]
    fn test_build_blob_subtracts_mean_in_both_layouts() {
        let image = RgbImage::from_pixel(2, 1, Rgb([200, 100, 50]));
        let nchw = build_blob(&image, TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert!((nchw[[0, 0, 0, 1]] - (200.0 - 123.68)).abs() < 1e-4);
        assert!((nchw[[0, 2, 0, 0]] - (50.0 - 103.94)).abs() < 1e-4);

        let nhwc = build_blob(&image, TensorLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[1, 1, 2, 3]);
        assert!((nhwc[[0, 0, 1, 1]] - (100.0 - 116.78)).abs() < 1e-4);
    }

    fn single_cell_output(score: f32, geometry: [f32; 5]) -> EastOutput {
        // 8x8 grid covering a 32x32 canvas; only cell (1, 1) scores.
        let mut grid = vec![0.0f32; 64];
        grid[9] = score;
        let scores = ArrayD::from_shape_vec(IxDyn(&[1, 1, 8, 8]), grid).unwrap();
        let mut geo = vec![0.0f32; 5 * 64];
        for (c, v) in geometry.iter().enumerate() {
            geo[c * 64 + 9] = *v;
        }
        let geometry = ArrayD::from_shape_vec(IxDyn(&[1, 5, 8, 8]), geo).unwrap();
        EastOutput::from_raw(scores, geometry, TensorLayout::Nchw).unwrap()
    }

    #[test]
    fn test_decode_axis_aligned_cell() {
        // Cell (1, 1) has offset (4, 4).
        let output = single_cell_output(0.9, [2.0, 10.0, 3.0, 5.0, 0.0]);
        let candidates = decode_candidates(&output, 0.5);
        assert_eq!(candidates.len(), 1);
        // end = (4 + 10, 4 + 3), start = end - (15, 5) with x clamped at 0
        assert_eq!(candidates[0].bbox, BoundingBox::new(0, 2, 14, 7));
        assert_eq!(candidates[0].confidence, 0.9);
    }

    #[test]
    fn test_decode_rotated_cell_uses_angle() {
        let angle = std::f32::consts::FRAC_PI_2;
        let output = single_cell_output(0.8, [0.0, 10.0, 0.5, 0.0, angle]);
        let candidates = decode_candidates(&output, 0.5);
        // cos ~ 0, sin = 1: end_x = trunc(4.5) = 4, end_y = 4 - 10 clamps to 0
        assert_eq!(candidates[0].bbox, BoundingBox::new(0, 0, 4, 0));
    }

    #[test]
    fn test_decode_clamps_extreme_distances_to_canvas() {
        for geometry in [
            [1e10, 1e10, 1e10, 1e10, 0.0],
            [-1e10, -1e10, -1e10, -1e10, 0.0],
            [1e10, -1e10, 1e10, -1e10, 1.0],
            [f32::INFINITY, f32::NAN, 0.0, f32::NEG_INFINITY, 0.0],
        ] {
            let candidates = decode_candidates(&single_cell_output(0.9, geometry), 0.5);
            assert_eq!(candidates.len(), 1);
            let bbox = candidates[0].bbox;
            for v in [bbox.start_x(), bbox.end_x(), bbox.start_y(), bbox.end_y()] {
                assert!((0..=32).contains(&v), "{bbox:?} leaves the canvas");
            }
            assert!(bbox.inclusive_area() <= 33 * 33);
        }
    }

    #[test]
    fn test_decode_respects_threshold() {
        let output = single_cell_output(0.4, [1.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(decode_candidates(&output, 0.5).is_empty());
        assert_eq!(decode_candidates(&output, 0.4).len(), 1);
    }

    #[test]
    fn test_from_raw_nhwc_matches_nchw() {
        // 1x1 grid, five geometry channels.
        let scores = ArrayD::from_shape_vec(IxDyn(&[1, 1, 1, 1]), vec![0.7]).unwrap();
        let geometry =
            ArrayD::from_shape_vec(IxDyn(&[1, 1, 1, 5]), vec![1.0, 2.0, 3.0, 4.0, 0.5]).unwrap();
        let output = EastOutput::from_raw(scores, geometry, TensorLayout::Nhwc).unwrap();
        assert_eq!(output.scores.dim(), (1, 1));
        assert_eq!(output.geometry.dim(), (5, 1, 1));
        assert_eq!(output.geometry[[3, 0, 0]], 4.0);
        assert_eq!(output.geometry[[4, 0, 0]], 0.5);
    }

    #[test]
    fn test_from_raw_rejects_bad_geometry() {
        let scores = ArrayD::from_shape_vec(IxDyn(&[1, 1, 2, 2]), vec![0.0; 4]).unwrap();
        let geometry = ArrayD::from_shape_vec(IxDyn(&[1, 4, 2, 2]), vec![0.0; 16]).unwrap();
        assert!(EastOutput::from_raw(scores, geometry, TensorLayout::Nchw).is_err());
    }
}
