//! Binary morphology with rectangular structuring elements.
//!
//! Images are treated as binary masks: any non-zero pixel is foreground and results
//! are written as 0 or 255. A `kw × kh` rectangle is applied as a horizontal pass of
//! width `kw` followed by a vertical pass of height `kh`, with the anchor at
//! `(kw / 2, kh / 2)`. Outside the image, erosion sees foreground and dilation sees
//! background, so neither operation invents or loses content at the borders.

use crate::core::errors::{FormError, FormResult, ProcessingStage};
use image::{GrayImage, Luma};

const FOREGROUND: u8 = 255;
const BACKGROUND: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MorphOp {
    Erode,
    Dilate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Erodes a binary mask with a `kernel_w × kernel_h` rectangle.
pub fn erode_rect(image: &GrayImage, kernel_w: u32, kernel_h: u32) -> FormResult<GrayImage> {
    check_kernel(kernel_w, kernel_h)?;
    let horizontal = window_pass(image, kernel_w, Axis::Horizontal, MorphOp::Erode);
    Ok(window_pass(&horizontal, kernel_h, Axis::Vertical, MorphOp::Erode))
}

/// Dilates a binary mask with a `kernel_w × kernel_h` rectangle, `iterations` times.
///
/// Zero iterations returns a binarized copy of the input.
pub fn dilate_rect(
    image: &GrayImage,
    kernel_w: u32,
    kernel_h: u32,
    iterations: u32,
) -> FormResult<GrayImage> {
    check_kernel(kernel_w, kernel_h)?;
    let mut current = binarize(image);
    for _ in 0..iterations {
        let horizontal = window_pass(&current, kernel_w, Axis::Horizontal, MorphOp::Dilate);
        current = window_pass(&horizontal, kernel_h, Axis::Vertical, MorphOp::Dilate);
    }
    Ok(current)
}

/// Inverse binary threshold at the Otsu level.
///
/// Pixels darker than or equal to the level become foreground (255), brighter ones
/// background (0). An image with a single intensity has no ink and maps to all
/// background.
pub fn threshold_otsu_inv(gray: &GrayImage) -> GrayImage {
    let mut pixels = gray.pixels();
    let uniform = match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    };
    if uniform {
        return GrayImage::new(gray.width(), gray.height());
    }

    let level = imageproc::contrast::otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Pixel-wise saturating sum of two images of the same size.
pub fn saturating_add(a: &GrayImage, b: &GrayImage) -> FormResult<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return Err(FormError::stage_error(
            ProcessingStage::LineRemoval,
            format!(
                "cannot add images of different sizes {:?} and {:?}",
                a.dimensions(),
                b.dimensions()
            ),
        ));
    }
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        dst[0] = dst[0].saturating_add(src[0]);
    }
    Ok(out)
}

fn check_kernel(kernel_w: u32, kernel_h: u32) -> FormResult<()> {
    if kernel_w == 0 || kernel_h == 0 {
        return Err(FormError::stage_error(
            ProcessingStage::Generic,
            format!("structuring element must not be empty, got {kernel_w}x{kernel_h}"),
        ));
    }
    Ok(())
}

fn binarize(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > 0 { FOREGROUND } else { BACKGROUND };
    }
    out
}

/// One-dimensional sliding window over rows or columns using prefix counts.
fn window_pass(image: &GrayImage, kernel: u32, axis: Axis, op: MorphOp) -> GrayImage {
    let (width, height) = image.dimensions();
    let (lines, len) = match axis {
        Axis::Horizontal => (height, width),
        Axis::Vertical => (width, height),
    };
    let at = |line: u32, i: u32| match axis {
        Axis::Horizontal => (i, line),
        Axis::Vertical => (line, i),
    };

    let kernel = kernel as i64;
    let anchor = kernel / 2;
    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0i64; len as usize + 1];

    for line in 0..lines {
        for i in 0..len {
            let (x, y) = at(line, i);
            let fg = (image.get_pixel(x, y)[0] > 0) as i64;
            prefix[i as usize + 1] = prefix[i as usize] + fg;
        }

        for i in 0..len {
            let lo = i as i64 - anchor;
            let hi = lo + kernel - 1;
            let lo_c = lo.max(0);
            let hi_c = hi.min(len as i64 - 1);
            let (inside, covered) = if lo_c <= hi_c {
                (
                    prefix[hi_c as usize + 1] - prefix[lo_c as usize],
                    hi_c - lo_c + 1,
                )
            } else {
                (0, 0)
            };
            let set = match op {
                MorphOp::Erode => inside + (kernel - covered) == kernel,
                MorphOp::Dilate => inside > 0,
            };
            if set {
                let (x, y) = at(line, i);
                out.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    out
}
