//! Fast-marching inpainting (Telea) for single-channel images.
//!
//! Masked pixels are filled in order of their distance to the mask boundary. Each
//! pixel takes a weighted average of the known pixels within `radius`, weighted by
//! direction (alignment with the distance gradient), geometric distance and level-set
//! distance, plus a small first-order correction from the image gradient.

use crate::core::errors::{FormError, FormResult, ProcessingStage};
use image::{GrayImage, Luma};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const UNREACHED: f32 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

#[derive(Debug, Clone, Copy)]
struct FrontPixel {
    t: f32,
    x: u32,
    y: u32,
}

impl PartialEq for FrontPixel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontPixel {}

impl PartialOrd for FrontPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontPixel {
    // Reversed so the max-heap pops the smallest arrival time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| (other.y, other.x).cmp(&(self.y, self.x)))
    }
}

struct Field {
    width: u32,
    height: u32,
    flags: Vec<Flag>,
    times: Vec<f32>,
    values: Vec<f32>,
}

impl Field {
    fn idx(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    /// Flag at signed coordinates; outside the image counts as unreached.
    fn flag(&self, x: i64, y: i64) -> Flag {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            Flag::Inside
        } else {
            self.flags[self.idx(x as u32, y as u32)]
        }
    }

    fn time(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            UNREACHED
        } else {
            self.times[self.idx(x as u32, y as u32)]
        }
    }

    fn value(&self, x: i64, y: i64) -> f32 {
        self.values[self.idx(x as u32, y as u32)]
    }

    /// Eikonal update from two orthogonal neighbours.
    fn solve(&self, (x1, y1): (i64, i64), (x2, y2): (i64, i64)) -> f32 {
        let a = self.time(x1, y1);
        let b = self.time(x2, y2);
        let a_known = self.flag(x1, y1) != Flag::Inside;
        let b_known = self.flag(x2, y2) != Flag::Inside;
        match (a_known, b_known) {
            (true, true) => {
                if (a - b).abs() >= 1.0 {
                    1.0 + a.min(b)
                } else {
                    let r = (2.0 - (a - b) * (a - b)).sqrt();
                    (a + b + r) * 0.5
                }
            }
            (true, false) => 1.0 + a,
            (false, true) => 1.0 + b,
            (false, false) => 1.0 + a.min(b),
        }
    }

    fn arrival_time(&self, x: i64, y: i64) -> f32 {
        [
            self.solve((x, y - 1), (x - 1, y)),
            self.solve((x, y + 1), (x - 1, y)),
            self.solve((x, y - 1), (x + 1, y)),
            self.solve((x, y + 1), (x + 1, y)),
        ]
        .into_iter()
        .fold(UNREACHED, f32::min)
    }

    /// Central difference where both sides are known, one-sided otherwise.
    fn gradient(&self, x: i64, y: i64, sample: impl Fn(i64, i64) -> f32) -> (f32, f32) {
        let axis = |(px, py): (i64, i64), (nx, ny): (i64, i64)| {
            let prev_ok = self.flag(px, py) != Flag::Inside;
            let next_ok = self.flag(nx, ny) != Flag::Inside;
            match (prev_ok, next_ok) {
                (true, true) => (sample(nx, ny) - sample(px, py)) * 0.5,
                (false, true) => sample(nx, ny) - sample(x, y),
                (true, false) => sample(x, y) - sample(px, py),
                (false, false) => 0.0,
            }
        };
        (
            axis((x - 1, y), (x + 1, y)),
            axis((x, y - 1), (x, y + 1)),
        )
    }

    fn inpaint_pixel(&self, x: i64, y: i64, radius: i64) -> Option<f32> {
        let t_here = self.time(x, y);
        let grad_t = self.gradient(x, y, |px, py| self.time(px, py));

        let mut weighted = 0.0f32;
        let mut jx = 0.0f32;
        let mut jy = 0.0f32;
        let mut total = 0.0f32;

        for ny in (y - radius).max(0)..=(y + radius).min(self.height as i64 - 1) {
            for nx in (x - radius).max(0)..=(x + radius).min(self.width as i64 - 1) {
                if self.flag(nx, ny) == Flag::Inside {
                    continue;
                }
                let rx = (x - nx) as f32;
                let ry = (y - ny) as f32;
                let len2 = rx * rx + ry * ry;
                if len2 == 0.0 || len2 > (radius * radius) as f32 {
                    continue;
                }

                let mut dir = rx * grad_t.0 + ry * grad_t.1;
                if dir.abs() <= 0.01 {
                    dir = 1.0e-6;
                }
                let dst = 1.0 / (len2 * len2.sqrt());
                let lev = 1.0 / (1.0 + (self.time(nx, ny) - t_here).abs());
                let w = (dir * dst * lev).abs();

                let grad_i = self.gradient(nx, ny, |px, py| self.value(px, py));
                weighted += w * self.value(nx, ny);
                jx -= w * grad_i.0 * rx;
                jy -= w * grad_i.1 * ry;
                total += w;
            }
        }

        (total > 0.0).then(|| {
            weighted / total + (jx + jy) / ((jx * jx + jy * jy).sqrt() + 1.0e-20)
        })
    }
}

/// Fills the pixels selected by `mask` (non-zero) from their surroundings.
///
/// # Arguments
///
/// * `image` - The image to restore.
/// * `mask` - Same-sized mask; non-zero pixels are replaced.
/// * `radius` - Neighbourhood radius considered for each filled pixel.
///
/// # Returns
///
/// A new image; pixels outside the mask are unchanged.
pub fn inpaint_telea(image: &GrayImage, mask: &GrayImage, radius: u32) -> FormResult<GrayImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(FormError::stage_error(
            ProcessingStage::LineRemoval,
            format!(
                "inpaint mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                image.dimensions()
            ),
        ));
    }

    let (width, height) = image.dimensions();
    let len = (width as usize) * (height as usize);
    let mut field = Field {
        width,
        height,
        flags: vec![Flag::Known; len],
        times: vec![0.0; len],
        values: image.pixels().map(|p| p[0] as f32).collect(),
    };

    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] > 0 {
            let i = field.idx(x, y);
            field.flags[i] = Flag::Inside;
            field.times[i] = UNREACHED;
        }
    }

    // The initial front is every known pixel 4-adjacent to the mask.
    let mut heap = BinaryHeap::new();
    for y in 0..height {
        for x in 0..width {
            let i = field.idx(x, y);
            if field.flags[i] != Flag::Known {
                continue;
            }
            let (xi, yi) = (x as i64, y as i64);
            let touches_mask = [(xi - 1, yi), (xi + 1, yi), (xi, yi - 1), (xi, yi + 1)]
                .into_iter()
                .any(|(nx, ny)| {
                    nx >= 0
                        && ny >= 0
                        && nx < width as i64
                        && ny < height as i64
                        && field.flag(nx, ny) == Flag::Inside
                });
            if touches_mask {
                field.flags[i] = Flag::Band;
                heap.push(FrontPixel { t: 0.0, x, y });
            }
        }
    }

    let radius = radius.max(1) as i64;
    while let Some(FrontPixel { x, y, .. }) = heap.pop() {
        let i = field.idx(x, y);
        field.flags[i] = Flag::Known;

        let (xi, yi) = (x as i64, y as i64);
        for (nx, ny) in [(xi - 1, yi), (xi, yi - 1), (xi + 1, yi), (xi, yi + 1)] {
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            if field.flag(nx, ny) != Flag::Inside {
                continue;
            }
            let ni = field.idx(nx as u32, ny as u32);
            let t = field.arrival_time(nx, ny);
            field.times[ni] = t;
            if let Some(value) = field.inpaint_pixel(nx, ny, radius) {
                field.values[ni] = value;
            }
            field.flags[ni] = Flag::Band;
            heap.push(FrontPixel {
                t,
                x: nx as u32,
                y: ny as u32,
            });
        }
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let v = field.values[field.idx(x, y)];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_stroke_from_uniform_surroundings() {
        let mut image = GrayImage::from_pixel(20, 20, Luma([255]));
        let mut mask = GrayImage::new(20, 20);
        for y in 2..18 {
            image.put_pixel(10, y, Luma([0]));
            mask.put_pixel(10, y, Luma([255]));
        }

        let out = inpaint_telea(&image, &mask, 3).unwrap();
        for y in 2..18 {
            assert!(out.get_pixel(10, y)[0] >= 250, "pixel at y={y} not filled");
        }
    }

    #[test]
    fn test_unmasked_pixels_unchanged() {
        let image = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let mut mask = GrayImage::new(16, 16);
        mask.put_pixel(8, 8, Luma([255]));

        let out = inpaint_telea(&image, &mask, 3).unwrap();
        for (x, y, p) in out.enumerate_pixels() {
            if (x, y) != (8, 8) {
                assert_eq!(p[0], image.get_pixel(x, y)[0]);
            }
        }
    }

    #[test]
    fn test_fill_stays_within_neighbour_range() {
        let image =
            GrayImage::from_fn(12, 12, |x, _| if x < 6 { Luma([100]) } else { Luma([200]) });
        let mut mask = GrayImage::new(12, 12);
        for y in 4..8 {
            for x in 4..8 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let out = inpaint_telea(&image, &mask, 3).unwrap();
        for y in 4..8 {
            for x in 4..8 {
                let v = out.get_pixel(x, y)[0];
                assert!((95..=205).contains(&v), "value {v} out of range at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_empty_mask_is_identity() {
        let image = GrayImage::from_fn(5, 5, |x, y| Luma([(x * 10 + y) as u8]));
        let out = inpaint_telea(&image, &GrayImage::new(5, 5), 3).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let image = GrayImage::new(5, 5);
        assert!(inpaint_telea(&image, &GrayImage::new(4, 5), 3).is_err());
    }
}
