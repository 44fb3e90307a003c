//! Image and geometry processing used by the pipeline stages.
//!
//! - [`morphology`]: binary erosion, dilation and Otsu thresholding
//! - [`inpaint`]: Telea fast-marching inpainting
//! - [`east`]: EAST detector input preparation and output decoding
//! - [`geometry`]: bounding boxes and non-maximum suppression
//! - [`region_merge`]: merging nearby boxes into text regions

pub mod east;
pub mod geometry;
pub mod inpaint;
pub mod morphology;
pub mod region_merge;

pub use east::{EastOutput, ResizePlan, TensorLayout};
pub use geometry::{BoundingBox, Candidate, SuppressionMode, non_max_suppression};
pub use region_merge::RegionMerger;
