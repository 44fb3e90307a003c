//! # OAR Forms
//!
//! Key-value extraction from scanned form images. Each page goes through four stages:
//!
//! - **Line removal**: table borders and underlines are erased with morphology and
//!   inpainting
//! - **Text detection**: the EAST model finds text regions, which are suppressed and
//!   merged into blocks
//! - **Text recognition**: Tesseract reads every block concurrently, in reading order
//! - **Key-value extraction**: entity recognition turns the text into labelled fields,
//!   followed by per-field cleanup
//!
//! ## Modules
//!
//! * [`core`] - Configuration, error handling and the ONNX Runtime session pool
//! * [`domain`] - The stage traits and their implementations
//! * [`pipeline`] - Single image processing, batch execution and impersonation
//! * [`processors`] - Morphology, inpainting, EAST decoding and box geometry
//! * [`utils`] - Cropping, drawing and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oar_forms::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FormConfig::from_file("config/config.toml")?;
//! let factory = factory_from_config(config.clone())?;
//!
//! // One image
//! let processor = factory()?;
//! let fields = processor.process_single_image(Path::new("scans/page1.png"));
//! for (label, value) in &fields {
//!     println!("{label}: {value}");
//! }
//!
//! // A whole folder
//! let runner = BatchRunner::from_config(factory, &config.batch);
//! let report = runner.run_path(Path::new("scans"))?;
//! println!("{}", serde_json::to_string_pretty(&report.to_caller_json())?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use oar_forms::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::config::FormConfig;
    pub use crate::core::errors::{FormError, FormResult};
    pub use crate::domain::{
        DocumentClassification, ImageFilter, KeyValueExtractor, KeyValueMap, LinesFilter,
        TextDetector, TextRecognizer,
    };
    pub use crate::pipeline::{
        BatchReport, BatchRunner, ImageProcessor, ImageRecord, PipelineBuilder,
        factory_from_config,
    };
    pub use crate::processors::BoundingBox;
    pub use crate::utils::init_tracing;
}
