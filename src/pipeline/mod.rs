//! Whole-image processing and batch execution.
//!
//! [`ImageProcessor`] chains the domain stages for one image, [`PipelineBuilder`]
//! assembles it from a configuration file, and [`BatchRunner`] runs it over folders
//! with thread or process isolation.

pub mod batch;
pub mod builder;
pub mod impersonation;
pub mod processor;
pub mod result;

pub use batch::{BatchRunner, WorkerCommand, WorkerIsolation, collect_images};
pub use builder::{PipelineBuilder, PipelineFactory, factory_from_config, load_entity_recognizer};
pub use impersonation::{CredentialImpersonator, Credentials, ImpersonationGuard, Impersonator};
pub use processor::{ImageProcessor, load_image};
pub use result::{BatchReport, FolderResult, ImageAnalysis, ImageRecord};
