//! Utility functions for the extraction pipeline.
//!
//! This module provides region cropping helpers and logging setup.

pub mod bbox_crop;

pub use bbox_crop::BBoxCrop;

/// Initializes the tracing subscriber for logging.
///
/// Log levels are taken from `RUST_LOG`. Output goes to stderr so that stdout stays
/// reserved for results (the worker subcommand prints its JSON there).
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
