//! CLI mode: batch processing and the per-image worker.

use crate::config::AppConfig;
use oar_forms::pipeline::{BatchReport, factory_from_config};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Folder label used when several paths are given on the command line.
pub const PROVIDED_IMAGES_LABEL: &str = "Provided Images";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Compact JSON
    Json,
    /// Indented JSON
    Pretty,
    /// One line per field
    Text,
}

/// Processes one file or folder, or an explicit list of image files.
pub fn process_paths(
    app: &AppConfig,
    paths: &[PathBuf],
    impersonate: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let start = Instant::now();

    info!("Loading extraction pipeline...");
    let factory = factory_from_config(app.form.clone())?;
    let runner = app.batch_runner(factory, impersonate)?;
    info!(
        "Pipeline ready in {:.2}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    let report = match paths {
        [single] => runner.run_path(single)?,
        many => runner.run_paths(many, PROVIDED_IMAGES_LABEL)?,
    };
    info!(
        images = report.image_count,
        failed = report.failed_count(),
        "Completed in {:.2}ms",
        report.elapsed.as_secs_f64() * 1000.0
    );

    println!("{}", render_report(&report, output)?);
    Ok(())
}

/// Runs the pipeline on one image and prints the field map as JSON on stdout.
///
/// Pipeline construction failures exit non-zero so the parent records them as the
/// image's error.
pub fn run_worker(
    app: &AppConfig,
    image: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let factory = factory_from_config(app.form.clone())?;
    let processor = factory()?;
    let fields = processor.process_single_image(image);
    println!("{}", serde_json::to_string(&fields)?);
    Ok(())
}

fn render_report(report: &BatchReport, output: OutputFormat) -> serde_json::Result<String> {
    match output {
        OutputFormat::Json => serde_json::to_string(&report.to_caller_json()),
        OutputFormat::Pretty => serde_json::to_string_pretty(&report.to_caller_json()),
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for folder in &report.folders {
        lines.push(format!("[{}]", folder.folder_name));
        for record in &folder.images {
            lines.push(format!("  {}", record.image_filename));
            if let Some(error) = &record.error {
                lines.push(format!("    error: {error}"));
            }
            for (label, value) in &record.key_value_pairs {
                lines.push(format!("    {label}: {value}"));
            }
        }
    }
    lines.push(format!(
        "{} images, {} failed, {:.2}s",
        report.image_count,
        report.failed_count(),
        report.elapsed.as_secs_f64()
    ));
    lines.join("\n")
}
