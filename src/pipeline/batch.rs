//! Fan-out of the pipeline over folders and path lists.
//!
//! Every input image yields exactly one [`ImageRecord`], whatever happens while it is
//! processed. Workers never share a pipeline: process isolation (the default) runs each
//! image in a child process, thread isolation gives each rayon split its own
//! [`ImageProcessor`].

use super::builder::PipelineFactory;
use super::impersonation::Impersonator;
use super::processor::ImageProcessor;
use super::result::{BatchReport, FolderResult, ImageRecord};
use crate::core::config::{BatchConfig, ParallelPolicy};
use crate::core::errors::{FormError, FormResult, ProcessingStage};
use crate::domain::KeyValueMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// File extensions accepted as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif"];

/// How images are isolated from each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerIsolation {
    /// Worker threads in one process, each with its own pipeline. Panics are caught,
    /// but an abort inside native code ends the whole batch.
    Thread,
    /// One child process per image.
    #[default]
    Process,
}

/// Whether the path has one of the [`IMAGE_EXTENSIONS`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Lists the images under `root`, sorted by path.
pub fn collect_images(root: &Path, recursive: bool) -> FormResult<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut images = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            FormError::stage_failure(
                ProcessingStage::BatchProcessing,
                format!("failed to list {}", root.display()),
                e,
            )
        })?;
        if entry.file_type().is_file() && is_supported_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name of the folder directly containing `path`.
fn parent_folder_name(path: &Path) -> String {
    path.parent().map(file_name).unwrap_or_default()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The command started for each image in process isolation.
///
/// The child is invoked as `<program> worker --image <path> [--config <file>]` and must
/// print the key-value map as a JSON object on stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerCommand {
    /// `None` stands for the running executable.
    program: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            config: None,
        }
    }

    /// The running executable, which provides the `worker` subcommand.
    ///
    /// The path is looked up when a worker is started.
    pub fn current_exe() -> Self {
        Self::default()
    }

    /// Passes `--config <path>` to every child.
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn run(&self, image: &Path) -> FormResult<KeyValueMap> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        let mut command = Command::new(&program);
        command.arg("worker").arg("--image").arg(image);
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }

        let output = command.output().map_err(|e| {
            FormError::stage_failure(
                ProcessingStage::BatchProcessing,
                format!("failed to start worker {}", program.display()),
                e,
            )
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or_default().trim();
            return Err(FormError::stage_error(
                ProcessingStage::BatchProcessing,
                format!("worker exited with {}: {last_line}", output.status),
            ));
        }
        parse_worker_output(&output.stdout)
    }
}

/// Parses the JSON object printed by a worker process.
pub fn parse_worker_output(stdout: &[u8]) -> FormResult<KeyValueMap> {
    serde_json::from_slice(stdout).map_err(|e| {
        FormError::stage_failure(
            ProcessingStage::BatchProcessing,
            "worker printed invalid output",
            e,
        )
    })
}

/// Runs the pipeline over many images on a bounded worker pool.
#[derive(Clone)]
pub struct BatchRunner {
    factory: PipelineFactory,
    max_workers: usize,
    recursive: bool,
    isolation: WorkerIsolation,
    worker: WorkerCommand,
    impersonator: Option<Arc<dyn Impersonator>>,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("max_workers", &self.max_workers)
            .field("recursive", &self.recursive)
            .field("isolation", &self.isolation)
            .field("worker", &self.worker)
            .field("impersonation", &self.impersonator.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchRunner {
    /// Creates a runner with at most 12 workers that starts the running executable's
    /// `worker` subcommand for every image.
    ///
    /// `factory` is used only after [`BatchRunner::with_thread_isolation`].
    pub fn new(factory: PipelineFactory) -> Self {
        Self {
            factory,
            max_workers: 12,
            recursive: true,
            isolation: WorkerIsolation::Process,
            worker: WorkerCommand::current_exe(),
            impersonator: None,
        }
    }

    /// Applies the `[batch]` section.
    ///
    /// Process isolation uses `worker_command`, or the running executable when unset.
    pub fn from_config(factory: PipelineFactory, config: &BatchConfig) -> Self {
        let runner = Self::new(factory)
            .with_max_workers(config.max_workers)
            .with_recursive(config.recursive);
        match config.isolation {
            WorkerIsolation::Thread => runner.with_thread_isolation(),
            WorkerIsolation::Process => match &config.worker_command {
                Some(program) => runner.with_worker_command(WorkerCommand::new(program)),
                None => runner,
            },
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Switches to process isolation with the given worker command.
    pub fn with_worker_command(mut self, worker: WorkerCommand) -> Self {
        self.isolation = WorkerIsolation::Process;
        self.worker = worker;
        self
    }

    /// Passes `--config <path>` to worker processes. No effect in thread isolation.
    pub fn with_worker_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.worker.config = Some(config.into());
        self
    }

    /// Runs images on worker threads of this process instead of child processes.
    pub fn with_thread_isolation(mut self) -> Self {
        self.isolation = WorkerIsolation::Thread;
        self
    }

    /// Impersonates before each image's I/O.
    pub fn with_impersonator(mut self, impersonator: Arc<dyn Impersonator>) -> Self {
        self.impersonator = Some(impersonator);
        self
    }

    pub fn isolation(&self) -> WorkerIsolation {
        self.isolation
    }

    /// Number of concurrent workers for `images` inputs.
    pub fn worker_count(&self, images: usize) -> usize {
        ParallelPolicy::new()
            .with_max_threads(Some(self.max_workers))
            .effective_threads(images)
    }

    /// Processes a single image file or every image under a directory.
    ///
    /// Directory results are grouped by the folder directly containing each image;
    /// a single file is labelled with its parent folder name.
    pub fn run_path(&self, path: &Path) -> FormResult<BatchReport> {
        if !path.exists() {
            return Err(FormError::invalid_input(format!(
                "invalid path: {}",
                path.display()
            )));
        }

        let images = if path.is_dir() {
            collect_images(path, self.recursive)?
        } else if is_supported_image(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(FormError::invalid_input(format!(
                "not a supported image: {}",
                path.display()
            )));
        };
        if images.is_empty() {
            return Err(FormError::invalid_input(format!(
                "no valid image files found in {}",
                path.display()
            )));
        }

        let start = Instant::now();
        let records = self.process_all(&images)?;

        let mut folders: Vec<FolderResult> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        for (image, record) in images.iter().zip(records) {
            let parent = image.parent().map(Path::to_path_buf).unwrap_or_default();
            let slot = *index.entry(parent).or_insert_with(|| {
                folders.push(FolderResult {
                    folder_name: parent_folder_name(image),
                    images: Vec::new(),
                });
                folders.len() - 1
            });
            folders[slot].images.push(record);
        }

        Ok(self.finish(folders, images.len(), start))
    }

    /// Processes an explicit list of image files as one folder named `label`.
    ///
    /// Every path must be an existing image file; nothing is processed otherwise.
    pub fn run_paths(&self, paths: &[PathBuf], label: &str) -> FormResult<BatchReport> {
        if let Some(bad) = paths
            .iter()
            .find(|p| !p.is_file() || !is_supported_image(p))
        {
            return Err(FormError::invalid_input(format!(
                "invalid image path: {}",
                bad.display()
            )));
        }

        let start = Instant::now();
        let images = self.process_all(paths)?;
        let folders = vec![FolderResult {
            folder_name: label.to_string(),
            images,
        }];
        Ok(self.finish(folders, paths.len(), start))
    }

    fn finish(
        &self,
        folders: Vec<FolderResult>,
        image_count: usize,
        start: Instant,
    ) -> BatchReport {
        let report = BatchReport {
            folders,
            image_count,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            images = image_count,
            failed = report.failed_count(),
            seconds = report.elapsed.as_secs_f64(),
            "batch finished"
        );
        report
    }

    /// Returns one record per image, in input order.
    fn process_all(&self, images: &[PathBuf]) -> FormResult<Vec<ImageRecord>> {
        let workers = self.worker_count(images.len());
        tracing::info!(
            images = images.len(),
            workers,
            isolation = ?self.isolation,
            "starting batch"
        );
        let pool = ParallelPolicy::new()
            .with_max_threads(Some(workers))
            .build_pool(images.len(), "batch")?;

        let records = match self.isolation {
            WorkerIsolation::Process => pool.install(|| {
                images
                    .par_iter()
                    .map(|path| self.run_in_process(&self.worker, path))
                    .collect()
            }),
            WorkerIsolation::Thread => pool.install(|| {
                images
                    .par_iter()
                    .map_init(
                        || (self.factory)(),
                        |processor, path| self.run_in_thread(processor, path),
                    )
                    .collect()
            }),
        };
        Ok(records)
    }

    fn run_in_thread(&self, processor: &FormResult<ImageProcessor>, path: &Path) -> ImageRecord {
        let name = file_name(path);
        let processor = match processor {
            Ok(processor) => processor,
            Err(err) => {
                tracing::error!(error = %err, "failed to build pipeline");
                return ImageRecord::failed(name, err.to_string());
            }
        };
        self.guarded(path, || {
            catch_unwind(AssertUnwindSafe(|| processor.process_single_image(path))).map_err(
                |payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(path = %path.display(), panic = %message, "image panicked");
                    format!("processing panicked: {message}")
                },
            )
        })
    }

    fn run_in_process(&self, worker: &WorkerCommand, path: &Path) -> ImageRecord {
        self.guarded(path, || {
            worker.run(path).map_err(|err| {
                tracing::error!(path = %path.display(), error = %err, "worker failed");
                err.to_string()
            })
        })
    }

    /// Runs `work` under impersonation when enabled and wraps the outcome in a record.
    fn guarded(
        &self,
        path: &Path,
        work: impl FnOnce() -> Result<KeyValueMap, String>,
    ) -> ImageRecord {
        let name = file_name(path);
        let _guard = match &self.impersonator {
            Some(impersonator) => match impersonator.impersonate() {
                Ok(guard) => Some(guard),
                Err(err) => {
                    tracing::error!(
                        stage = %ProcessingStage::Impersonation,
                        path = %path.display(),
                        error = %err,
                        "impersonation failed"
                    );
                    return ImageRecord::failed(name, err.to_string());
                }
            },
            None => None,
        };
        match work() {
            Ok(fields) => ImageRecord::new(name, fields),
            Err(message) => ImageRecord::failed(name, message),
        }
    }
}
