//! TOML configuration for the extraction pipeline, the batch runner and the server.
//!
//! Every field except `paths.east_model` has a default, so a minimal file is:
//!
//! ```toml
//! [paths]
//! east_model = "models/frozen_east_text_detection.onnx"
//! ```

use super::onnx::OrtSessionConfig;
use super::parallel::ParallelPolicy;
use super::validation::ConfigValidator;
use crate::core::errors::{FormError, FormResult};
use crate::domain::key_value::DEFAULT_TEXT_NOISE;
use crate::pipeline::batch::WorkerIsolation;
use crate::processors::east::TensorLayout;
use crate::processors::geometry::SuppressionMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub line_filter: LineFilterConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub impersonation: ImpersonationConfig,
    /// ONNX Runtime settings shared by the detection and entity models.
    #[serde(default)]
    pub ort_session: OrtSessionConfig,
}

/// Model and data file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// EAST text detection model (ONNX).
    pub east_model: PathBuf,
    /// Token classification model (ONNX). When unset, pattern rules are used.
    #[serde(default)]
    pub ner_model: Option<PathBuf>,
    /// `tokenizer.json` matching `ner_model`.
    #[serde(default)]
    pub ner_tokenizer: Option<PathBuf>,
    /// Label list for `ner_model`, one label per line in class index order.
    #[serde(default)]
    pub ner_labels: Option<PathBuf>,
    /// Directory containing Tesseract traineddata files.
    #[serde(default)]
    pub tessdata: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFilterConfig {
    /// Rows are divided by this to get the vertical kernel height.
    pub vertical_scale: u32,
    /// Columns are divided by this to get the horizontal kernel width.
    pub horizontal_scale: u32,
    /// Dilation passes applied after the opening erosion.
    pub dilation_iter: u32,
}

impl Default for LineFilterConfig {
    fn default() -> Self {
        Self {
            vertical_scale: 25,
            horizontal_scale: 25,
            dilation_iter: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum score grid value for a cell to produce a candidate.
    pub min_confidence: f32,
    /// Overlap ratio above which a candidate is suppressed.
    pub overlap_thresh: f32,
    /// Padding added around each merged region, in resized pixels.
    pub padding: u32,
    pub suppression: SuppressionMode,
    /// Tensor layout of the model input and outputs.
    pub layout: TensorLayout,
    pub input_name: String,
    pub score_output: String,
    pub geometry_output: String,
    /// Draw detected regions on the image handed to the recognizer.
    pub annotate: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            overlap_thresh: 0.3,
            padding: 5,
            suppression: SuppressionMode::default(),
            layout: TensorLayout::Nhwc,
            input_name: "input_images:0".to_string(),
            score_output: "feature_fusion/Conv_7/Sigmoid:0".to_string(),
            geometry_output: "feature_fusion/concat_3:0".to_string(),
            annotate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub language: String,
    /// Tesseract page segmentation mode.
    pub page_seg_mode: u32,
    #[serde(flatten)]
    pub parallel: ParallelPolicy,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_seg_mode: 6,
            parallel: ParallelPolicy::default(),
        }
    }
}

/// A single pattern rule for the pattern-based entity recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRuleConfig {
    pub label: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Characters removed from every fragment before entity recognition.
    pub text_noise: String,
    /// Extra or replacement cleanup patterns, keyed by entity label.
    pub cleanup: BTreeMap<String, String>,
    /// Pattern rules used when no token classification model is configured.
    pub entity_rules: Vec<EntityRuleConfig>,
    /// Maximum token sequence length fed to the token classification model.
    pub max_sequence_length: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            text_noise: DEFAULT_TEXT_NOISE.to_string(),
            cleanup: BTreeMap::new(),
            entity_rules: Vec::new(),
            max_sequence_length: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrent images.
    pub max_workers: usize,
    pub isolation: WorkerIsolation,
    /// Descend into subfolders when the input is a directory.
    pub recursive: bool,
    /// Executable started per image in process isolation. Defaults to the running binary.
    pub worker_command: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 12,
            isolation: WorkerIsolation::Process,
            recursive: true,
            worker_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Lifetime of cached responses; 0 disables the cache.
    pub cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cache_ttl_secs: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpersonationConfig {
    /// `DOMAIN;username;password`
    pub connection_string: Option<String>,
}

impl FormConfig {
    /// Creates a configuration with defaults for everything but the detection model.
    pub fn with_east_model(east_model: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig {
                east_model: east_model.into(),
                ner_model: None,
                ner_tokenizer: None,
                ner_labels: None,
                tessdata: None,
            },
            line_filter: LineFilterConfig::default(),
            detector: DetectorConfig::default(),
            recognizer: RecognizerConfig::default(),
            extractor: ExtractorConfig::default(),
            batch: BatchConfig::default(),
            server: ServerConfig::default(),
            impersonation: ImpersonationConfig::default(),
            ort_session: OrtSessionConfig::default(),
        }
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> FormResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| FormError::config_error(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// Relative model paths are resolved against the directory of the file.
    pub fn from_file(path: impl AsRef<Path>) -> FormResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FormError::config_error(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.paths.resolve_relative_to(base);
        }
        tracing::debug!(config = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks that every configured model file exists.
    pub fn validate_paths(&self) -> FormResult<()> {
        self.validate_model_path(&self.paths.east_model, "paths.east_model")?;
        match (&self.paths.ner_model, &self.paths.ner_tokenizer) {
            (Some(model), Some(tokenizer)) => {
                self.validate_model_path(model, "paths.ner_model")?;
                self.validate_model_path(tokenizer, "paths.ner_tokenizer")?;
                if let Some(labels) = &self.paths.ner_labels {
                    self.validate_model_path(labels, "paths.ner_labels")?;
                }
                Ok(())
            }
            (Some(_), None) => Err(FormError::missing_field(
                "ner_tokenizer",
                "[paths] (required with ner_model)",
            )),
            (None, Some(_)) => Err(FormError::missing_field(
                "ner_model",
                "[paths] (required with ner_tokenizer)",
            )),
            (None, None) => Ok(()),
        }
    }
}

impl PathsConfig {
    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.east_model);
        for p in [
            &mut self.ner_model,
            &mut self.ner_tokenizer,
            &mut self.ner_labels,
            &mut self.tessdata,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
    }
}

impl ConfigValidator for FormConfig {
    fn validate(&self) -> FormResult<()> {
        let lf = &self.line_filter;
        self.validate_positive(lf.vertical_scale as usize, "line_filter.vertical_scale")?;
        self.validate_positive(lf.horizontal_scale as usize, "line_filter.horizontal_scale")?;
        self.validate_positive(lf.dilation_iter as usize, "line_filter.dilation_iter")?;

        let det = &self.detector;
        self.validate_unit_interval(det.min_confidence, "detector.min_confidence")?;
        self.validate_unit_interval(det.overlap_thresh, "detector.overlap_thresh")?;
        for (name, field) in [
            (&det.input_name, "detector.input_name"),
            (&det.score_output, "detector.score_output"),
            (&det.geometry_output, "detector.geometry_output"),
        ] {
            if name.trim().is_empty() {
                return Err(FormError::invalid_field(field, "a tensor name", "\"\""));
            }
        }

        if self.recognizer.page_seg_mode > 13 {
            return Err(FormError::invalid_field(
                "recognizer.page_seg_mode",
                "a Tesseract page segmentation mode in 0..=13",
                self.recognizer.page_seg_mode.to_string(),
            ));
        }
        if let Some(max) = self.recognizer.parallel.max_threads {
            self.validate_positive(max, "recognizer.max_threads")?;
        }
        self.validate_positive(
            self.extractor.max_sequence_length,
            "extractor.max_sequence_length",
        )?;
        self.validate_positive(self.batch.max_workers, "batch.max_workers")?;
        Ok(())
    }
}
