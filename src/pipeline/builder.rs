//! Construction of [`ImageProcessor`] instances from a [`FormConfig`].

use super::processor::ImageProcessor;
use crate::core::config::FormConfig;
use crate::core::errors::{FormError, FormResult};
use crate::domain::{
    EastTextDetector, EntityRecognizer, ImageFilter, KeyValueExtractor, LinesFilter,
    NerKeyValueExtractor, OnnxEastModel, OnnxEntityRecognizer, PatternEntityRecognizer,
    TextDetector, TextRecognizer,
};
use std::sync::Arc;

/// Creates one processor per worker.
pub type PipelineFactory = Arc<dyn Fn() -> FormResult<ImageProcessor> + Send + Sync>;

/// Builder for [`ImageProcessor`].
///
/// Stages that are not supplied explicitly are built from the configuration: the
/// lines filter, the EAST detector, Tesseract recognition and entity based
/// extraction.
///
/// # Example
///
/// ```no_run
/// use oar_forms::core::config::FormConfig;
/// use oar_forms::pipeline::PipelineBuilder;
///
/// let config = FormConfig::from_file("config/config.toml")?;
/// let processor = PipelineBuilder::new(config).build()?;
/// let fields = processor.process_single_image("scan.png".as_ref());
/// # Ok::<(), oar_forms::core::errors::FormError>(())
/// ```
pub struct PipelineBuilder {
    config: FormConfig,
    filter: Option<Box<dyn ImageFilter>>,
    detector: Option<Box<dyn TextDetector>>,
    recognizer: Option<Box<dyn TextRecognizer>>,
    extractor: Option<Box<dyn KeyValueExtractor>>,
    entity_recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("custom_filter", &self.filter.is_some())
            .field("custom_detector", &self.detector.is_some())
            .field("custom_recognizer", &self.recognizer.is_some())
            .field("custom_extractor", &self.extractor.is_some())
            .finish()
    }
}

impl PipelineBuilder {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            filter: None,
            detector: None,
            recognizer: None,
            extractor: None,
            entity_recognizer: None,
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn ImageFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn TextDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn KeyValueExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Uses an already loaded entity recognizer for the default extractor.
    ///
    /// Ignored when a custom extractor is set.
    pub fn with_entity_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.entity_recognizer = Some(recognizer);
        self
    }

    /// Builds the processor, loading the models for every stage left unset.
    pub fn build(self) -> FormResult<ImageProcessor> {
        let config = &self.config;

        let filter = match self.filter {
            Some(filter) => filter,
            None => Box::new(LinesFilter::from_config(&config.line_filter)),
        };

        let detector = match self.detector {
            Some(detector) => detector,
            None => {
                let model = OnnxEastModel::load(
                    &config.paths.east_model,
                    &config.detector,
                    &config.ort_session,
                )?;
                Box::new(EastTextDetector::from_config(
                    Box::new(model),
                    &config.detector,
                ))
            }
        };

        let recognizer = match self.recognizer {
            Some(recognizer) => recognizer,
            None => default_recognizer(config)?,
        };

        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => {
                let entities = match self.entity_recognizer {
                    Some(entities) => entities,
                    None => load_entity_recognizer(config)?,
                };
                Box::new(NerKeyValueExtractor::from_config(
                    entities,
                    &config.extractor,
                )?)
            }
        };

        Ok(ImageProcessor::new(filter, detector, recognizer, extractor))
    }
}

#[cfg(feature = "tesseract")]
fn default_recognizer(config: &FormConfig) -> FormResult<Box<dyn TextRecognizer>> {
    use crate::domain::{ParallelTextRecognizer, TesseractEngine};

    let engine =
        TesseractEngine::from_config(&config.recognizer, config.paths.tessdata.as_deref());
    engine.check_language_data()?;
    let recognizer = ParallelTextRecognizer::new(Arc::new(engine))
        .with_policy(config.recognizer.parallel.clone());
    Ok(Box::new(recognizer))
}

#[cfg(not(feature = "tesseract"))]
fn default_recognizer(_config: &FormConfig) -> FormResult<Box<dyn TextRecognizer>> {
    Err(FormError::config_error(
        "built without the `tesseract` feature; supply a recognizer with `with_recognizer`",
    ))
}

/// Loads the entity recognizer named by the configuration.
///
/// A token classification model is used when `paths.ner_model` is set, then the
/// configured pattern rules, then the built-in rules.
pub fn load_entity_recognizer(config: &FormConfig) -> FormResult<Arc<dyn EntityRecognizer>> {
    let paths = &config.paths;
    if let Some(model) = &paths.ner_model {
        let tokenizer = paths.ner_tokenizer.as_deref().ok_or_else(|| {
            FormError::missing_field("ner_tokenizer", "[paths] (required with ner_model)")
        })?;
        let labels = paths.ner_labels.as_deref().ok_or_else(|| {
            FormError::missing_field("ner_labels", "[paths] (required with ner_model)")
        })?;
        let recognizer = OnnxEntityRecognizer::load(
            model,
            tokenizer,
            labels,
            &config.ort_session,
            config.extractor.max_sequence_length,
        )?;
        return Ok(Arc::new(recognizer));
    }

    if config.extractor.entity_rules.is_empty() {
        tracing::info!("no entity model or rules configured, using built-in rules");
        Ok(Arc::new(PatternEntityRecognizer::default()))
    } else {
        Ok(Arc::new(PatternEntityRecognizer::from_rules(
            &config.extractor.entity_rules,
        )?))
    }
}

/// A factory building a fresh processor from the configuration on every call.
///
/// The entity recognizer is loaded once here and shared by every processor.
pub fn factory_from_config(config: FormConfig) -> FormResult<PipelineFactory> {
    let entities = load_entity_recognizer(&config)?;
    Ok(Arc::new(move || {
        PipelineBuilder::new(config.clone())
            .with_entity_recognizer(entities.clone())
            .build()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EntityRuleConfig;
    use crate::domain::{DetectionOutput, KeyValueMap};
    use crate::processors::BoundingBox;
    use image::{DynamicImage, GrayImage, Luma};

    impl std::fmt::Debug for dyn EntityRecognizer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn EntityRecognizer")
        }
    }

    struct NoDetector;

    impl TextDetector for NoDetector {
        fn detect(&self, _image: &DynamicImage) -> DetectionOutput {
            DetectionOutput::default()
        }
    }

    struct NoText;

    impl TextRecognizer for NoText {
        fn recognize(&self, _image: &DynamicImage, _boxes: &[BoundingBox]) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_missing_east_model_fails_build() {
        let err = PipelineBuilder::new(FormConfig::with_east_model("/nonexistent/east.onnx"))
            .with_recognizer(Box::new(NoText))
            .build()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_custom_stages_skip_model_loading() {
        let processor = PipelineBuilder::new(FormConfig::with_east_model("/nonexistent/east.onnx"))
            .with_detector(Box::new(NoDetector))
            .with_recognizer(Box::new(NoText))
            .build()
            .unwrap();
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        assert_eq!(processor.process_image(&page), KeyValueMap::new());
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn test_missing_language_data_fails_build() {
        let tessdata = tempfile::tempdir().unwrap();
        let mut config = FormConfig::with_east_model("/nonexistent/east.onnx");
        config.paths.tessdata = Some(tessdata.path().to_path_buf());

        let err = PipelineBuilder::new(config)
            .with_detector(Box::new(NoDetector))
            .build()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_entity_recognizer_selection() {
        let mut config = FormConfig::with_east_model("east.onnx");
        assert!(load_entity_recognizer(&config).is_ok());

        config.extractor.entity_rules = vec![EntityRuleConfig {
            label: "DOB".to_string(),
            pattern: "(".to_string(),
        }];
        assert!(load_entity_recognizer(&config).unwrap_err().is_fatal());

        config.extractor.entity_rules.clear();
        config.paths.ner_model = Some("ner.onnx".into());
        assert!(load_entity_recognizer(&config).unwrap_err().is_fatal());
    }

    #[test]
    fn test_factory_builds_independent_processors() {
        let config = FormConfig::with_east_model("/nonexistent/east.onnx");
        let factory = factory_from_config(config).unwrap();
        // The detector model does not exist, so every call reports the load failure.
        assert!(factory().is_err());
        assert!(factory().is_err());
    }
}
