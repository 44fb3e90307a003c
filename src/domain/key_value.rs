//! Key-value extraction from recognized text fragments.

use crate::core::config::ExtractorConfig;
use crate::core::errors::{FormResult, ProcessingStage};
use crate::domain::doc_classifier::{DocumentClassification, SignatureClassifier};
use crate::domain::entities::{Entity, EntityRecognizer};
use crate::domain::field_cleanup::FieldCleanup;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Extracted fields keyed by entity label.
pub type KeyValueMap = BTreeMap<String, String>;

/// Characters stripped from fragments before entity recognition.
pub const DEFAULT_TEXT_NOISE: &str = "![]+{};'\"\\,<>.?#$%^*_~'—|";

/// Removes a fixed set of characters from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseRemover {
    noise: Vec<char>,
}

impl Default for NoiseRemover {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_NOISE)
    }
}

impl NoiseRemover {
    pub fn new(noise: &str) -> Self {
        let mut chars: Vec<char> = noise.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        Self { noise: chars }
    }

    pub fn clean(&self, text: &str) -> String {
        text.chars()
            .filter(|c| self.noise.binary_search(c).is_err())
            .collect()
    }
}

/// Turns the fragments of one page into a key-value map.
pub trait KeyValueExtractor: Send + Sync {
    fn extract(&self, fragments: &[String]) -> KeyValueMap;

    /// Classifies the page the fragments came from.
    fn classify(&self, fragments: &[String]) -> DocumentClassification {
        SignatureClassifier::default().classify(fragments)
    }

    /// Classifies the page once and extracts its fields.
    fn classify_and_extract(
        &self,
        fragments: &[String],
    ) -> (DocumentClassification, KeyValueMap) {
        (self.classify(fragments), self.extract(fragments))
    }
}

/// Adds an entity to the map.
///
/// The first occurrence of a label sets the value. Later occurrences are appended
/// after `", "` unless their text already appears in the accumulated value.
pub fn merge_entity(fields: &mut KeyValueMap, entity: Entity) {
    match fields.get_mut(&entity.label) {
        Some(value) => {
            if !value.contains(entity.text.as_str()) {
                value.push_str(", ");
                value.push_str(&entity.text);
            }
        }
        None => {
            fields.insert(entity.label, entity.text);
        }
    }
}

/// Noise removal, entity recognition, entity merging and field cleanup.
#[derive(Clone)]
pub struct NerKeyValueExtractor {
    noise: NoiseRemover,
    recognizer: Arc<dyn EntityRecognizer>,
    classifier: SignatureClassifier,
    cleanup: FieldCleanup,
}

impl std::fmt::Debug for NerKeyValueExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NerKeyValueExtractor")
            .field("noise", &self.noise)
            .field("classifier", &self.classifier)
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}

impl NerKeyValueExtractor {
    pub fn new(recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            noise: NoiseRemover::default(),
            recognizer,
            classifier: SignatureClassifier::default(),
            cleanup: FieldCleanup::default(),
        }
    }

    /// Builds an extractor with the noise set and cleanup overrides from the config.
    pub fn from_config(
        recognizer: Arc<dyn EntityRecognizer>,
        config: &ExtractorConfig,
    ) -> FormResult<Self> {
        Ok(Self {
            noise: NoiseRemover::new(&config.text_noise),
            recognizer,
            classifier: SignatureClassifier::default(),
            cleanup: FieldCleanup::default().with_overrides(&config.cleanup)?,
        })
    }

    pub fn with_classifier(mut self, classifier: SignatureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_cleanup(mut self, cleanup: FieldCleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    fn collect_entities(&self, fragments: &[String], fields: &mut KeyValueMap) -> FormResult<()> {
        for fragment in fragments {
            let text = self.noise.clean(fragment);
            for entity in self.recognizer.recognize(&text)? {
                merge_entity(fields, entity);
            }
        }
        Ok(())
    }

    fn extract_fields(&self, fragments: &[String]) -> KeyValueMap {
        let mut fields = KeyValueMap::new();
        if let Err(err) = self.collect_entities(fragments, &mut fields) {
            tracing::error!(
                stage = %ProcessingStage::KeyValueExtraction,
                error = %err,
                partial = fields.len(),
                "entity recognition failed"
            );
        }
        self.cleanup.apply(&mut fields);
        tracing::info!(pairs = fields.len(), "key-value extraction completed");
        fields
    }
}

impl KeyValueExtractor for NerKeyValueExtractor {
    fn extract(&self, fragments: &[String]) -> KeyValueMap {
        self.classify_and_extract(fragments).1
    }

    fn classify(&self, fragments: &[String]) -> DocumentClassification {
        self.classifier.classify(fragments)
    }

    fn classify_and_extract(
        &self,
        fragments: &[String],
    ) -> (DocumentClassification, KeyValueMap) {
        let classification = self.classify(fragments);
        tracing::debug!(
            is_target_type = classification.is_target_type,
            document_name = ?classification.document_name,
            "document classified"
        );
        (classification, self.extract_fields(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::FormError;
    use crate::domain::entities::PatternEntityRecognizer;
    use std::sync::Mutex;

    /// Emits one `WORD` entity per whitespace separated token.
    struct WordRecognizer {
        seen: Mutex<Vec<String>>,
    }

    impl EntityRecognizer for WordRecognizer {
        fn recognize(&self, text: &str) -> FormResult<Vec<Entity>> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(text
                .split_whitespace()
                .map(|w| Entity::new("WORD", w))
                .collect())
        }
    }

    /// Fails on the second fragment.
    struct SecondCallFails {
        calls: Mutex<usize>,
    }

    impl EntityRecognizer for SecondCallFails {
        fn recognize(&self, text: &str) -> FormResult<Vec<Entity>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                return Err(FormError::stage_error(
                    ProcessingStage::EntityRecognition,
                    "model crashed",
                ));
            }
            Ok(vec![Entity::new("DOB", text)])
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_noise_remover() {
        let noise = NoiseRemover::default();
        assert_eq!(noise.clean("NAME: [John] O'Neil|"), "NAME: John ONeil");
        assert_eq!(noise.clean("a—b\\c\"d"), "abcd");
        assert_eq!(NoiseRemover::new("").clean("a.b"), "a.b");
    }

    #[test]
    fn test_merge_rule() {
        let mut fields = KeyValueMap::new();
        merge_entity(&mut fields, Entity::new("DLN", "K123"));
        merge_entity(&mut fields, Entity::new("DLN", "K12"));
        merge_entity(&mut fields, Entity::new("DLN", "Z999"));
        merge_entity(&mut fields, Entity::new("DLN", "K123"));
        assert_eq!(fields["DLN"], "K123, Z999");
    }

    #[test]
    fn test_fragments_are_denoised_before_recognition() {
        let recognizer = Arc::new(WordRecognizer {
            seen: Mutex::new(Vec::new()),
        });
        let extractor = NerKeyValueExtractor::new(recognizer.clone());
        let fields = extractor.extract(&strings(&["alpha. beta", "{gamma}", "alpha"]));

        assert_eq!(
            *recognizer.seen.lock().unwrap(),
            vec!["alpha beta", "gamma", "alpha"]
        );
        assert_eq!(fields["WORD"], "alpha, beta, gamma");
    }

    #[test]
    fn test_recognizer_error_keeps_partial_map_and_cleans_it() {
        let extractor = NerKeyValueExtractor::new(Arc::new(SecondCallFails {
            calls: Mutex::new(0),
        }));
        let fields = extractor.extract(&strings(&["DATE OF BIRTH 01/02/1980", "x", "y"]));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["DOB"], "01/02/1980");
    }

    #[test]
    fn test_pattern_rules_end_to_end() {
        let extractor = NerKeyValueExtractor::new(Arc::new(PatternEntityRecognizer::default()));
        let fields = extractor.extract(&strings(&[
            "MOTOR VEHICLE ADMINISTRATION",
            "Form (DC-1234)",
            "DATE OF BIRTH: 04/11/1975",
            "nothing here",
        ]));
        assert_eq!(fields.get("DOC_NAME").map(String::as_str), Some("DC-1234"));
        assert_eq!(fields.get("DOB").map(String::as_str), Some("04/11/1975"));

        let classification = extractor.classify(&strings(&["Form (DC-1234)"]));
        assert!(classification.is_target_type);
    }

    #[test]
    fn test_classify_and_extract_returns_both_results() {
        let extractor = NerKeyValueExtractor::new(Arc::new(PatternEntityRecognizer::default()));
        let page = strings(&["Form (DC-1234)", "DATE OF BIRTH: 04/11/1975"]);
        let (classification, fields) = extractor.classify_and_extract(&page);
        assert_eq!(classification, extractor.classify(&page));
        assert_eq!(classification.document_name.as_deref(), Some("DC-1234"));
        assert_eq!(fields, extractor.extract(&page));
    }

    #[test]
    fn test_from_config_uses_custom_noise_and_cleanup() {
        let mut config = ExtractorConfig {
            text_noise: "#".to_string(),
            ..ExtractorConfig::default()
        };
        config.cleanup.insert("WORD".to_string(), "^x".to_string());
        let extractor = NerKeyValueExtractor::from_config(
            Arc::new(WordRecognizer {
                seen: Mutex::new(Vec::new()),
            }),
            &config,
        )
        .unwrap();
        let fields = extractor.extract(&strings(&["x#y."]));
        assert_eq!(fields["WORD"], "y.");
    }
}
