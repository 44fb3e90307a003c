//! Named entity recognition over cleaned text fragments.
//!
//! Two recognizers are provided: ordered regular expression rules, and a token
//! classification model served by ONNX Runtime with a HuggingFace tokenizer.

use crate::core::config::{EntityRuleConfig, OrtSessionConfig};
use crate::core::errors::{FormError, FormResult, ProcessingStage, SimpleError};
use crate::core::inference::OrtInfer;
use ndarray::{Array2, Ix3, s};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenizers::Tokenizer;

/// A labelled span of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub text: String,
}

impl Entity {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Finds entities in a single fragment.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> FormResult<Vec<Entity>>;
}

/// Rules used when neither a model nor custom rules are configured.
///
/// Each rule matches the printed field label together with its value; the label text
/// is stripped afterwards by field cleanup.
pub const DEFAULT_ENTITY_RULES: &[(&str, &str)] = &[
    ("DOC_NAME", r"\(?DC[-\s]?\d{3,4}\)?"),
    (
        "DOB",
        r"(?i)DATE\s*OF\s*BIRTH\s*:?\s*\d{1,2}\s*[/-]\s*\d{1,2}\s*[/-]\s*\d{2,4}",
    ),
    (
        "DOC_DATE",
        r"(?i)TODAYS?\s*DATE\s*:?\s*\d{1,2}\s*[/-]\s*\d{1,2}\s*[/-]\s*\d{2,4}",
    ),
    (
        "DLN",
        r"(?i)(?:\bDLN\b|DRIVERS?\s*LICENSE\s*(?:NO|NUMBER))\s*:?\s*[A-Z0-9][A-Z0-9-]{4,}",
    ),
    (
        "APPLICANT_NAME",
        r"(?i)\bNAME\s*:?\s*[A-Z][A-Z'-]+(?:\s+[A-Z][A-Z'-]+){0,2}",
    ),
];

/// Ordered `(label, regex)` rules.
///
/// All matches of all rules are collected and sorted by start offset. Overlapping
/// spans are resolved in favor of the earliest, then the longest, then the rule listed
/// first.
#[derive(Debug, Clone)]
pub struct PatternEntityRecognizer {
    rules: Vec<(String, Regex)>,
}

static DEFAULT_RULES: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    DEFAULT_ENTITY_RULES
        .iter()
        .map(|(label, pattern)| {
            let regex = Regex::new(pattern).expect("Invalid built-in entity regex");
            (label.to_string(), regex)
        })
        .collect()
});

impl Default for PatternEntityRecognizer {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl PatternEntityRecognizer {
    /// Compiles rules from the configuration file.
    pub fn from_rules(rules: &[EntityRuleConfig]) -> FormResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| (rule.label.clone(), regex))
                    .map_err(|e| {
                        FormError::config_error(format!(
                            "invalid entity rule for label '{}': {e}",
                            rule.label
                        ))
                    })
            })
            .collect::<FormResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl EntityRecognizer for PatternEntityRecognizer {
    fn recognize(&self, text: &str) -> FormResult<Vec<Entity>> {
        let mut spans: Vec<(usize, usize, usize)> = Vec::new();
        for (rule_idx, (_, regex)) in self.rules.iter().enumerate() {
            spans.extend(
                regex
                    .find_iter(text)
                    .filter(|m| !m.as_str().trim().is_empty())
                    .map(|m| (m.start(), m.end(), rule_idx)),
            );
        }
        spans.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| (b.1 - b.0).cmp(&(a.1 - a.0)))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut entities = Vec::new();
        let mut covered_to = 0;
        for (start, end, rule_idx) in spans {
            if start < covered_to {
                continue;
            }
            covered_to = end;
            entities.push(Entity::new(
                self.rules[rule_idx].0.clone(),
                text[start..end].trim(),
            ));
        }
        Ok(entities)
    }
}

/// A token with its predicted tag and byte span in the source text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaggedToken<'a> {
    pub tag: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Groups BIO tagged tokens into entities.
///
/// `B-X` opens a span, `I-X` and bare `X` continue a span of the same label (or open
/// one), and `O` closes the current span. Tokens with empty offsets are ignored.
pub(crate) fn decode_bio(text: &str, tokens: &[TaggedToken<'_>]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<(&str, usize, usize)> = None;

    for token in tokens {
        if token.start >= token.end {
            continue;
        }
        let (begins, label) = match token.tag.split_once('-') {
            Some(("B", label)) => (true, label),
            Some(("I", label)) => (false, label),
            _ if token.tag == "O" => {
                push_span(text, current.take(), &mut entities);
                continue;
            }
            _ => (false, token.tag),
        };

        match current {
            Some((open_label, start, _)) if !begins && open_label == label => {
                current = Some((open_label, start, token.end));
            }
            _ => {
                push_span(text, current.take(), &mut entities);
                current = Some((label, token.start, token.end));
            }
        }
    }
    push_span(text, current, &mut entities);
    entities
}

fn push_span(text: &str, span: Option<(&str, usize, usize)>, entities: &mut Vec<Entity>) {
    let Some((label, start, end)) = span else {
        return;
    };
    let slice = text.get(start..end).map(str::trim).unwrap_or_default();
    if !slice.is_empty() {
        entities.push(Entity::new(label, slice));
    }
}

const LOGITS_OUTPUT: &str = "logits";

/// Token classification model served by ONNX Runtime.
pub struct OnnxEntityRecognizer {
    infer: OrtInfer,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    max_sequence_length: usize,
    uses_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxEntityRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEntityRecognizer")
            .field("infer", &self.infer)
            .field("labels", &self.labels)
            .field("max_sequence_length", &self.max_sequence_length)
            .finish_non_exhaustive()
    }
}

impl OnnxEntityRecognizer {
    /// Loads the model, its tokenizer and its label list.
    ///
    /// # Arguments
    ///
    /// * `model_path` - Token classification model exported to ONNX
    /// * `tokenizer_path` - `tokenizer.json` of the same model
    /// * `labels_path` - Text file with one label per line, in class index order
    /// * `session` - ONNX Runtime session settings
    /// * `max_sequence_length` - Token sequences are truncated to this length
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        labels_path: &Path,
        session: &OrtSessionConfig,
        max_sequence_length: usize,
    ) -> FormResult<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            FormError::model_load_error(
                tokenizer_path,
                "failed to load tokenizer",
                Some("expected a HuggingFace tokenizer.json"),
                Some(SimpleError::new(e.to_string())),
            )
        })?;
        let labels = read_labels(labels_path)?;
        let infer = OrtInfer::from_config(session, model_path)?;
        let uses_token_type_ids = infer
            .input_names()?
            .iter()
            .any(|name| name == "token_type_ids");

        Ok(Self {
            infer,
            tokenizer,
            labels,
            max_sequence_length: max_sequence_length.max(1),
            uses_token_type_ids,
        })
    }

    fn ner_error(&self, message: impl Into<String>) -> FormError {
        FormError::stage_error(ProcessingStage::EntityRecognition, message)
    }
}

impl EntityRecognizer for OnnxEntityRecognizer {
    fn recognize(&self, text: &str) -> FormResult<Vec<Entity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| self.ner_error(format!("tokenization failed: {e}")))?;

        let len = encoding.get_ids().len().min(self.max_sequence_length);
        if len == 0 {
            return Ok(Vec::new());
        }
        let to_row = |values: &[u32]| -> FormResult<Array2<i64>> {
            let row: Vec<i64> = values.iter().take(len).map(|&v| v as i64).collect();
            Ok(Array2::from_shape_vec((1, len), row)?)
        };
        let input_ids = to_row(encoding.get_ids())?;
        let attention_mask = to_row(encoding.get_attention_mask())?;
        let token_type_ids = to_row(encoding.get_type_ids())?;

        let mut inputs = vec![
            ("input_ids", input_ids.view()),
            ("attention_mask", attention_mask.view()),
        ];
        if self.uses_token_type_ids {
            inputs.push(("token_type_ids", token_type_ids.view()));
        }

        let logits = self
            .infer
            .run_tokens(&inputs, &[LOGITS_OUTPUT])?
            .pop()
            .ok_or_else(|| self.ner_error("model returned no logits"))?;
        let expected = [1, len, self.labels.len()];
        if logits.shape() != expected {
            return Err(FormError::tensor_shape_error(
                "token classification logits",
                &expected,
                logits.shape(),
            ));
        }
        let logits = logits.into_dimensionality::<Ix3>()?;

        let offsets = encoding.get_offsets();
        let special = encoding.get_special_tokens_mask();
        let tokens: Vec<TaggedToken<'_>> = (0..len)
            .filter(|&i| special.get(i).copied().unwrap_or(0) == 0)
            .filter_map(|i| {
                let class = logits
                    .slice(s![0, i, ..])
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(idx, _)| idx)?;
                let (start, end) = offsets.get(i).copied()?;
                Some(TaggedToken {
                    tag: self.labels[class].as_str(),
                    start,
                    end,
                })
            })
            .collect();

        Ok(decode_bio(text, &tokens))
    }
}

fn read_labels(path: &Path) -> FormResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        FormError::model_load_error(path, "failed to read label list", None, Some(e))
    })?;
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(FormError::config_error(format!(
            "label list {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(label: &str, pattern: &str) -> EntityRuleConfig {
        EntityRuleConfig {
            label: label.to_string(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_rules_report_matches_in_text_order() {
        let recognizer = PatternEntityRecognizer::from_rules(&[
            rule("DOB", r"\d{2}/\d{2}/\d{4}"),
            rule("DLN", r"[A-Z]\d{6}"),
        ])
        .unwrap();
        let entities = recognizer.recognize("DLN K123456 born 01/02/1980").unwrap();
        assert_eq!(
            entities,
            vec![Entity::new("DLN", "K123456"), Entity::new("DOB", "01/02/1980")]
        );
    }

    #[test]
    fn test_overlaps_keep_earliest_then_longest() {
        let recognizer = PatternEntityRecognizer::from_rules(&[
            rule("SHORT", r"SMITH"),
            rule("LONG", r"JOHN SMITH"),
            rule("ALSO_LONG", r"JOHN SMITH"),
        ])
        .unwrap();
        let entities = recognizer.recognize("NAME JOHN SMITH").unwrap();
        assert_eq!(entities, vec![Entity::new("LONG", "JOHN SMITH")]);
    }

    #[test]
    fn test_invalid_rule_is_a_config_error() {
        let err = PatternEntityRecognizer::from_rules(&[rule("BAD", "(")]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_default_rules_compile_and_match() {
        let recognizer = PatternEntityRecognizer::default();
        assert_eq!(recognizer.rule_count(), DEFAULT_ENTITY_RULES.len());

        let entities = recognizer.recognize("DATE OF BIRTH 04/11/1975").unwrap();
        assert_eq!(entities, vec![Entity::new("DOB", "DATE OF BIRTH 04/11/1975")]);

        let entities = recognizer.recognize("form (DC-1234)").unwrap();
        assert_eq!(entities, vec![Entity::new("DOC_NAME", "(DC-1234)")]);
    }

    fn tok(tag: &str, start: usize, end: usize) -> TaggedToken<'_> {
        TaggedToken { tag, start, end }
    }

    #[test]
    fn test_decode_bio_spans() {
        let text = "NAME JOHN SMITH DOB 01/02/1980";
        let tokens = [
            tok("O", 0, 0),
            tok("O", 0, 4),
            tok("B-APPLICANT_NAME", 5, 9),
            tok("I-APPLICANT_NAME", 10, 15),
            tok("O", 16, 19),
            tok("B-DOB", 20, 22),
            tok("I-DOB", 22, 30),
            tok("O", 0, 0),
        ];
        assert_eq!(
            decode_bio(text, &tokens),
            vec![
                Entity::new("APPLICANT_NAME", "JOHN SMITH"),
                Entity::new("DOB", "01/02/1980"),
            ]
        );
    }

    #[test]
    fn test_decode_bio_label_change_and_bare_tags() {
        let text = "K123 ACME";
        let tokens = [tok("DLN", 0, 4), tok("I-COURT", 5, 9)];
        assert_eq!(
            decode_bio(text, &tokens),
            vec![Entity::new("DLN", "K123"), Entity::new("COURT", "ACME")]
        );

        let tokens = [tok("B-DLN", 0, 2), tok("B-DLN", 2, 4)];
        assert_eq!(
            decode_bio(text, &tokens),
            vec![Entity::new("DLN", "K1"), Entity::new("DLN", "23")]
        );
    }

    #[test]
    fn test_read_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "O\nB-DOB\n\nI-DOB\n").unwrap();
        assert_eq!(read_labels(&path).unwrap(), vec!["O", "B-DOB", "I-DOB"]);

        std::fs::write(&path, "\n \n").unwrap();
        assert!(read_labels(&path).is_err());
    }
}
