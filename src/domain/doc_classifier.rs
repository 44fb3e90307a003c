//! Heuristic document type classification from recognized text.

use crate::core::errors::FormResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Form codes such as `DC-123`, `DC 4567` or `DC123`.
pub const DEFAULT_CODE_PATTERN: &str = r"DC[-\s]?\d{3,4}";

static DEFAULT_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_CODE_PATTERN).expect("Invalid form code regex"));

/// Titles that appear on the targeted forms.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Health Questionnaire",
    "Driver Wellness & Safety",
    "MOTOR VEHICLE ADMINISTRATION",
];

/// Score from which a page counts as a targeted form.
const TARGET_SCORE: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub is_target_type: bool,
    /// The first form code found on the page.
    pub document_name: Option<String>,
}

/// Scores fragments by form codes (+2 each) and title keywords (+1 each).
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    code_pattern: Regex,
    keywords: Vec<String>,
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self {
            code_pattern: DEFAULT_CODE_REGEX.clone(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl SignatureClassifier {
    /// Creates a classifier with a custom code pattern and keyword list.
    pub fn new(code_pattern: &str, keywords: Vec<String>) -> FormResult<Self> {
        Ok(Self {
            code_pattern: Regex::new(code_pattern)?,
            keywords,
        })
    }

    pub fn classify(&self, fragments: &[String]) -> DocumentClassification {
        let mut score = 0u32;
        let mut document_name = None;

        for fragment in fragments {
            if let Some(found) = self.code_pattern.find(fragment) {
                score += 2;
                document_name.get_or_insert_with(|| found.as_str().to_string());
            }
            score += self
                .keywords
                .iter()
                .filter(|keyword| fragment.contains(keyword.as_str()))
                .count() as u32;
        }

        DocumentClassification {
            is_target_type: score >= TARGET_SCORE,
            document_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_code_alone_is_enough() {
        let result = SignatureClassifier::default().classify(&fragments(&["Form DC-123 rev 2"]));
        assert_eq!(
            result,
            DocumentClassification {
                is_target_type: true,
                document_name: Some("DC-123".to_string()),
            }
        );
    }

    #[test]
    fn test_one_keyword_is_not_enough() {
        let result =
            SignatureClassifier::default().classify(&fragments(&["Health Questionnaire"]));
        assert!(!result.is_target_type);
        assert_eq!(result.document_name, None);
    }

    #[test]
    fn test_two_keywords_reach_threshold() {
        let result = SignatureClassifier::default().classify(&fragments(&[
            "MOTOR VEHICLE ADMINISTRATION",
            "Driver Wellness & Safety Program",
        ]));
        assert!(result.is_target_type);
        assert_eq!(result.document_name, None);
    }

    #[test]
    fn test_first_code_wins() {
        let result = SignatureClassifier::default()
            .classify(&fragments(&["NAME", "DC 4567", "DC-890"]));
        assert_eq!(result.document_name.as_deref(), Some("DC 4567"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            SignatureClassifier::default().classify(&[]),
            DocumentClassification::default()
        );
    }
}
