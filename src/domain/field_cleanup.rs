//! Per-field removal of label text that OCR and entity recognition leave behind.

use crate::core::errors::{FormError, FormResult};
use crate::domain::key_value::KeyValueMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// Built-in cleanup patterns, keyed by entity label.
///
/// The alternations include common OCR misreadings of the printed labels.
pub const DEFAULT_CLEANUP_PATTERNS: &[(&str, &str)] = &[
    (
        "APPLICANT_NAME",
        r"(:|FIRST|Last|MIDDLE|NAME|MIDDIEE|MIDDIE|DRIVER|MIDDIT\s*)",
    ),
    (
        "DLN",
        r"(\bDLN\b|DL|:|DRIVER|NO|LICENSE|IDENTIFICATION|NUMBER|DENTIFIC|ATION|LICRNSE|NUMRER|NUMABR|DLN|LICENSF)\s*",
    ),
    ("DOB", r"(DATE|OF|BIRTH|RIRTH|Gt|NATE|:|DOB|RIRTII|SEX)\s*"),
    (
        "DOC_DATE",
        r"(TODAY'S|:|PRINT|DATE|OF|ISSUE|TORAYS|TODAYS|TONAYS|DATT)\s*",
    ),
    ("DOC_NAME", r"[\(\)]"),
    (
        "CITATION_DATE",
        r"(CITATION|DATE|:|CONVICTION|NY|REF|ID|COURT|REPORT)\s*",
    ),
    (
        "CONVICTION_DATE",
        r"(CITATION|DATE|:|CONVICTION|NY|REF|ID|COURT|REPORT|CONV)\s*",
    ),
    (
        "NY REF ID",
        r"(CITATION|DATE|:|CONVICTION|NY|REF|ID|COURT|REPORT)\s*",
    ),
    (
        "COURT REPORT ID",
        r"(:|ID|ENTIFIER|COURT|REPORT|ACD|CODE|DETAIL)\s*",
    ),
    ("CONVICTION REASON", r"(REASON|OF|FOR|CONVICTION)\s*"),
];

/// Case-insensitive cleanup patterns applied to extracted values.
#[derive(Debug, Clone)]
pub struct FieldCleanup {
    patterns: BTreeMap<String, Regex>,
}

static DEFAULT_PATTERNS: Lazy<BTreeMap<String, Regex>> = Lazy::new(|| {
    DEFAULT_CLEANUP_PATTERNS
        .iter()
        .map(|(label, pattern)| {
            let regex = compile(label, pattern).expect("Invalid built-in cleanup regex");
            (label.to_string(), regex)
        })
        .collect()
});

impl Default for FieldCleanup {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl FieldCleanup {
    /// Adds or replaces patterns on top of the built-in table.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> FormResult<Self> {
        for (label, pattern) in overrides {
            self.patterns.insert(label.clone(), compile(label, pattern)?);
        }
        Ok(self)
    }

    /// Removes every match of the label's pattern and trims, for each label in the map
    /// that has a pattern. Other labels are left untouched.
    pub fn apply(&self, fields: &mut KeyValueMap) {
        for (label, value) in fields.iter_mut() {
            if let Some(regex) = self.patterns.get(label) {
                *value = regex.replace_all(value, "").trim().to_string();
            }
        }
    }
}

fn compile(label: &str, pattern: &str) -> FormResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| FormError::config_error(format!("invalid cleanup pattern for '{label}': {e}")))
}
