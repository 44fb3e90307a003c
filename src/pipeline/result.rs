//! Result types for single images and batches.

use crate::domain::{DocumentClassification, KeyValueMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// The outcome for one input image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// File name of the image, without its directory.
    pub image_filename: String,
    /// Extracted fields; empty when any stage failed.
    pub key_value_pairs: KeyValueMap,
    /// Why the image produced no fields, when the failure happened outside the pipeline
    /// (impersonation, worker process, panic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageRecord {
    pub fn new(image_filename: impl Into<String>, key_value_pairs: KeyValueMap) -> Self {
        Self {
            image_filename: image_filename.into(),
            key_value_pairs,
            error: None,
        }
    }

    /// A record with an empty map and the given error message.
    pub fn failed(image_filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            image_filename: image_filename.into(),
            key_value_pairs: KeyValueMap::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Records of the images found directly in one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderResult {
    pub folder_name: String,
    pub images: Vec<ImageRecord>,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub folders: Vec<FolderResult>,
    pub image_count: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BatchReport {
    /// Number of records carrying an error.
    pub fn failed_count(&self) -> usize {
        self.folders
            .iter()
            .flat_map(|f| &f.images)
            .filter(|r| r.is_failed())
            .count()
    }

    /// The shape returned to callers: `{ folder_name: [ { image_filename,
    /// key_value_pairs }, .. ] }`.
    ///
    /// Folders sharing a name are concatenated under one key.
    pub fn to_caller_json(&self) -> Value {
        let mut out = Map::new();
        for folder in &self.folders {
            let entry = out
                .entry(folder.folder_name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.extend(
                    folder
                        .images
                        .iter()
                        .filter_map(|record| serde_json::to_value(record).ok()),
                );
            }
        }
        Value::Object(out)
    }
}

/// Detailed outcome of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageAnalysis {
    pub key_values: KeyValueMap,
    pub classification: DocumentClassification,
    pub region_count: usize,
    pub fragment_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> KeyValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_record_omits_absent_error() {
        let record = ImageRecord::new("a.png", fields(&[("DOB", "01/02/1980")]));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"image_filename": "a.png", "key_value_pairs": {"DOB": "01/02/1980"}})
        );

        let failed = ImageRecord::failed("b.png", "logon failed");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"image_filename": "b.png", "key_value_pairs": {}, "error": "logon failed"})
        );
    }

    #[test]
    fn test_caller_json_groups_by_folder() {
        let report = BatchReport {
            folders: vec![
                FolderResult {
                    folder_name: "scans".to_string(),
                    images: vec![ImageRecord::new("1.png", fields(&[("DLN", "K1")]))],
                },
                FolderResult {
                    folder_name: "2024".to_string(),
                    images: vec![ImageRecord::failed("2.tif", "worker exited")],
                },
                FolderResult {
                    folder_name: "scans".to_string(),
                    images: vec![ImageRecord::new("3.jpg", KeyValueMap::new())],
                },
            ],
            image_count: 3,
            elapsed: Duration::from_millis(1500),
        };

        assert_eq!(report.failed_count(), 1);
        assert_eq!(
            report.to_caller_json(),
            json!({
                "scans": [
                    {"image_filename": "1.png", "key_value_pairs": {"DLN": "K1"}},
                    {"image_filename": "3.jpg", "key_value_pairs": {}}
                ],
                "2024": [
                    {"image_filename": "2.tif", "key_value_pairs": {}, "error": "worker exited"}
                ]
            })
        );

        let report_json = serde_json::to_value(&report).unwrap();
        assert_eq!(report_json["elapsed"], json!(1.5));
        assert_eq!(report_json["image_count"], json!(3));
    }
}
