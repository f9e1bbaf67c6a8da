use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source coordinates of an exported record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub offset: i64,
    pub partition: i32,
}

/// One line of an export file: a raw log record plus where it came from.
///
/// Import republishes `key`, `value`, and `headers` verbatim onto the
/// partition recorded in `metadata`. Preserving the partition is mandatory:
/// it is what reproduces per-chat ordering on the target cluster.
///
/// Headers use a `BTreeMap` so exported lines are byte-stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRecord {
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub key: String,
    pub value: serde_json::Value,
}

impl ExportedRecord {
    /// Render as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse one line of an export file.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_round_trip() {
        let record = ExportedRecord {
            metadata: RecordMetadata {
                offset: 41,
                partition: 3,
            },
            headers: BTreeMap::from([
                ("name".to_string(), "MessageCreated".to_string()),
                ("created_at".to_string(), "2025-06-01T12:00:00Z".to_string()),
            ]),
            key: "17".to_string(),
            value: serde_json::json!({"chatId": 17, "id": 1}),
        };
        let line = record.to_line().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(ExportedRecord::from_line(&line).unwrap(), record);
    }

    #[test]
    fn matches_the_documented_shape() {
        let line = r#"{"metadata":{"offset":0,"partition":1},"headers":{"name":"ChatCreated"},"key":"5","value":{"chatId":5,"title":"x"}}"#;
        let record = ExportedRecord::from_line(line).unwrap();
        assert_eq!(record.metadata.partition, 1);
        assert_eq!(record.key, "5");
        assert_eq!(record.headers["name"], "ChatCreated");
        assert_eq!(record.value["title"], "x");
    }

    #[test]
    fn missing_headers_default_to_empty() {
        let line = r#"{"metadata":{"offset":9,"partition":0},"key":"1","value":{}}"#;
        let record = ExportedRecord::from_line(line).unwrap();
        assert!(record.headers.is_empty());
    }
}
