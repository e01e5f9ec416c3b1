use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// What a knowledge record describes. Stored as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    Interaction,
    General,
    Other(String),
}

impl From<String> for RecordKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "interaction" => RecordKind::Interaction,
            "general" | "" => RecordKind::General,
            _ => RecordKind::Other(s),
        }
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Interaction => write!(f, "interaction"),
            RecordKind::General => write!(f, "general"),
            RecordKind::Other(s) => write!(f, "{}", s),
        }
    }
}

/// An immutable entry in the knowledge base.
///
/// Recognized field keys are `query`, `response` and `summary`; anything else
/// the caller supplies is carried along verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl KnowledgeRecord {
    pub const RESERVED_KEYS: [&'static str; 4] = ["id", "kind", "timestamp", "type"];

    /// String value of a field, if present and a string
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn summary(&self) -> &str {
        self.text_field("summary").unwrap_or("")
    }

    /// Sorted-key serialization of everything except the id
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut canonical: BTreeMap<&str, Value> = BTreeMap::new();
        canonical.insert("kind", Value::String(self.kind.to_string()));
        canonical.insert("timestamp", serde_json::to_value(self.timestamp)?);
        canonical.insert("fields", canonicalize(&Value::Object(self.fields.clone())));
        serde_json::to_vec(&canonical)
    }
}

// Rebuilds nested objects with sorted keys regardless of serde_json's map backend
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Metadata for an uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub added_at: DateTime<Utc>,
    pub has_extracted_text: bool,
}

/// Index summary of a stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    #[serde(default)]
    pub summary: String,
}

/// What a query matched
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hit {
    Record {
        record: KnowledgeRecord,
    },
    Document {
        filename: String,
        snippet: String,
    },
}

/// Query result with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub id: String,
    pub score: u32,
    #[serde(flatten)]
    pub hit: Hit,
}

/// Statistics about the knowledge base
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub document_count: usize,
    pub interaction_count: usize,
    pub last_updated: DateTime<Utc>,
    pub total_storage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trips_as_string() {
        let kinds = [
            RecordKind::Interaction,
            RecordKind::General,
            RecordKind::Other("tts_request".to_string()),
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            let back: RecordKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
        assert_eq!(serde_json::to_string(&RecordKind::Interaction).unwrap(), "\"interaction\"");
    }

    #[test]
    fn test_canonical_bytes_ignore_field_order() {
        let timestamp = Utc::now();
        let mut a = Map::new();
        a.insert("query".into(), json!("q"));
        a.insert("nested".into(), json!({"b": 1, "a": 2}));
        let mut b = Map::new();
        b.insert("nested".into(), json!({"a": 2, "b": 1}));
        b.insert("query".into(), json!("q"));

        let rec_a = KnowledgeRecord {
            id: String::new(),
            kind: RecordKind::General,
            timestamp,
            fields: a,
        };
        let rec_b = KnowledgeRecord {
            id: "ignored".into(),
            kind: RecordKind::General,
            timestamp,
            fields: b,
        };

        assert_eq!(rec_a.canonical_bytes().unwrap(), rec_b.canonical_bytes().unwrap());
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut fields = Map::new();
        fields.insert("summary".into(), json!("greeting"));
        let record = KnowledgeRecord {
            id: "abc".into(),
            kind: RecordKind::Interaction,
            timestamp: Utc::now(),
            fields,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["summary"], "greeting");
        assert_eq!(value["kind"], "interaction");

        let back: KnowledgeRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.summary(), "greeting");
    }
}
