use crate::error::Result;
use crate::index::KnowledgeIndex;
use crate::store::{digest_hex, ContentStore};
use crate::types::{
    DocumentRecord, Hit, InteractionEntry, KnowledgeRecord, KnowledgeStats, RecordKind,
    ScoredResult,
};
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_QUERY_LIMIT: usize = 10;

const DOCUMENTS_DIR: &str = "documents";
const MEMORY_DIR: &str = "memory";

const SNIPPET_CHARS: usize = 200;

const QUERY_WEIGHT: u32 = 3;
const RESPONSE_WEIGHT: u32 = 2;
const SUMMARY_WEIGHT: u32 = 4;
const DOCUMENT_WEIGHT: u32 = 1;

/// The knowledge base: stored records, uploaded documents and their index
pub struct KnowledgeStore {
    root: ContentStore,
    documents: ContentStore,
    memory: ContentStore,
    index: KnowledgeIndex,
}

impl KnowledgeStore {
    /// Open (or create) a knowledge base rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let root = ContentStore::open(dir)?;
        let documents = ContentStore::open(root.root().join(DOCUMENTS_DIR))?;
        let memory = ContentStore::open(root.root().join(MEMORY_DIR))?;
        let index = KnowledgeIndex::init(root.clone())?;

        debug!(path = %root.root().display(), "Knowledge store opened");

        Ok(Self {
            root,
            documents,
            memory,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        self.root.root()
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Record a query/response exchange. Returns the new record id.
    pub fn record_interaction(
        &self,
        query: &str,
        response: &str,
        metadata: Map<String, Value>,
    ) -> Result<String> {
        let mut fields = metadata;
        fields.insert("query".to_string(), Value::String(query.to_string()));
        fields.insert("response".to_string(), Value::String(response.to_string()));

        self.add_record(RecordKind::Interaction, fields)
    }

    /// Store an arbitrary JSON object. Its `type` key, if any, becomes the record kind.
    pub fn add_knowledge(&self, mut data: Map<String, Value>) -> Result<String> {
        let kind = data
            .remove("type")
            .and_then(|v| v.as_str().map(str::to_string))
            .map(RecordKind::from)
            .unwrap_or(RecordKind::General);

        self.add_record(kind, data)
    }

    /// Persist a new record and append it to the index.
    ///
    /// Ids cover the timestamp, so repeated content still gets a fresh id; if
    /// the id is already taken the timestamp is bumped until it is not.
    pub fn add_record(&self, kind: RecordKind, mut fields: Map<String, Value>) -> Result<String> {
        for key in KnowledgeRecord::RESERVED_KEYS {
            fields.remove(key);
        }

        let record = self.index.update(|index| {
            let mut record = KnowledgeRecord {
                id: String::new(),
                kind,
                timestamp: Utc::now(),
                fields,
            };

            loop {
                record.id = digest_hex(&record.canonical_bytes()?);
                if !self.memory.contains(&record_key(&record.id))? {
                    break;
                }
                record.timestamp = Utc::now().max(record.timestamp + Duration::nanoseconds(1));
            }

            self.memory
                .put(&record_key(&record.id), &serde_json::to_vec_pretty(&record)?)?;

            index.interactions.push(InteractionEntry {
                id: record.id.clone(),
                timestamp: record.timestamp,
                kind: record.kind.clone(),
                summary: record.summary().to_string(),
            });

            Ok(record)
        })?;

        info!(id = %record.id, kind = %record.kind, "Added knowledge");
        Ok(record.id)
    }

    /// Fetch a record. Records missing from the index are not visible.
    pub fn get_record(&self, id: &str) -> Result<Option<KnowledgeRecord>> {
        let index = self.index.load()?;
        if !index.interactions.iter().any(|entry| entry.id == id) {
            return Ok(None);
        }
        self.read_record(id)
    }

    /// Most recent index entries, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<InteractionEntry>> {
        let index = self.index.load()?;
        Ok(index.interactions.into_iter().rev().take(limit).collect())
    }

    fn read_record(&self, id: &str) -> Result<Option<KnowledgeRecord>> {
        match self.memory.get(&record_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Store a document by content. Re-uploading identical bytes keeps the id
    /// and replaces the metadata.
    pub fn add_document(
        &self,
        filename: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<String> {
        let id = digest_hex(content);

        if !self.documents.contains(&id)? {
            self.documents.put(&id, content)?;
        }

        let text = if is_text_like(content_type) {
            match std::str::from_utf8(content) {
                Ok(text) if !text.is_empty() => Some(text),
                Ok(_) => None,
                Err(e) => {
                    warn!(id = %id, filename, error = %e, "Could not extract text from document");
                    None
                }
            }
        } else {
            None
        };

        self.index.update(|index| {
            let text_key = text_key(&id);
            match text {
                Some(text) => self.documents.put(&text_key, text.as_bytes())?,
                None => {
                    self.documents.delete(&text_key)?;
                }
            }

            index.documents.insert(
                id.clone(),
                DocumentRecord {
                    id: id.clone(),
                    filename: filename.to_string(),
                    content_type: content_type.to_string(),
                    size_bytes: content.len() as u64,
                    added_at: Utc::now(),
                    has_extracted_text: text.is_some(),
                },
            );
            Ok(())
        })?;

        info!(id = %id, filename, size = content.len(), "Added document");
        Ok(id)
    }

    /// Location and metadata of a stored document.
    ///
    /// Returns `None` when the id is unknown or its file has gone missing.
    pub fn get_document(&self, id: &str) -> Result<Option<(PathBuf, DocumentRecord)>> {
        let mut index = self.index.load()?;
        let Some(record) = index.documents.remove(id) else {
            return Ok(None);
        };

        let path = self.documents.path(id)?;
        if !path.is_file() {
            warn!(id, "Indexed document is missing on disk");
            return Ok(None);
        }

        Ok(Some((path, record)))
    }

    /// Documents in id order
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.index.load()?.documents.into_values().collect())
    }

    // =========================================================================
    // Query and stats
    // =========================================================================

    /// Case-insensitive substring search over every record and every
    /// document with extracted text.
    ///
    /// Records score 3 for a match in `query`, 2 in `response` and 4 in
    /// `summary`; a document match scores 1. Results are sorted by score,
    /// ties keep scan order (records in index order, then documents).
    /// This is a full scan on every call.
    pub fn query(&self, text: &str, limit: usize) -> Result<Vec<ScoredResult>> {
        let needle = text.to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let index = self.index.load()?;
        let mut results = Vec::new();

        for entry in &index.interactions {
            let record = match self.read_record(&entry.id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(id = %entry.id, "Indexed record is missing on disk");
                    continue;
                }
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "Skipping unreadable record");
                    continue;
                }
            };

            let score = score_record(&record, &needle);
            if score > 0 {
                results.push(ScoredResult {
                    id: record.id.clone(),
                    score,
                    hit: Hit::Record { record },
                });
            }
        }

        for (id, doc) in &index.documents {
            if !doc.has_extracted_text {
                continue;
            }

            let text = match self.documents.get(&text_key(id)) {
                Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(None) => continue,
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable document text");
                    continue;
                }
            };

            if text.to_lowercase().contains(&needle) {
                results.push(ScoredResult {
                    id: id.clone(),
                    score: DOCUMENT_WEIGHT,
                    hit: Hit::Document {
                        filename: doc.filename.clone(),
                        snippet: text.chars().take(SNIPPET_CHARS).collect(),
                    },
                });
            }
        }

        // Stable: equal scores keep scan order
        results.sort_by(|a, b| b.score.cmp(&a.score));
        results.truncate(limit);

        debug!(query = %text, hits = results.len(), "Query complete");
        Ok(results)
    }

    pub fn stats(&self) -> Result<KnowledgeStats> {
        let index = self.index.load()?;

        Ok(KnowledgeStats {
            document_count: index.documents.len(),
            interaction_count: index.interactions.len(),
            last_updated: index.last_updated,
            total_storage_bytes: self.root.size_bytes(),
        })
    }
}

fn score_record(record: &KnowledgeRecord, needle: &str) -> u32 {
    let matches = |field: &str| {
        record
            .text_field(field)
            .is_some_and(|value| value.to_lowercase().contains(needle))
    };

    let mut score = 0;
    if matches("query") {
        score += QUERY_WEIGHT;
    }
    if matches("response") {
        score += RESPONSE_WEIGHT;
    }
    if matches("summary") {
        score += SUMMARY_WEIGHT;
    }
    score
}

fn is_text_like(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json" | "application/xml" | "application/javascript" | "application/x-yaml"
        )
}

fn record_key(id: &str) -> String {
    format!("{}.json", id)
}

fn text_key(id: &str) -> String {
    format!("{}.txt", id)
}
