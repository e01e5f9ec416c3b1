use super::{open_config, open_knowledge};
use crate::cache::AudioCache;
use crate::config::{AgentConfig, DATA_DIR};
use crate::knowledge::KnowledgeStore;
use crate::types::{Hit, ScoredResult};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Run the init command
pub fn run_init(path: &str) -> Result<(), String> {
    let data_path = Path::new(path).join(DATA_DIR);

    if data_path.exists() {
        return Err(format!(
            "{} already exists at {}",
            DATA_DIR,
            data_path.display()
        ));
    }

    fs::create_dir_all(&data_path)
        .map_err(|e| format!("Failed to create {} directory: {}", DATA_DIR, e))?;

    let config = AgentConfig::new(data_path);
    AudioCache::open(config.cache_dir(), config.cache_ttl())
        .map_err(|e| format!("Failed to create cache: {}", e))?;
    open_knowledge(&config)?;

    println!("Initialized {} at {}", DATA_DIR, config.data_path().display());

    Ok(())
}

/// Run the record command
pub fn run_record(
    query: &str,
    response: &str,
    summary: Option<&str>,
    meta: &[String],
) -> Result<(), String> {
    let kb = open()?;

    let mut metadata = parse_meta(meta)?;
    if let Some(s) = summary {
        metadata.insert("summary".to_string(), Value::String(s.to_string()));
    }

    let id = kb
        .record_interaction(query, response, metadata)
        .map_err(|e| format!("Failed to record interaction: {}", e))?;

    println!("Recorded [{}]", id);
    Ok(())
}

/// Run the add command
pub fn run_add(json: &str) -> Result<(), String> {
    let kb = open()?;

    let data = match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err("Knowledge must be a JSON object".to_string()),
        Err(e) => return Err(format!("Invalid JSON: {}", e)),
    };

    let id = kb
        .add_knowledge(data)
        .map_err(|e| format!("Failed to add knowledge: {}", e))?;

    println!("Added [{}]", id);
    Ok(())
}

/// Run the upload command
pub fn run_upload(file: &str, content_type: Option<&str>) -> Result<(), String> {
    let kb = open()?;
    let path = Path::new(file);

    let content = fs::read(path).map_err(|e| format!("Failed to read {}: {}", file, e))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("Not a file: {}", file))?;
    let content_type = content_type
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());

    let id = kb
        .add_document(filename, &content, &content_type)
        .map_err(|e| format!("Failed to add document: {}", e))?;

    println!("Uploaded {} [{}]", filename, id);
    println!("  type: {}", content_type);
    println!("  size: {} bytes", content.len());

    Ok(())
}

/// Run the document command
pub fn run_document(id: &str, output: Option<&str>) -> Result<(), String> {
    let kb = open()?;

    let (path, doc) = kb
        .get_document(id)
        .map_err(|e| format!("Failed to get document: {}", e))?
        .ok_or_else(|| format!("Document not found: {}", id))?;

    match output {
        Some(out) => {
            fs::copy(&path, out).map_err(|e| format!("Failed to write {}: {}", out, e))?;
            println!("Wrote {} to {}", doc.filename, out);
        }
        None => {
            println!("[{}] {}", doc.id, doc.filename);
            println!("    type:  {}", doc.content_type);
            println!("    size:  {} bytes", doc.size_bytes);
            println!("    added: {}", doc.added_at.to_rfc3339());
            let text = if doc.has_extracted_text { "yes" } else { "no" };
            println!("    text:  {}", text);
            println!("    path:  {}", path.display());
        }
    }

    Ok(())
}

/// Run the show command
pub fn run_show(id: &str) -> Result<(), String> {
    let kb = open()?;

    let record = kb
        .get_record(id)
        .map_err(|e| format!("Failed to get record: {}", e))?
        .ok_or_else(|| format!("Record not found: {}", id))?;

    let out = serde_json::to_string_pretty(&record)
        .map_err(|e| format!("Failed to serialize: {}", e))?;
    println!("{}", out);

    Ok(())
}

/// Run the query command
pub fn run_query(text: &str, limit: usize, json: bool) -> Result<(), String> {
    if text.is_empty() {
        return Err("Query is required".to_string());
    }

    let kb = open()?;
    let results = kb
        .query(text, limit)
        .map_err(|e| format!("Failed to query: {}", e))?;

    if json {
        let out = serde_json::to_string_pretty(&results)
            .map_err(|e| format!("Failed to serialize: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching knowledge.");
        return Ok(());
    }

    for r in &results {
        print_result(r);
    }

    Ok(())
}

/// Run the list command
pub fn run_list(limit: usize) -> Result<(), String> {
    let kb = open()?;

    let recent = kb
        .recent(limit)
        .map_err(|e| format!("Failed to list records: {}", e))?;
    let docs = kb
        .documents()
        .map_err(|e| format!("Failed to list documents: {}", e))?;

    if recent.is_empty() && docs.is_empty() {
        println!("Knowledge base is empty.");
        return Ok(());
    }

    if !recent.is_empty() {
        println!("Recent records:\n");
        for entry in recent {
            println!(
                "[{}] {} {}",
                entry.id,
                entry.kind,
                entry.timestamp.format("%Y-%m-%d %H:%M")
            );
            if !entry.summary.is_empty() {
                println!("    {}", entry.summary);
            }
        }
        println!();
    }

    if !docs.is_empty() {
        println!("Documents:\n");
        for doc in docs {
            println!(
                "[{}] {} ({}, {} bytes)",
                doc.id, doc.filename, doc.content_type, doc.size_bytes
            );
        }
    }

    Ok(())
}

/// Run the stats command
pub fn run_stats() -> Result<(), String> {
    let kb = open()?;
    let stats = kb.stats().map_err(|e| format!("Failed to get stats: {}", e))?;

    println!("Knowledge Statistics");
    println!("====================\n");

    println!("Documents:    {}", stats.document_count);
    println!("Interactions: {}", stats.interaction_count);
    println!("Updated:      {}", stats.last_updated.to_rfc3339());
    println!("Storage:      {} KB", stats.total_storage_bytes / 1024);
    println!("Path:         {}", kb.path().display());

    Ok(())
}

fn open() -> Result<KnowledgeStore, String> {
    let config = open_config()?;
    open_knowledge(&config)
}

/// Parse `key=value` pairs. Values that are valid JSON keep their type.
fn parse_meta(pairs: &[String]) -> Result<Map<String, Value>, String> {
    let mut map = Map::new();

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Metadata must be key=value: {}", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Metadata key is empty: {}", pair));
        }

        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }

    Ok(map)
}

fn print_result(r: &ScoredResult) {
    match &r.hit {
        Hit::Record { record } => {
            println!("[{}] score: {}, {}", r.id, r.score, record.kind);
            if let Some(query) = record.text_field("query") {
                println!("    query:    {}", preview(query));
            }
            if let Some(response) = record.text_field("response") {
                println!("    response: {}", preview(response));
            }
            if !record.summary().is_empty() {
                println!("    summary:  {}", preview(record.summary()));
            }
        }
        Hit::Document { filename, snippet } => {
            println!("[{}] score: {}, document {}", r.id, r.score, filename);
            println!("    {}", preview(snippet));
        }
    }
    println!();
}

// Truncate content for display
fn preview(text: &str) -> String {
    let preview: String = text.chars().take(120).collect();
    let preview = if text.chars().count() > 120 {
        format!("{}...", preview)
    } else {
        preview
    };
    preview.replace('\n', " ")
}
