//! Corpus directory scanning and document loading.
//!
//! A document is one file under `corpus/<kind>/`, identified by its
//! corpus-relative path. Factual memory is markdown or plain text; example
//! and rule memory are JSON files each holding an array of records.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::{StoreError, StoreResult};
use crate::fingerprint;
use crate::models::MemoryKind;

/// A document observed on disk during a scan.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub fingerprint: String,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A document loaded and fingerprinted for indexing.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub kind: MemoryKind,
    pub path: String,
    pub content: String,
    pub fingerprint: String,
}

/// One prompt/response pair in an example memory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    pub prompt: String,
    pub response: String,
}

/// One named rule in a rule memory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub name: String,
    pub body: String,
}

pub fn allowed_extension(kind: MemoryKind, path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match kind {
        MemoryKind::Factual => matches!(ext, "md" | "txt"),
        MemoryKind::Example | MemoryKind::Rule => ext == "json",
    }
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|name| name.starts_with('.'))
        })
        .unwrap_or(false)
}

fn relative_id(root: &Path, path: &Path) -> StoreResult<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| StoreError::State(format!("path escapes corpus root: {}", path.display())))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

/// Scan one corpus directory, fingerprinting every eligible file. A missing
/// directory is an empty corpus, not an error.
pub async fn scan_corpus(
    kind: MemoryKind,
    root: &Path,
) -> StoreResult<BTreeMap<String, ScannedDocument>> {
    let mut documents = BTreeMap::new();
    if !root.exists() {
        return Ok(documents);
    }

    for entry in WalkDir::new(root).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !allowed_extension(kind, path) || is_hidden(root, path) {
            continue;
        }

        let bytes = tokio::fs::read(path).await?;
        let modified_at = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::<Utc>::from);

        documents.insert(
            relative_id(root, path)?,
            ScannedDocument {
                fingerprint: fingerprint::fingerprint_bytes(&bytes),
                modified_at,
            },
        );
    }

    Ok(documents)
}

/// Load one document and fingerprint the content as loaded, so the cache
/// records exactly what was handed to the indexer.
pub async fn load_document(
    kind: MemoryKind,
    root: &Path,
    rel_path: &str,
) -> StoreResult<SourceDocument> {
    let content = tokio::fs::read_to_string(root.join(rel_path)).await?;
    let fingerprint = fingerprint::fingerprint_str(&content);
    Ok(SourceDocument {
        kind,
        path: rel_path.to_string(),
        content,
        fingerprint,
    })
}

/// Combined digest over the whole corpus, stable for identical content.
pub async fn corpus_digest(kind: MemoryKind, root: &Path) -> StoreResult<String> {
    let scanned = scan_corpus(kind, root).await?;
    Ok(fingerprint::combine_digests(
        scanned.values().map(|doc| doc.fingerprint.as_str()),
    ))
}

/// Parse an example memory file: a JSON array of `{prompt, response}`
/// objects. Anything else is an invalid document.
pub fn parse_example_file(raw: &str) -> StoreResult<Vec<ExampleRecord>> {
    serde_json::from_str(raw).map_err(|e| {
        StoreError::InvalidDocument(format!(
            "expected a JSON array of {{prompt, response}} objects: {e}"
        ))
    })
}

/// Parse a rule memory file: a JSON array of `{name, body}` objects.
pub fn parse_rule_file(raw: &str) -> StoreResult<Vec<RuleRecord>> {
    serde_json::from_str(raw).map_err(|e| {
        StoreError::InvalidDocument(format!("expected a JSON array of {{name, body}} objects: {e}"))
    })
}
