use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de};

use crate::errors::{StoreError, StoreResult};

// ─────────────────────────────────────────────────────────────────────────────
// Memory kinds
// ─────────────────────────────────────────────────────────────────────────────

/// The three typed corpora the store indexes. Each kind has its own corpus
/// directory, its own cache arena, and its own record count on a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Factual,
    Example,
    Rule,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Factual => "factual",
            MemoryKind::Example => "example",
            MemoryKind::Rule => "rule",
        }
    }

    pub fn all() -> [MemoryKind; 3] {
        [MemoryKind::Factual, MemoryKind::Example, MemoryKind::Rule]
    }

    /// Structured kinds hold JSON record files; factual memory holds prose.
    pub fn is_structured(&self) -> bool {
        matches!(self, MemoryKind::Example | MemoryKind::Rule)
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "factual" => Ok(MemoryKind::Factual),
            "example" => Ok(MemoryKind::Example),
            "rule" => Ok(MemoryKind::Rule),
            other => Err(format!("unknown memory kind: {}", other)),
        }
    }
}

/// Identity of one document: its kind plus its corpus-relative path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub kind: MemoryKind,
    pub path: String,
}

impl DocumentKey {
    pub fn new(kind: MemoryKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Build cache entries and change sets
// ─────────────────────────────────────────────────────────────────────────────

/// One build cache row. Present iff the document was successfully indexed;
/// the fingerprint is of the content that was actually sent to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub indexed_at: DateTime<Utc>,
}

/// Result of diffing one corpus directory against its cache arena.
/// Paths are corpus-relative and sorted; the three lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Version identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Version id in the form `v{seq}_{YYYYMMDD}_{HHMMSS}` (UTC). Ordering is
/// by sequence number; the timestamp part is for humans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    seq: u64,
    stamp: String,
}

impl VersionId {
    pub fn mint(seq: u64, at: DateTime<Utc>) -> Self {
        Self {
            seq,
            stamp: at.format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}_{}", self.seq, self.stamp)
    }
}

impl FromStr for VersionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('v')
            .ok_or_else(|| format!("expected v<seq>_<date>_<time>, got: {}", s))?;
        let (seq_part, stamp) = rest
            .split_once('_')
            .ok_or_else(|| format!("expected v<seq>_<date>_<time>, got: {}", s))?;
        let seq: u64 = seq_part
            .parse()
            .map_err(|_| format!("bad sequence number in version id: {}", s))?;

        let bytes = stamp.as_bytes();
        let stamp_ok = bytes.len() == 15
            && bytes[8] == b'_'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 8 || b.is_ascii_digit());
        if !stamp_ok {
            return Err(format!("bad timestamp in version id: {}", s));
        }

        Ok(Self {
            seq,
            stamp: stamp.to_string(),
        })
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.stamp.cmp(&other.stamp))
    }
}

impl Serialize for VersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Version registry entries
// ─────────────────────────────────────────────────────────────────────────────

/// One row in the append-only version registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: VersionId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub active: bool,
    /// Record counts per corpus, read live from the indexer at creation.
    #[serde(default)]
    pub record_counts: BTreeMap<MemoryKind, u64>,
    /// Combined digest of the corpus source files per kind at creation.
    #[serde(default)]
    pub source_digests: BTreeMap<MemoryKind, String>,
    /// Snapshot directory name under snapshots/, or None once cleaned up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<String>,
}

impl VersionEntry {
    pub fn total_records(&self) -> u64 {
        self.record_counts.values().sum()
    }
}

/// Per-kind record count movement between two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDelta {
    pub before: u64,
    pub after: u64,
}

impl CountDelta {
    pub fn delta(&self) -> i64 {
        self.after as i64 - self.before as i64
    }
}

/// Comparison of two registry entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub from: VersionId,
    pub to: VersionId,
    pub from_created_at: DateTime<Utc>,
    pub to_created_at: DateTime<Utc>,
    pub record_counts: BTreeMap<MemoryKind, CountDelta>,
    /// True where the corpus source digest differs between the two versions.
    pub source_changed: BTreeMap<MemoryKind, bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Rebuild reports
// ─────────────────────────────────────────────────────────────────────────────

/// One document that failed during a rebuild, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub path: String,
    pub reason: String,
}

/// What happened to one corpus during a rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusReport {
    pub changes: ChangeSet,
    pub indexed: usize,
    pub removed: usize,
    pub failures: Vec<IndexFailure>,
}

/// Full result of one rebuild run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub force: bool,
    pub dry_run: bool,
    pub corpora: BTreeMap<MemoryKind, CorpusReport>,
    /// False for dry runs, which never touch the cache.
    pub cache_persisted: bool,
    pub created_version: Option<VersionId>,
}

impl RebuildReport {
    pub fn total_changes(&self) -> usize {
        self.corpora.values().map(|c| c.changes.total()).sum()
    }

    pub fn total_indexed(&self) -> usize {
        self.corpora.values().map(|c| c.indexed).sum()
    }

    pub fn total_removed(&self) -> usize {
        self.corpora.values().map(|c| c.removed).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.corpora.values().map(|c| c.failures.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failed() > 0
    }

    /// Promote recorded per-document failures into a `PartialFailure` error.
    pub fn ensure_clean(&self) -> StoreResult<()> {
        let failed = self.total_failed();
        if failed == 0 {
            return Ok(());
        }
        Err(StoreError::PartialFailure {
            failed,
            attempted: self.total_indexed() + self.total_removed() + failed,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cleanup and status reports
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a snapshot cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub deleted: Vec<VersionId>,
    pub kept: Vec<VersionId>,
    pub reclaimed_bytes: u64,
}

/// Read-only view of one corpus for `status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusStatus {
    pub on_disk: usize,
    pub cached: usize,
    pub pending: ChangeSet,
    /// Live record count, or None when the index backend is unreachable.
    pub records: Option<u64>,
}

/// Read-only summary of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub corpora: BTreeMap<MemoryKind, CorpusStatus>,
    pub active_version: Option<VersionEntry>,
    pub version_count: usize,
    pub snapshot_count: usize,
    pub snapshot_bytes: u64,
}
