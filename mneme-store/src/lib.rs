//! Versioned incremental knowledge store.
//!
//! Three typed corpora (factual, example, rule memory) are fingerprinted,
//! diffed against a build cache, and reindexed incrementally into a
//! pluggable embedding backend. Indexed states can be recorded as
//! immutable versions with full snapshots, compared, rolled back, and
//! cleaned up. One writer at a time, enforced with a file lock; reads are
//! lock-free.

pub mod cache;
pub mod changes;
pub mod chunker;
pub mod corpus;
pub mod doctor;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod indexer;
pub mod lock;
pub mod models;
pub mod paths;
pub mod registry;
pub mod snapshots;
pub mod vector;
pub mod watcher;

pub use mneme_core::{EmbeddingSettings, Settings, StoreSettings};

pub use cache::BuildCache;
pub use changes::detect_changes;
pub use doctor::{DoctorReport, run_doctor};
pub use embeddings::EmbeddingClient;
pub use engine::{MnemeEngine, RebuildOptions};
pub use errors::{StoreError, StoreResult};
pub use indexer::{DocumentIndexer, RecordHandle};
pub use lock::StoreLock;
pub use models::{
    CacheEntry, ChangeSet, CleanupReport, CorpusReport, CorpusStatus, CountDelta, DocumentKey,
    IndexFailure, MemoryKind, RebuildReport, StatusReport, VersionDiff, VersionEntry, VersionId,
};
pub use registry::VersionRegistry;
pub use snapshots::SnapshotStore;
pub use vector::SqliteIndexer;
