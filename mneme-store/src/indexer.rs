use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StoreResult;
use crate::models::MemoryKind;

/// Opaque handle to one record owned by the index backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle(pub String);

impl RecordHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The embedding-and-indexing collaborator driven by the rebuild
/// orchestrator. Implementations own record storage entirely; the store
/// only tracks document identities and fingerprints on its side.
///
/// Identity is always `(kind, path)`. Re-indexing a document replaces all
/// records previously stored under the same identity, so a failed attempt
/// followed by a retry can never leave duplicates behind.
#[async_trait]
pub trait DocumentIndexer: Send + Sync + fmt::Debug {
    /// (Re)index one document from its raw content. Returns handles for
    /// the records the backend created, which may be empty for a document
    /// that expands to no records.
    async fn index(
        &self,
        kind: MemoryKind,
        path: &str,
        content: &str,
    ) -> StoreResult<Vec<RecordHandle>>;

    /// Remove every record stored under the identity. Removing an unknown
    /// identity is a no-op, not an error.
    async fn delete(&self, kind: MemoryKind, path: &str) -> StoreResult<()>;

    /// Number of records currently stored for one corpus.
    async fn count(&self, kind: MemoryKind) -> StoreResult<u64>;

    /// Flush pending backend state so the files under the index directory
    /// are consistent to copy.
    async fn checkpoint(&self) -> StoreResult<()>;

    /// Release file handles on the index directory. Called before a
    /// restore replaces the directory; the indexer is unusable afterwards.
    async fn close(&self) -> StoreResult<()>;
}
