//! Default index backend: sqlite with the sqlite-vec extension.
//!
//! One row per record in `records`, embeddings in the `record_vec` vec0
//! table keyed by rowid. The vec0 table is created lazily once the
//! embedding dimension is known, either from settings or from the first
//! successful embed, and the dimension is pinned in `meta` after that.

use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use async_trait::async_trait;
use mneme_core::{EmbeddingSettings, StoreSettings};

use crate::chunker;
use crate::corpus;
use crate::embeddings::EmbeddingClient;
use crate::errors::{StoreError, StoreResult};
use crate::indexer::{DocumentIndexer, RecordHandle};
use crate::models::MemoryKind;

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

const VEC_TABLE: &str = "record_vec";

#[derive(Debug, Clone)]
pub struct SqliteIndexer {
    pool: SqlitePool,
    embedder: EmbeddingClient,
    batch: usize,
    dimensions: Option<usize>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SqliteIndexer {
    pub async fn open(
        db_path: &Path,
        store: &StoreSettings,
        embedding: &EmbeddingSettings,
    ) -> StoreResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA cache_size = -64000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        ensure_vec_table(&pool, embedding.dimensions).await?;

        Ok(Self {
            pool,
            embedder: EmbeddingClient::new(embedding),
            batch: embedding.batch,
            dimensions: embedding.dimensions,
            chunk_size: store.chunk_size,
            chunk_overlap: store.chunk_overlap,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn embed_units(&self, units: &[IndexUnit]) -> StoreResult<Vec<Vec<f32>>> {
        let texts: Vec<String> = units.iter().map(|unit| unit.text.clone()).collect();
        let batch = self.batch.max(1);
        let mut expected = self.dimensions;
        let mut embeddings = Vec::with_capacity(texts.len());

        let mut start = 0;
        while start < texts.len() {
            let end = (start + batch).min(texts.len());
            let vectors = self.embedder.embed_batch(&texts[start..end]).await?;

            for vector in &vectors {
                match expected {
                    Some(dim) if dim != vector.len() => {
                        return Err(StoreError::EmbeddingDimMismatch {
                            expected: dim,
                            actual: vector.len(),
                        });
                    }
                    None => expected = Some(vector.len()),
                    Some(_) => {}
                }
            }

            embeddings.extend(vectors);
            start = end;
        }

        // All vectors were checked against the same dimension above.
        if let Some(first) = embeddings.first() {
            ensure_vec_table_dim(&self.pool, first.len()).await?;
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl DocumentIndexer for SqliteIndexer {
    async fn index(
        &self,
        kind: MemoryKind,
        path: &str,
        content: &str,
    ) -> StoreResult<Vec<RecordHandle>> {
        let units = expand_units(kind, content, self.chunk_size, self.chunk_overlap)?;

        // Embed before touching any rows, so a backend failure leaves the
        // previously indexed records in place.
        let embeddings = self.embed_units(&units).await?;

        delete_rows(&self.pool, kind, path).await?;

        let mut handles = Vec::with_capacity(units.len());
        for (seq, (unit, embedding)) in units.iter().zip(embeddings.iter()).enumerate() {
            let handle = RecordHandle::generate();
            let result = sqlx::query(
                r#"INSERT INTO records (uid, kind, doc_path, seq, title, content, embedding_model, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&handle.0)
            .bind(kind.as_str())
            .bind(path)
            .bind(seq as i64)
            .bind(&unit.title)
            .bind(&unit.text)
            .bind(self.embedder.model())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

            upsert_vec(&self.pool, result.last_insert_rowid(), embedding).await?;
            handles.push(handle);
        }

        Ok(handles)
    }

    async fn delete(&self, kind: MemoryKind, path: &str) -> StoreResult<()> {
        delete_rows(&self.pool, kind, path).await
    }

    async fn count(&self, kind: MemoryKind) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn checkpoint(&self) -> StoreResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// One embeddable unit of a document: a chunk of a factual file, or one
/// record of a structured file.
#[derive(Debug, Clone, PartialEq)]
struct IndexUnit {
    title: Option<String>,
    text: String,
}

fn expand_units(
    kind: MemoryKind,
    content: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> StoreResult<Vec<IndexUnit>> {
    let units = match kind {
        MemoryKind::Factual => chunker::chunk_text(content, chunk_size, chunk_overlap)
            .into_iter()
            .map(|chunk| IndexUnit {
                title: chunker::first_heading(&chunk.content),
                text: chunk.content,
            })
            .collect(),
        MemoryKind::Example => corpus::parse_example_file(content)?
            .into_iter()
            .filter(|record| !record.response.trim().is_empty())
            .map(|record| IndexUnit {
                title: Some(truncate_chars(record.prompt.trim(), 200)),
                text: record.response.trim().to_string(),
            })
            .collect(),
        MemoryKind::Rule => corpus::parse_rule_file(content)?
            .into_iter()
            .filter(|record| !record.body.trim().is_empty())
            .map(|record| IndexUnit {
                title: Some(record.name.trim().to_string()),
                text: record.body.trim().to_string(),
            })
            .collect(),
    };
    Ok(units)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

fn init_sqlite_vec_once() -> StoreResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(StoreError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn vec_table_exists(pool: &SqlitePool) -> StoreResult<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(VEC_TABLE)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn ensure_vec_table(pool: &SqlitePool, embedding_dim: Option<usize>) -> StoreResult<()> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let dim = if let Some((value,)) = existing {
        value.parse::<usize>().ok()
    } else {
        embedding_dim
    };

    if let Some(dimension) = dim {
        ensure_vec_table_dim(pool, dimension).await?;
    }

    Ok(())
}

async fn ensure_vec_table_dim(pool: &SqlitePool, dimension: usize) -> StoreResult<()> {
    if !vec_table_exists(pool).await? {
        let create_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {VEC_TABLE} USING vec0(embedding float[{dimension}])"
        );
        sqlx::query(&create_sql).execute(pool).await?;
    }

    sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
        .bind(dimension.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

async fn delete_rows(pool: &SqlitePool, kind: MemoryKind, path: &str) -> StoreResult<()> {
    let existing: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM records WHERE kind = ? AND doc_path = ?")
            .bind(kind.as_str())
            .bind(path)
            .fetch_all(pool)
            .await?;

    if existing.is_empty() {
        return Ok(());
    }

    if vec_table_exists(pool).await? {
        let placeholders = existing.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM {VEC_TABLE} WHERE rowid IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for (id,) in &existing {
            query = query.bind(id);
        }
        query.execute(pool).await?;
    }

    sqlx::query("DELETE FROM records WHERE kind = ? AND doc_path = ?")
        .bind(kind.as_str())
        .bind(path)
        .execute(pool)
        .await?;

    Ok(())
}

async fn upsert_vec(pool: &SqlitePool, record_id: i64, embedding: &[f32]) -> StoreResult<()> {
    let payload = serde_json::to_string(embedding)
        .map_err(|e| StoreError::Serialize(format!("embedding serialize failed: {e}")))?;

    let sql = format!("INSERT OR REPLACE INTO {VEC_TABLE}(rowid, embedding) VALUES (?, ?)");
    sqlx::query(&sql)
        .bind(record_id)
        .bind(payload)
        .execute(pool)
        .await?;

    Ok(())
}
