#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use mneme_store::{
    DocumentIndexer, MemoryKind, MnemeEngine, RecordHandle, StoreError, StoreResult, StoreSettings,
    corpus,
};

/// Index backend double. All state lives in `<index dir>/records.json`,
/// so snapshot capture and restore move it exactly like the real backend's
/// database file. Structured documents are parsed for real, which makes
/// malformed JSON fail the same way it does in production.
#[derive(Debug)]
pub struct MockIndexer {
    state_path: PathBuf,
    io: Mutex<()>,
    pub index_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    fail_paths: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
}

type MockState = BTreeMap<String, BTreeMap<String, usize>>;

impl MockIndexer {
    pub fn new(index_dir: &Path) -> Self {
        Self {
            state_path: index_dir.join("records.json"),
            io: Mutex::new(()),
            index_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fail_paths: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make indexing of one document fail with a synthetic error.
    pub fn fail_on(&self, path: &str) {
        self.fail_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_paths.lock().unwrap().clear();
    }

    /// Simulate the embedding backend being down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn indexed_documents(&self) -> usize {
        let _io = self.io.lock().unwrap();
        self.load().values().map(BTreeMap::len).sum()
    }

    fn load(&self) -> MockState {
        match std::fs::read_to_string(&self.state_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap(),
            Err(_) => MockState::new(),
        }
    }

    fn save(&self, state: &MockState) {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&self.state_path, serde_json::to_vec_pretty(state).unwrap()).unwrap();
    }
}

#[async_trait]
impl DocumentIndexer for MockIndexer {
    async fn index(
        &self,
        kind: MemoryKind,
        path: &str,
        content: &str,
    ) -> StoreResult<Vec<RecordHandle>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::BackendUnavailable(
                "mock backend is down".to_string(),
            ));
        }
        if self.fail_paths.lock().unwrap().contains(path) {
            return Err(StoreError::InvalidDocument(format!(
                "synthetic failure for {path}"
            )));
        }

        let records = match kind {
            MemoryKind::Factual => 1,
            MemoryKind::Example => corpus::parse_example_file(content)?.len(),
            MemoryKind::Rule => corpus::parse_rule_file(content)?.len(),
        };

        self.index_calls.fetch_add(1, Ordering::SeqCst);

        let _io = self.io.lock().unwrap();
        let mut state = self.load();
        state
            .entry(kind.as_str().to_string())
            .or_default()
            .insert(path.to_string(), records);
        self.save(&state);

        Ok((0..records).map(|_| RecordHandle::generate()).collect())
    }

    async fn delete(&self, kind: MemoryKind, path: &str) -> StoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let _io = self.io.lock().unwrap();
        let mut state = self.load();
        if let Some(arena) = state.get_mut(kind.as_str()) {
            arena.remove(path);
        }
        self.save(&state);
        Ok(())
    }

    async fn count(&self, kind: MemoryKind) -> StoreResult<u64> {
        let _io = self.io.lock().unwrap();
        let state = self.load();
        Ok(state
            .get(kind.as_str())
            .map(|arena| arena.values().sum::<usize>() as u64)
            .unwrap_or(0))
    }

    async fn checkpoint(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub fn test_settings(dir: &Path) -> StoreSettings {
    StoreSettings {
        data_root_override: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

/// Engine over a mock backend, plus the mock for assertions.
pub fn setup(dir: &Path) -> (MnemeEngine, Arc<MockIndexer>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mneme_store=debug,warn")
        .with_test_writer()
        .try_init();

    let settings = test_settings(dir);
    let mock = Arc::new(MockIndexer::new(&dir.join("index")));
    let engine = MnemeEngine::with_indexer(settings, mock.clone());
    (engine, mock)
}

pub fn write_doc(dir: &Path, kind: MemoryKind, rel: &str, content: &str) {
    let path = dir.join("corpus").join(kind.as_str()).join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn remove_doc(dir: &Path, kind: MemoryKind, rel: &str) {
    std::fs::remove_file(dir.join("corpus").join(kind.as_str()).join(rel)).unwrap();
}
