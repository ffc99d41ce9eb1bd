//! Offline Sync Local Storage
//!
//! Typed access to the three blobs the sync layer persists: the books
//! cache, the pending-operation queue and the map of resolved temporary
//! ids. Every read-modify-write goes through a single gate so concurrent
//! callers queue up instead of overwriting each other's blobs.

use super::kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
use crate::protocol::{Book, BookPatch, DriverResult, PendingOp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub const BOOKS_CACHE_KEY: &str = "books_cache_v1";
pub const PENDING_OPS_KEY: &str = "books_pending_v1";
pub const ID_MAP_KEY: &str = "books_id_map_v1";

/// Resolved temporary ids kept for callers still holding a placeholder.
/// Older entries are dropped first.
pub const ID_MAP_CAPACITY: usize = 256;

/// In-memory view of everything persisted locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    pub books: Vec<Book>,
    pub pending: Vec<PendingOp>,
    /// Temporary id -> server id, filled in as creates are flushed.
    pub id_map: BTreeMap<i64, i64>,
}

impl LocalState {
    pub fn find_book(&self, id: i64) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Replace the entry with the same id, or append.
    pub fn upsert_book(&mut self, book: Book) {
        match self.books.iter_mut().find(|b| b.id == book.id) {
            Some(existing) => *existing = book,
            None => self.books.push(book),
        }
    }

    /// Replace the entry keyed by `old_id` (not by content), or append.
    pub fn replace_book(&mut self, old_id: i64, book: Book) {
        match self.books.iter().position(|b| b.id == old_id) {
            Some(idx) => self.books[idx] = book,
            None => self.upsert_book(book),
        }
    }

    pub fn remove_book(&mut self, id: i64) -> bool {
        let before = self.books.len();
        self.books.retain(|b| b.id != id);
        self.books.len() != before
    }

    /// Translate a temporary id into its server id when one is known.
    pub fn resolve_id(&self, id: i64) -> i64 {
        self.id_map.get(&id).copied().unwrap_or(id)
    }

    /// Record that `temp_id` became `server_id` and retarget every queued
    /// op still pointing at the placeholder.
    pub fn resolve_temp_id(&mut self, temp_id: i64, server_id: i64) -> usize {
        self.id_map.insert(temp_id, server_id);
        // Temporary ids decrease over time, so the highest keys are the oldest.
        while self.id_map.len() > ID_MAP_CAPACITY {
            self.id_map.pop_last();
        }
        self.pending
            .iter_mut()
            .map(|op| op.retarget(temp_id, server_id))
            .filter(|changed| *changed)
            .count()
    }

    /// Whether a queued delete still targets `id`.
    pub fn is_pending_delete(&self, id: i64) -> bool {
        self.pending
            .iter()
            .any(|op| matches!(op, PendingOp::Delete { id: target, .. } if *target == id))
    }

    /// A newer write for `id` reached the server: strip the fields it set
    /// from older queued updates and drop the ones left empty.
    pub fn supersede_pending(&mut self, id: i64, newer: &BookPatch) -> usize {
        let before = self.pending.len();
        self.pending.retain_mut(|op| match op {
            PendingOp::Update {
                id: target, payload, ..
            } if *target == id => payload.without(newer),
            _ => true,
        });
        before - self.pending.len()
    }

    /// The server no longer has `id`; queued updates and deletes for it
    /// can only fail.
    pub fn discard_pending_for(&mut self, id: i64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|op| match op {
            PendingOp::Update { id: target, .. } | PendingOp::Delete { id: target, .. } => {
                *target != id
            }
            PendingOp::Create { .. } => true,
        });
        before - self.pending.len()
    }

    /// Lowest id in use locally, considering both the cache and the queue.
    pub fn min_id(&self) -> Option<i64> {
        self.books
            .iter()
            .map(|b| b.id)
            .chain(self.pending.iter().map(|op| op.target_id()))
            .min()
    }
}

pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    gate: Mutex<()>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            gate: Mutex::new(()),
        }
    }

    /// Open a durable store in `<data_dir>/sync.db`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> DriverResult<Self> {
        let kv = SqliteKvStore::open_in(data_dir.as_ref())?;
        Ok(Self::new(Arc::new(kv)))
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    // === Whole-blob access ===

    pub async fn load_books(&self) -> Vec<Book> {
        let _guard = self.gate.lock().await;
        self.read_blob(BOOKS_CACHE_KEY).await
    }

    /// Replace the cached book list wholesale
    pub async fn save_books(&self, books: &[Book]) {
        let _guard = self.gate.lock().await;
        self.write_blob(BOOKS_CACHE_KEY, books).await;
    }

    pub async fn load_pending(&self) -> Vec<PendingOp> {
        let _guard = self.gate.lock().await;
        self.read_blob(PENDING_OPS_KEY).await
    }

    pub async fn save_pending(&self, ops: &[PendingOp]) {
        let _guard = self.gate.lock().await;
        self.write_blob(PENDING_OPS_KEY, ops).await;
    }

    pub async fn enqueue(&self, op: PendingOp) {
        self.update(|state| state.pending.push(op)).await;
    }

    pub async fn snapshot(&self) -> LocalState {
        let _guard = self.gate.lock().await;
        self.read_state().await
    }

    /// Run `f` against the current local state as one transaction; blobs
    /// that `f` changed are written back before the gate is released.
    pub async fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut LocalState) -> T + Send,
        T: Send,
    {
        let _guard = self.gate.lock().await;
        let before = self.read_state().await;
        let mut state = before.clone();
        let out = f(&mut state);

        if state.books != before.books {
            self.write_blob(BOOKS_CACHE_KEY, &state.books).await;
        }
        if state.pending != before.pending {
            self.write_blob(PENDING_OPS_KEY, &state.pending).await;
        }
        if state.id_map != before.id_map {
            self.write_blob(ID_MAP_KEY, &state.id_map).await;
        }
        out
    }

    // === Internals (caller holds the gate) ===

    async fn read_state(&self) -> LocalState {
        LocalState {
            books: self.read_blob(BOOKS_CACHE_KEY).await,
            pending: self.read_blob(PENDING_OPS_KEY).await,
            id_map: self.read_blob(ID_MAP_KEY).await,
        }
    }

    /// Missing, unreadable and corrupt blobs all read as empty.
    async fn read_blob<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let raw = match self.kv.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("Failed to load {}: {}", key, e);
                return T::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Discarding unreadable {}: {}", key, e);
            T::default()
        })
    }

    /// Failures are logged and the write is skipped.
    async fn write_blob<T>(&self, key: &str, value: &T)
    where
        T: Serialize + ?Sized,
    {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.kv.set(key, &raw).await {
            warn!("Failed to save {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BookPatch, DriverError};
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn book(id: i64, name: &str) -> Book {
        Book {
            id,
            name: name.to_string(),
            ..Book::default()
        }
    }

    struct BrokenKv;

    #[async_trait]
    impl KeyValueStore for BrokenKv {
        async fn get(&self, _key: &str) -> DriverResult<Option<String>> {
            Err(DriverError::StorageError("disk gone".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> DriverResult<()> {
            Err(DriverError::StorageError("disk gone".into()))
        }
        async fn remove(&self, _key: &str) -> DriverResult<()> {
            Err(DriverError::StorageError("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_books_round_trip() {
        let store = LocalStore::in_memory();
        assert!(store.load_books().await.is_empty());

        store.save_books(&[]).await;
        assert!(store.load_books().await.is_empty());

        let books = vec![
            book(1, "Dune"),
            Book {
                rating: Some(5),
                cover: Some("file:///c.png".into()),
                theme: Some("sf".into()),
                ..book(2, "Foundation")
            },
        ];
        store.save_books(&books).await;
        assert_eq!(store.load_books().await, books);
    }

    #[tokio::test]
    async fn test_durable_store_reopens() {
        let dir = tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            store.save_books(&[book(3, "Ubik")]).await;
            store
                .enqueue(PendingOp::Delete { id: 3, ts: 1 })
                .await;
        }
        let store = LocalStore::open(dir.path()).unwrap();
        assert_eq!(store.load_books().await, vec![book(3, "Ubik")]);
        assert_eq!(store.load_pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failures_read_as_empty() {
        let store = LocalStore::new(Arc::new(BrokenKv));
        store.save_books(&[book(1, "Dune")]).await;
        assert!(store.load_books().await.is_empty());
        assert!(store.load_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_reads_as_empty() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(BOOKS_CACHE_KEY, "{not json").await.unwrap();
        let store = LocalStore::new(kv);
        assert!(store.load_books().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_only_writes_changed_blobs() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = LocalStore::new(kv.clone());
        store
            .update(|state| state.upsert_book(book(1, "Dune")))
            .await;

        assert!(kv.get(BOOKS_CACHE_KEY).await.unwrap().is_some());
        assert!(kv.get(PENDING_OPS_KEY).await.unwrap().is_none());
        assert!(kv.get(ID_MAP_KEY).await.unwrap().is_none());
    }

    #[test]
    fn test_replace_book_matches_by_old_id() {
        let mut state = LocalState {
            books: vec![book(-100, "Draft"), book(4, "Draft")],
            ..LocalState::default()
        };
        state.replace_book(-100, book(9, "Draft"));
        assert_eq!(state.books, vec![book(9, "Draft"), book(4, "Draft")]);
    }

    #[test]
    fn test_resolve_temp_id_retargets_queue() {
        let mut state = LocalState {
            pending: vec![
                PendingOp::Update {
                    id: -7,
                    payload: BookPatch::new().read(true),
                    ts: 1,
                },
                PendingOp::Delete { id: 3, ts: 2 },
                PendingOp::Delete { id: -7, ts: 3 },
            ],
            ..LocalState::default()
        };
        assert_eq!(state.resolve_temp_id(-7, 21), 2);
        assert_eq!(state.resolve_id(-7), 21);
        assert_eq!(state.resolve_id(3), 3);
        assert_eq!(state.pending[0].target_id(), 21);
        assert_eq!(state.pending[1].target_id(), 3);
        assert_eq!(state.pending[2].target_id(), 21);
    }

    #[tokio::test]
    async fn test_id_map_persists() {
        let store = LocalStore::in_memory();
        store.update(|state| state.resolve_temp_id(-5, 50)).await;
        assert_eq!(store.snapshot().await.resolve_id(-5), 50);
    }

    #[test]
    fn test_id_map_keeps_most_recent_entries() {
        let mut state = LocalState::default();
        for n in 1..=(ID_MAP_CAPACITY as i64 + 10) {
            state.resolve_temp_id(-n, n);
        }
        assert_eq!(state.id_map.len(), ID_MAP_CAPACITY);
        let newest = -(ID_MAP_CAPACITY as i64 + 10);
        assert_eq!(state.id_map.keys().next().copied(), Some(newest));
        assert_eq!(state.resolve_id(newest), -newest);
        assert_eq!(state.resolve_id(-1), -1);
    }

    #[test]
    fn test_supersede_pending_strips_overwritten_fields() {
        let mut state = LocalState {
            pending: vec![
                PendingOp::Update {
                    id: 1,
                    payload: BookPatch::new().read(true),
                    ts: 1,
                },
                PendingOp::Update {
                    id: 1,
                    payload: BookPatch::new().read(true).favorite(true),
                    ts: 2,
                },
                PendingOp::Update {
                    id: 2,
                    payload: BookPatch::new().read(true),
                    ts: 3,
                },
            ],
            ..LocalState::default()
        };
        assert_eq!(state.supersede_pending(1, &BookPatch::new().read(false)), 1);
        assert_eq!(
            state.pending,
            vec![
                PendingOp::Update {
                    id: 1,
                    payload: BookPatch::new().favorite(true),
                    ts: 2,
                },
                PendingOp::Update {
                    id: 2,
                    payload: BookPatch::new().read(true),
                    ts: 3,
                },
            ]
        );
    }

    #[test]
    fn test_discard_pending_for_keeps_other_books() {
        let mut state = LocalState {
            pending: vec![
                PendingOp::Update {
                    id: 4,
                    payload: BookPatch::new().read(true),
                    ts: 1,
                },
                PendingOp::Delete { id: 5, ts: 2 },
                PendingOp::Delete { id: 4, ts: 3 },
            ],
            ..LocalState::default()
        };
        assert_eq!(state.discard_pending_for(4), 2);
        assert_eq!(state.pending, vec![PendingOp::Delete { id: 5, ts: 2 }]);
        assert!(state.is_pending_delete(5));
        assert!(!state.is_pending_delete(4));
    }
}
