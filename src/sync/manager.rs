//! Sync Manager
//!
//! Offline-first access to the book service. Every call tries the remote
//! first; when that fails, reads are served from the local cache and writes
//! are applied locally and queued for a later [`SyncManager::flush`].

use super::stats::LibraryStats;
use super::store::{LocalState, LocalStore};
use crate::client::{BookClientBuilder, BookRemote};
use crate::config::SyncConfig;
use crate::protocol::{
    is_temporary_id, Book, BookPatch, DeleteResponse, DriverError, DriverResult, Note, PendingOp,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of a [`SyncManager::flush`] run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushResult {
    pub success: bool,
    /// Operations replayed and removed from the queue
    pub pushed: usize,
    /// Operations still queued when the run ended
    pub remaining: usize,
    pub errors: Vec<String>,
}

/// Offline-first sync engine for the book library.
///
/// Cache and queue mutations are serialized inside [`LocalStore`]; remote
/// calls happen outside that gate so a slow server never blocks local
/// reads.
pub struct SyncManager {
    remote: Arc<dyn BookRemote>,
    store: Arc<LocalStore>,
    /// Held for the whole duration of a flush
    flush_gate: Mutex<()>,
}

impl SyncManager {
    pub fn new<R>(store: LocalStore, remote: R) -> Self
    where
        R: BookRemote + 'static,
    {
        Self::with_shared(Arc::new(store), Arc::new(remote))
    }

    pub fn with_shared(store: Arc<LocalStore>, remote: Arc<dyn BookRemote>) -> Self {
        Self {
            remote,
            store,
            flush_gate: Mutex::new(()),
        }
    }

    /// HTTP remote and SQLite store as described by `config`
    pub fn from_config(config: &SyncConfig) -> DriverResult<Self> {
        let client = BookClientBuilder::new(&config.base_url)
            .timeout_secs(config.request_timeout_secs)
            .build()?;
        let store = LocalStore::open(&config.data_dir)?;
        Ok(Self::new(store, client))
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    // === Read path ===

    /// All books. Falls back to the cache on any remote failure and never
    /// returns an error.
    pub async fn get_books(&self) -> Vec<Book> {
        match self.remote.list_books().await {
            Ok(remote) => self.refresh_cache(remote).await,
            Err(e) => {
                warn!("get_books failed, returning local cache: {}", e);
                self.store.load_books().await
            }
        }
    }

    /// One book. Falls back to the cache; fails only when neither side has
    /// it.
    pub async fn get_book(&self, id: i64) -> DriverResult<Book> {
        let id = self.store.snapshot().await.resolve_id(id);

        let remote_err = if is_temporary_id(id) {
            DriverError::NotFound(format!("book {} is not synced yet", id))
        } else {
            match self.remote.get_book(id).await {
                Ok(book) => return self.refresh_one(book).await,
                Err(e) => e,
            }
        };

        warn!("get_book({}) failed, trying local cache: {}", id, remote_err);
        match self.store.snapshot().await.find_book(id) {
            Some(book) => Ok(book.clone()),
            None => Err(match remote_err {
                DriverError::NotFound(_) => DriverError::NotFound(format!("book {}", id)),
                other => other,
            }),
        }
    }

    /// Books currently in the local cache, without touching the network
    pub async fn cached_books(&self) -> Vec<Book> {
        self.store.load_books().await
    }

    pub async fn pending_operations(&self) -> Vec<PendingOp> {
        self.store.load_pending().await
    }

    pub async fn stats(&self) -> LibraryStats {
        LibraryStats::from_books(&self.get_books().await)
    }

    // === Write path ===

    /// Create a book. When the remote is unavailable the returned book
    /// carries a negative temporary id until a flush confirms it.
    pub async fn create_book(&self, payload: BookPatch) -> DriverResult<Book> {
        payload.validate()?;

        match self.remote.create_book(&payload).await {
            Ok(book) => {
                let stored = book.clone();
                self.store.update(move |state| state.upsert_book(stored)).await;
                Ok(book)
            }
            Err(e) => {
                debug!("create_book failed, queueing: {}", e);
                let now = Utc::now().timestamp_millis();
                let book = self
                    .store
                    .update(move |state| {
                        let temp_id = next_temp_id(now, state);
                        let book = Book::from_patch(temp_id, &payload);
                        state.pending.push(PendingOp::Create {
                            payload,
                            temp_id,
                            ts: now,
                        });
                        state.books.push(book.clone());
                        book
                    })
                    .await;
                info!("Book created offline with temporary id {}", book.id);
                Ok(book)
            }
        }
    }

    /// Update a book. Offline, the patch is merged field by field onto the
    /// cached record (or onto an id-only stub) and queued.
    pub async fn update_book(&self, id: i64, payload: BookPatch) -> DriverResult<Book> {
        payload.validate()?;
        let id = self.store.snapshot().await.resolve_id(id);

        if !is_temporary_id(id) {
            match self.remote.update_book(id, &payload).await {
                Ok(book) => {
                    let stored = book.clone();
                    let superseded = self
                        .store
                        .update(move |state| {
                            let superseded = state.supersede_pending(id, &payload);
                            settle(state, stored);
                            superseded
                        })
                        .await;
                    if superseded > 0 {
                        debug!("update_book({}) superseded {} queued update(s)", id, superseded);
                    }
                    return Ok(book);
                }
                Err(e) => debug!("update_book({}) failed, queueing: {}", id, e),
            }
        } else {
            debug!("update_book({}) targets an unsynced book, queueing", id);
        }

        let ts = Utc::now().timestamp_millis();
        let book = self
            .store
            .update(move |state| {
                // A flush may have confirmed the id while the remote call ran.
                let id = state.resolve_id(id);
                let mut book = state.find_book(id).cloned().unwrap_or_else(|| Book::stub(id));
                book.apply(&payload);
                state.pending.push(PendingOp::Update { id, payload, ts });
                state.upsert_book(book.clone());
                book
            })
            .await;
        Ok(book)
    }

    /// Delete a book. Always honored locally; a remote failure is reported
    /// only through the `deleted_offline` message, never as an error.
    pub async fn delete_book(&self, id: i64) -> DeleteResponse {
        let id = self.store.snapshot().await.resolve_id(id);

        if !is_temporary_id(id) {
            match self.remote.delete_book(id).await {
                Ok(response) => {
                    self.store
                        .update(move |state| {
                            state.discard_pending_for(id);
                            state.remove_book(id);
                        })
                        .await;
                    return response;
                }
                Err(e) => debug!("delete_book({}) failed, queueing: {}", id, e),
            }
        }

        let ts = Utc::now().timestamp_millis();
        self.store
            .update(move |state| {
                let id = state.resolve_id(id);
                state.pending.push(PendingOp::Delete { id, ts });
                state.remove_book(id);
            })
            .await;
        DeleteResponse::deleted_offline()
    }

    // === Notes (read-through, never queued) ===

    pub async fn get_notes(&self, book_id: i64) -> Vec<Note> {
        let book_id = self.store.snapshot().await.resolve_id(book_id);
        if is_temporary_id(book_id) {
            return Vec::new();
        }
        match self.remote.list_notes(book_id).await {
            Ok(notes) => notes,
            Err(e) => {
                warn!("get_notes({}) failed, returning empty list: {}", book_id, e);
                Vec::new()
            }
        }
    }

    /// Add a note. Failures are returned to the caller and not retried.
    pub async fn create_note(&self, book_id: i64, content: &str) -> DriverResult<Note> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DriverError::InvalidInput(
                "note content must not be empty".to_string(),
            ));
        }
        let book_id = self.store.snapshot().await.resolve_id(book_id);
        if is_temporary_id(book_id) {
            return Err(DriverError::InvalidInput(format!(
                "book {} has not been synced yet",
                book_id
            )));
        }
        self.remote.create_note(book_id, content).await
    }

    // === Flush & init ===

    /// Replay queued operations in order. Stops at the first failure and
    /// leaves that operation and everything after it queued.
    pub async fn flush(&self) -> FlushResult {
        let _flushing = self.flush_gate.lock().await;
        let mut result = FlushResult::default();

        loop {
            let Some(op) = self.store.snapshot().await.pending.first().cloned() else {
                break;
            };

            match self.replay(&op).await {
                Ok(applied) => {
                    self.store
                        .update(move |state| {
                            if let Some(pos) = state.pending.iter().position(|p| *p == op) {
                                state.pending.remove(pos);
                            }
                            applied.apply_to(state);
                        })
                        .await;
                    result.pushed += 1;
                }
                Err(e) => {
                    warn!("Flush halted on {} {}: {}", op.kind(), op.target_id(), e);
                    result.errors.push(format!("{} {}: {}", op.kind(), op.target_id(), e));
                    break;
                }
            }
        }

        result.remaining = self.store.load_pending().await.len();
        result.success = result.errors.is_empty();
        if result.pushed > 0 || !result.success {
            info!(
                "Flush pushed {} operation(s), {} remaining",
                result.pushed, result.remaining
            );
        }
        result
    }

    /// Whether a flush is currently running
    pub fn is_flushing(&self) -> bool {
        self.flush_gate.try_lock().is_err()
    }

    /// Mount-time entry point: refresh from the remote when possible,
    /// otherwise return the stale cache. Does not flush.
    pub async fn init_sync(&self) -> Vec<Book> {
        let local = self.store.load_books().await;
        match self.remote.list_books().await {
            Ok(remote) => self.refresh_cache(remote).await,
            Err(e) => {
                warn!("init_sync could not reach remote, using {} cached book(s): {}", local.len(), e);
                local
            }
        }
    }

    // === Internals ===

    async fn replay(&self, op: &PendingOp) -> DriverResult<Applied> {
        match op {
            PendingOp::Create {
                payload, temp_id, ..
            } => {
                let created = self.remote.create_book(payload).await?;
                Ok(Applied::Created {
                    temp_id: *temp_id,
                    book: created,
                })
            }
            PendingOp::Update { id, payload, .. } => {
                let updated = self.remote.update_book(*id, payload).await?;
                Ok(Applied::Updated(updated))
            }
            PendingOp::Delete { id, .. } => {
                self.remote.delete_book(*id).await?;
                Ok(Applied::Deleted(*id))
            }
        }
    }

    /// Store a fresh remote listing as the new cache. Queued operations are
    /// laid over it so local intent stays visible until it is flushed.
    async fn refresh_cache(&self, remote: Vec<Book>) -> Vec<Book> {
        self.store
            .update(move |state| {
                state.books = overlay_pending(remote, &state.books, &state.pending);
                state.books.clone()
            })
            .await
    }

    async fn refresh_one(&self, book: Book) -> DriverResult<Book> {
        let id = book.id;
        self.store
            .update(move |state| settle(state, book))
            .await
            .ok_or_else(|| DriverError::NotFound(format!("book {} was deleted locally", id)))
    }
}

/// Cache effect of a successfully replayed operation
enum Applied {
    Created { temp_id: i64, book: Book },
    Updated(Book),
    Deleted(i64),
}

impl Applied {
    fn apply_to(self, state: &mut LocalState) {
        match self {
            Applied::Created { temp_id, book } => {
                let server_id = book.id;
                if !state.is_pending_delete(temp_id) {
                    state.replace_book(temp_id, book);
                }
                let retargeted = state.resolve_temp_id(temp_id, server_id);
                debug!(
                    "Temporary id {} is now {} ({} queued op(s) retargeted)",
                    temp_id, server_id, retargeted
                );
            }
            Applied::Updated(book) => {
                settle(state, book);
            }
            Applied::Deleted(id) => {
                state.remove_book(id);
            }
        }
    }
}

/// Cache a server record with the still-queued ops for it laid on top.
/// A record with a queued delete is dropped from the cache instead.
fn settle(state: &mut LocalState, book: Book) -> Option<Book> {
    let id = book.id;
    let overlaid = overlay_pending(vec![book], &[], &state.pending)
        .into_iter()
        .find(|b| b.id == id);
    match &overlaid {
        Some(book) => state.upsert_book(book.clone()),
        None => {
            state.remove_book(id);
        }
    }
    overlaid
}

/// Temporary ids come from the negated wall clock, forced strictly below
/// every id already in use locally so two creates never share one.
fn next_temp_id(now_millis: i64, state: &LocalState) -> i64 {
    let candidate = -now_millis.max(1);
    let floor = state
        .min_id()
        .into_iter()
        .chain(state.id_map.keys().next().copied())
        .min()
        .unwrap_or(0);
    if floor < 0 {
        candidate.min(floor - 1)
    } else {
        candidate
    }
}

/// Re-apply queued operations on top of a remote listing.
fn overlay_pending(mut books: Vec<Book>, cached: &[Book], pending: &[PendingOp]) -> Vec<Book> {
    for op in pending {
        match op {
            PendingOp::Create {
                payload, temp_id, ..
            } => {
                if books.iter().any(|b| b.id == *temp_id) {
                    continue;
                }
                let book = cached
                    .iter()
                    .find(|b| b.id == *temp_id)
                    .cloned()
                    .unwrap_or_else(|| Book::from_patch(*temp_id, payload));
                books.push(book);
            }
            PendingOp::Update { id, payload, .. } => {
                if let Some(book) = books.iter_mut().find(|b| b.id == *id) {
                    book.apply(payload);
                }
            }
            PendingOp::Delete { id, .. } => books.retain(|b| b.id != *id),
        }
    }
    books
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn book(id: i64, name: &str) -> Book {
        Book {
            id,
            name: name.to_string(),
            ..Book::default()
        }
    }

    #[test]
    fn test_temp_id_is_negated_clock_when_free() {
        let state = LocalState {
            books: vec![book(3, "Dune")],
            ..LocalState::default()
        };
        assert_eq!(next_temp_id(1_700_000_000_000, &state), -1_700_000_000_000);
    }

    #[test]
    fn test_temp_id_stays_below_existing_placeholders() {
        let state = LocalState {
            books: vec![book(-1_700_000_000_000, "Draft")],
            ..LocalState::default()
        };
        assert_eq!(next_temp_id(1_700_000_000_000, &state), -1_700_000_000_001);
    }

    #[test]
    fn test_temp_id_never_reuses_resolved_placeholder() {
        let state = LocalState {
            id_map: BTreeMap::from([(-500, 12)]),
            ..LocalState::default()
        };
        // Clock went backwards past an id that was already handed out.
        assert_eq!(next_temp_id(400, &state), -501);
    }

    #[test]
    fn test_overlay_without_pending_is_wholesale() {
        let remote = vec![book(1, "Dune"), book(2, "Emma")];
        let cached = vec![book(9, "Stale")];
        assert_eq!(overlay_pending(remote.clone(), &cached, &[]), remote);
    }

    #[test]
    fn test_overlay_reapplies_queued_intent() {
        let remote = vec![book(1, "Dune"), book(2, "Emma")];
        let cached = vec![book(-10, "Offline draft")];
        let pending = vec![
            PendingOp::Create {
                payload: BookPatch::new().name("Offline draft"),
                temp_id: -10,
                ts: 0,
            },
            PendingOp::Update {
                id: 1,
                payload: BookPatch::new().read(true),
                ts: 1,
            },
            PendingOp::Delete { id: 2, ts: 2 },
        ];

        let books = overlay_pending(remote, &cached, &pending);
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].id, 1);
        assert!(books[0].read);
        assert_eq!(books[1], book(-10, "Offline draft"));
    }
}
