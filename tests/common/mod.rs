//! Common test utilities for sync tests
//!
//! Provides an in-process `BookRemote` whose availability can be switched
//! per endpoint, plus helpers to build a `SyncManager` around it.

#![allow(dead_code)]

use async_trait::async_trait;
use bookshelf_sync::{
    Book, BookPatch, BookRemote, DeleteResponse, DriverError, DriverResult, LocalStore, Note,
    SyncManager,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    List,
    Get,
    Create,
    Update,
    Delete,
    Notes,
    CreateNote,
}

#[derive(Default)]
struct FakeState {
    books: Vec<Book>,
    notes: Vec<Note>,
    next_id: i64,
    offline: bool,
    failing: HashSet<Endpoint>,
    calls: Vec<String>,
}

/// Scripted stand-in for the book service
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            }),
        })
    }

    pub fn offline() -> Arc<Self> {
        let remote = Self::new();
        remote.set_offline(true);
        remote
    }

    pub fn with_books(books: Vec<Book>) -> Arc<Self> {
        let remote = Self::new();
        remote.state.lock().unwrap().books = books;
        remote
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn fail(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failing.insert(endpoint);
    }

    pub fn heal(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failing.remove(&endpoint);
    }

    pub fn books(&self) -> Vec<Book> {
        self.state.lock().unwrap().books.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn enter(&self, endpoint: Endpoint, call: String) -> DriverResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.offline {
            return Err(DriverError::ConnectionError("connection refused".into()));
        }
        if state.failing.contains(&endpoint) {
            return Err(DriverError::ServerError {
                status: 500,
                message: "boom".into(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl BookRemote for FakeRemote {
    async fn list_books(&self) -> DriverResult<Vec<Book>> {
        let state = self.enter(Endpoint::List, "GET /books".into())?;
        Ok(state.books.clone())
    }

    async fn get_book(&self, id: i64) -> DriverResult<Book> {
        let state = self.enter(Endpoint::Get, format!("GET /books/{}", id))?;
        state
            .books
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(format!("GET /books/{}", id)))
    }

    async fn create_book(&self, payload: &BookPatch) -> DriverResult<Book> {
        let mut state = self.enter(Endpoint::Create, "POST /books".into())?;
        state.next_id += 1;
        let book = Book::from_patch(state.next_id, payload);
        state.books.push(book.clone());
        Ok(book)
    }

    async fn update_book(&self, id: i64, payload: &BookPatch) -> DriverResult<Book> {
        let mut state = self.enter(Endpoint::Update, format!("PUT /books/{}", id))?;
        let book = state
            .books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DriverError::NotFound(format!("PUT /books/{}", id)))?;
        book.apply(payload);
        Ok(book.clone())
    }

    async fn delete_book(&self, id: i64) -> DriverResult<DeleteResponse> {
        let mut state = self.enter(Endpoint::Delete, format!("DELETE /books/{}", id))?;
        let before = state.books.len();
        state.books.retain(|b| b.id != id);
        if state.books.len() == before {
            return Err(DriverError::NotFound(format!("DELETE /books/{}", id)));
        }
        Ok(DeleteResponse {
            message: "deleted".into(),
        })
    }

    async fn list_notes(&self, book_id: i64) -> DriverResult<Vec<Note>> {
        let state = self.enter(Endpoint::Notes, format!("GET /books/{}/notes", book_id))?;
        Ok(state
            .notes
            .iter()
            .filter(|n| n.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn create_note(&self, book_id: i64, content: &str) -> DriverResult<Note> {
        let mut state = self.enter(Endpoint::CreateNote, format!("POST /books/{}/notes", book_id))?;
        let note = Note {
            id: state.notes.len() as i64 + 1,
            book_id,
            content: content.to_string(),
            date_iso: "2026-10-15T08:00:00.000Z".into(),
        };
        state.notes.push(note.clone());
        Ok(note)
    }
}

pub fn book(id: i64, name: &str) -> Book {
    Book {
        id,
        name: name.to_string(),
        ..Book::default()
    }
}

/// Manager over `remote` and a fresh in-memory store
pub fn manager(remote: &Arc<FakeRemote>) -> SyncManager {
    SyncManager::with_shared(Arc::new(LocalStore::in_memory()), remote.clone())
}

/// Manager whose local cache already holds `books`
pub async fn manager_with_cache(remote: &Arc<FakeRemote>, books: &[Book]) -> SyncManager {
    let sync = manager(remote);
    sync.store().save_books(books).await;
    sync
}
