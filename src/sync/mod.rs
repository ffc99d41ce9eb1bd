//! Offline Sync Module
//!
//! Offline-first access to the book service.
//!
//! # Features
//! - Reads fall back to a locally persisted cache
//! - Writes fall back to optimistic local changes plus a pending queue
//! - Explicit, ordered replay of the queue with [`SyncManager::flush`]
//!
//! # Example
//!
//! ```rust,no_run
//! use bookshelf_sync::{BookClientBuilder, BookPatch, LocalStore, SyncManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BookClientBuilder::new("http://localhost:3000").build()?;
//!     let store = LocalStore::open("./data")?;
//!     let sync = SyncManager::new(store, client);
//!
//!     let books = sync.init_sync().await;
//!     println!("{} books", books.len());
//!
//!     // Works offline: the book gets a temporary negative id
//!     let draft = sync.create_book(BookPatch::new().name("Dune")).await?;
//!     println!("created {}", draft.id);
//!
//!     // Once connectivity is back
//!     let result = sync.flush().await;
//!     println!("pushed {}, {} left", result.pushed, result.remaining);
//!     Ok(())
//! }
//! ```

pub mod kv;
pub mod manager;
pub mod stats;
pub mod store;

pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use manager::{FlushResult, SyncManager};
pub use stats::LibraryStats;
pub use store::{LocalState, LocalStore};
