//! Bookshelf Sync
//!
//! Offline-first data layer for a personal book-tracking app. Talks to the
//! book REST service when it can, keeps a local cache for when it can't,
//! and queues mutations for replay once the network is back.
//!
//! ```rust,no_run
//! use bookshelf_sync::{BookPatch, SyncConfig, SyncManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bookshelf_sync::DriverError> {
//!     let sync = SyncManager::from_config(&SyncConfig::from_env())?;
//!
//!     let books = sync.init_sync().await;
//!     if let Some(first) = books.first() {
//!         sync.update_book(first.id, BookPatch::new().read(true)).await?;
//!     }
//!     sync.flush().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod protocol;
pub mod sync;

pub use client::{BookClientBuilder, BookRemote, HttpClient, OpenLibraryClient};
pub use config::SyncConfig;
pub use protocol::{Book, BookPatch, DeleteResponse, DriverError, DriverResult, Note, PendingOp};
pub use sync::{FlushResult, KeyValueStore, LibraryStats, LocalStore, SyncManager};
