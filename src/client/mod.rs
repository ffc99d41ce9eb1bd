mod builder;
mod http_client;
mod openlibrary;

pub use builder::BookClientBuilder;
pub use http_client::HttpClient;
pub use openlibrary::{OpenLibraryClient, DEFAULT_OPENLIBRARY_URL};

use crate::protocol::{Book, BookPatch, DeleteResponse, DriverResult, Note};
use async_trait::async_trait;

/// Raw access to the book service, one method per endpoint.
///
/// Implementations report every non-2xx answer and transport failure as an
/// error; deciding what to do about it is the sync manager's job.
#[async_trait]
pub trait BookRemote: Send + Sync {
    /// `GET /books`
    async fn list_books(&self) -> DriverResult<Vec<Book>>;

    /// `GET /books/:id`
    async fn get_book(&self, id: i64) -> DriverResult<Book>;

    /// `POST /books`
    async fn create_book(&self, payload: &BookPatch) -> DriverResult<Book>;

    /// `PUT /books/:id`
    async fn update_book(&self, id: i64, payload: &BookPatch) -> DriverResult<Book>;

    /// `DELETE /books/:id`
    async fn delete_book(&self, id: i64) -> DriverResult<DeleteResponse>;

    /// `GET /books/:id/notes`
    async fn list_notes(&self, book_id: i64) -> DriverResult<Vec<Note>>;

    /// `POST /books/:id/notes`
    async fn create_note(&self, book_id: i64, content: &str) -> DriverResult<Note>;
}
