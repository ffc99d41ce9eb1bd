use super::BookRemote;
use crate::protocol::{Book, BookPatch, DeleteResponse, DriverError, DriverResult, NewNote, Note};
use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// JSON-over-HTTP client for the book service. Performs exactly one request
/// per call and never falls back to anything local.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: &str) -> DriverResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> DriverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| DriverError::ConnectionError(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> DriverResult<String>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("HTTP {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverError::ConnectionError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DriverError::ProtocolError(format!("Failed to read response: {}", e)))?;

        if status == StatusCode::NOT_FOUND {
            return Err(DriverError::NotFound(format!("{} {}", method, path)));
        }
        if !status.is_success() {
            return Err(DriverError::ServerError {
                status: status.as_u16(),
                message: if text.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    text
                },
            });
        }

        Ok(text)
    }

    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> DriverResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text = self.send(method.clone(), path, body).await?;
        if text.is_empty() {
            return Err(DriverError::ProtocolError(format!(
                "Empty response for HTTP {} {}",
                method, path
            )));
        }
        serde_json::from_str(&text).map_err(|e| {
            DriverError::ProtocolError(format!("Failed to parse response: {} - Text: {}", e, text))
        })
    }
}

#[async_trait]
impl BookRemote for HttpClient {
    async fn list_books(&self) -> DriverResult<Vec<Book>> {
        self.request::<_, ()>(Method::GET, "/books", None).await
    }

    async fn get_book(&self, id: i64) -> DriverResult<Book> {
        self.request::<_, ()>(Method::GET, &format!("/books/{}", id), None)
            .await
    }

    async fn create_book(&self, payload: &BookPatch) -> DriverResult<Book> {
        self.request(Method::POST, "/books", Some(payload)).await
    }

    async fn update_book(&self, id: i64, payload: &BookPatch) -> DriverResult<Book> {
        self.request(Method::PUT, &format!("/books/{}", id), Some(payload))
            .await
    }

    async fn delete_book(&self, id: i64) -> DriverResult<DeleteResponse> {
        let path = format!("/books/{}", id);
        let text = self.send::<()>(Method::DELETE, &path, None).await?;
        // Some deployments answer 204 with no body.
        if text.trim().is_empty() {
            return Ok(DeleteResponse {
                message: "deleted".to_string(),
            });
        }
        serde_json::from_str(&text).map_err(|e| {
            DriverError::ProtocolError(format!("Failed to parse response: {} - Text: {}", e, text))
        })
    }

    async fn list_notes(&self, book_id: i64) -> DriverResult<Vec<Note>> {
        self.request::<_, ()>(Method::GET, &format!("/books/{}/notes", book_id), None)
            .await
    }

    async fn create_note(&self, book_id: i64, content: &str) -> DriverResult<Note> {
        let body = NewNote {
            content: content.to_string(),
        };
        self.request(
            Method::POST,
            &format!("/books/{}/notes", book_id),
            Some(&body),
        )
        .await
    }
}
