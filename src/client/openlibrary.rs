//! Edition-count lookup against the Open Library search API.

use crate::protocol::{DriverError, DriverResult};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_OPENLIBRARY_URL: &str = "https://openlibrary.org";

#[derive(Debug, Clone)]
pub struct OpenLibraryClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenLibraryClient {
    pub fn new(base_url: &str, timeout: Duration) -> DriverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::ConnectionError(format!("Failed to build client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Number of known editions for `title`: the first hit's
    /// `edition_count`, else the total hit count. Any failure yields `None`.
    pub async fn edition_count(&self, title: &str) -> Option<u64> {
        let url = match Url::parse_with_params(
            &format!("{}/search.json", self.base_url),
            &[("title", title)],
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!("edition_count: bad url: {}", e);
                return None;
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("edition_count({}) got HTTP {}", title, r.status());
                return None;
            }
            Err(e) => {
                warn!("edition_count({}) failed: {}", title, e);
                return None;
            }
        };

        match response.json::<Value>().await {
            Ok(data) => edition_count_from(&data),
            Err(e) => {
                warn!("edition_count({}) returned invalid JSON: {}", title, e);
                None
            }
        }
    }
}

fn edition_count_from(data: &Value) -> Option<u64> {
    let first = data
        .get("docs")
        .and_then(|d| d.as_array())
        .and_then(|docs| docs.first())
        .and_then(|doc| doc.get("edition_count"))
        .filter(|c| !c.is_null());

    match first {
        Some(count) => count.as_u64(),
        None => Some(data.get("numFound").and_then(|n| n.as_u64()).unwrap_or(0)),
    }
}
