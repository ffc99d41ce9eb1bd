use crate::client::DEFAULT_OPENLIBRARY_URL;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the book service lives and where local state is kept
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the book REST service
    pub base_url: String,
    /// Per-request timeout applied by the HTTP transport
    pub request_timeout_secs: u64,
    /// Directory holding `sync.db`
    pub data_dir: PathBuf,
    /// Base URL of the Open Library search API
    pub openlibrary_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: default_data_dir(),
            openlibrary_url: DEFAULT_OPENLIBRARY_URL.to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `BOOKSHELF_API_URL`, `BOOKSHELF_TIMEOUT_SECS`,
    /// `BOOKSHELF_DATA_DIR` and `BOOKSHELF_OPENLIBRARY_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("BOOKSHELF_API_URL") {
            config.base_url = url;
        }
        if let Some(raw) = lookup("BOOKSHELF_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => config.request_timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid BOOKSHELF_TIMEOUT_SECS={}", raw),
            }
        }
        if let Some(dir) = lookup("BOOKSHELF_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("BOOKSHELF_OPENLIBRARY_URL") {
            config.openlibrary_url = url;
        }

        config
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join("bookshelf-sync")
}
