use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::{DriverError, DriverResult};

/// Server-assigned ids are positive; anything below zero is a
/// client-generated placeholder that has not been confirmed yet.
pub fn is_temporary_id(id: i64) -> bool {
    id < 0
}

/// A book record as stored on the server and in the local cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub editor: String,
    #[serde(deserialize_with = "null_as_default")]
    pub year: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub read: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub favorite: bool,
    #[serde(deserialize_with = "lenient_rating")]
    pub rating: Option<u8>,
    pub cover: Option<String>,
    pub theme: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Ratings written by older clients may be fractional or numeric strings.
/// Rounded into 1..=5; zero, negatives and garbage read as unrated.
fn lenient_rating<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|r| r.is_finite() && *r > 0.0)
        .map(|r| r.round().clamp(1.0, 5.0) as u8))
}

impl Book {
    /// Record holding only `id`, every other field at its zero value.
    pub fn stub(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Build a full record from a partial payload, filling the gaps with
    /// zero values.
    pub fn from_patch(id: i64, patch: &BookPatch) -> Self {
        let mut book = Self::stub(id);
        book.apply(patch);
        book
    }

    /// Field-level merge. Absent fields are left untouched; an explicit
    /// `null` clears an optional field.
    pub fn apply(&mut self, patch: &BookPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(author) = &patch.author {
            self.author = author.clone();
        }
        if let Some(editor) = &patch.editor {
            self.editor = editor.clone();
        }
        if let Some(year) = patch.year {
            self.year = year;
        }
        if let Some(read) = patch.read {
            self.read = read;
        }
        if let Some(favorite) = patch.favorite {
            self.favorite = favorite;
        }
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
        if let Some(cover) = &patch.cover {
            self.cover = cover.clone();
        }
        if let Some(theme) = &patch.theme {
            self.theme = theme.clone();
        }
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(self.id)
    }
}

/// Partial book payload sent on create/update.
///
/// Optional book fields use a double `Option`: the outer level records
/// whether the field was present at all, the inner level whether it was
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub rating: Option<Option<u8>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub cover: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub theme: Option<Option<String>>,
}

// Only called when the key exists, so a JSON null lands as Some(None).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl BookPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = Some(read);
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    /// `None` clears the rating.
    pub fn rating(mut self, rating: Option<u8>) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn cover(mut self, cover: Option<String>) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn theme(mut self, theme: Option<String>) -> Self {
        self.theme = Some(theme);
        self
    }

    /// Forget every field that `newer` also sets. Returns whether any
    /// field is left.
    pub fn without(&mut self, newer: &BookPatch) -> bool {
        if newer.name.is_some() {
            self.name = None;
        }
        if newer.author.is_some() {
            self.author = None;
        }
        if newer.editor.is_some() {
            self.editor = None;
        }
        if newer.year.is_some() {
            self.year = None;
        }
        if newer.read.is_some() {
            self.read = None;
        }
        if newer.favorite.is_some() {
            self.favorite = None;
        }
        if newer.rating.is_some() {
            self.rating = None;
        }
        if newer.cover.is_some() {
            self.cover = None;
        }
        if newer.theme.is_some() {
            self.theme = None;
        }
        *self != BookPatch::default()
    }

    pub fn validate(&self) -> DriverResult<()> {
        if let Some(Some(rating)) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(DriverError::InvalidInput(format!(
                    "rating must be between 1 and 5, got {}",
                    rating
                )));
            }
        }
        Ok(())
    }
}

/// A note attached to a book. Never cached, never queued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub id: i64,
    #[serde(rename = "bookId")]
    pub book_id: i64,
    pub content: String,
    #[serde(rename = "dateISO")]
    pub date_iso: String,
}

/// Body of `POST /books/:id/notes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub content: String,
}

/// Body of a `DELETE /books/:id` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

impl DeleteResponse {
    pub const DELETED_OFFLINE: &'static str = "deleted_offline";

    pub fn deleted_offline() -> Self {
        Self {
            message: Self::DELETED_OFFLINE.to_string(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.message == Self::DELETED_OFFLINE
    }
}

/// A mutation that could not be applied remotely, waiting for a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PendingOp {
    Create {
        payload: BookPatch,
        #[serde(rename = "tempId")]
        temp_id: i64,
        ts: i64,
    },
    Update {
        id: i64,
        payload: BookPatch,
        ts: i64,
    },
    Delete {
        id: i64,
        ts: i64,
    },
}

impl PendingOp {
    /// Id of the book this operation touches (the placeholder for creates).
    pub fn target_id(&self) -> i64 {
        match self {
            PendingOp::Create { temp_id, .. } => *temp_id,
            PendingOp::Update { id, .. } | PendingOp::Delete { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingOp::Create { .. } => "create",
            PendingOp::Update { .. } => "update",
            PendingOp::Delete { .. } => "delete",
        }
    }

    /// Point an update/delete queued against `from` at `to`. Creates are
    /// left alone. Returns whether anything changed.
    pub fn retarget(&mut self, from: i64, to: i64) -> bool {
        match self {
            PendingOp::Update { id, .. } | PendingOp::Delete { id, .. } if *id == from => {
                *id = to;
                true
            }
            _ => false,
        }
    }
}
