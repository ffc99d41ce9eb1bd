mod error;
mod types;

pub use error::{DriverError, DriverResult};
pub use types::{
    is_temporary_id, Book, BookPatch, DeleteResponse, NewNote, Note, PendingOp,
};
