// ⚠️ Book Errors - everything a single Book call can fail with
//
// Errors never escape a call as a panic: the Book records the text of the
// last failure (see `Book::last_error`) and returns either the error itself
// (mutations) or a neutral value (queries).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookError {
    /// Opening the embedded database failed. No statement was attempted.
    #[error("could not open database: {0}")]
    Connection(#[source] rusqlite::Error),

    /// A statement failed to prepare or execute.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The entity was never stored (it has no identity).
    #[error("{0}")]
    NotStored(&'static str),

    /// The entity references a row that is not present in the database.
    #[error("{kind} with id {id} is not present in the database")]
    MissingReference { kind: &'static str, id: uuid::Uuid },

    /// The data directory could not be created.
    #[error("could not create data directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = BookError> = std::result::Result<T, E>;
