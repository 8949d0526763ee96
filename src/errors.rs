use std::path::PathBuf;

use thiserror::Error;

use crate::ics::IcsError;

/// Errors surfaced by the library crate.
///
/// Each user-facing variant carries a distinct exit code so that scripts
/// can tell "no such todo" apart from "read-only" and so on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no todo with id {0}")]
    NoSuchTodo(i64),

    #[error("todo is read-only because there are multiple todos in {}", .0.display())]
    ReadOnly(PathBuf),

    #[error("no lists found matching {0}; create a directory for a new list")]
    NoListsFound(String),

    #[error("more than one {kind} has the same identity: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid value: {0}")]
    Validation(String),

    #[error("calendar error: {0}")]
    Ics(#[from] IcsError),

    #[error("cache error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("id file error: {0}")]
    IdFile(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoSuchTodo(_) => 20,
            Error::ReadOnly(_) => 21,
            Error::NoListsFound(_) => 22,
            Error::AlreadyExists { .. } => 23,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
