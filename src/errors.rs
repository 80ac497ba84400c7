//! Error types for the pattern editor
//!
//! Most editing problems are not errors at all (an empty pattern or a
//! mismatched channel simply makes an operation a no-op). The variants here
//! cover corrupted song state and misuse of the history or session.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    /// A bar points at a pattern slot that does not exist
    #[error("channel {channel} references missing pattern {number}")]
    MissingPattern { channel: usize, number: usize },

    #[error("channel {0} out of range")]
    ChannelOutOfRange(usize),

    #[error("bar {0} out of range")]
    BarOutOfRange(usize),

    /// A loaded song breaks the document's structural rules
    #[error("malformed song: {0}")]
    MalformedSong(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// A command was replayed against state it was not recorded on
    #[error("history does not match song state: {0}")]
    HistoryMismatch(String),

    #[error("no undo history available")]
    NoUndoHistory,

    #[error("no redo history available")]
    NoRedoHistory,

    #[error("no song loaded")]
    NoSession,

    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for EditorError {
    fn from(err: serde_json::Error) -> Self {
        EditorError::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
