use thiserror::Error;

/// Error type for docgraph operations.
#[derive(Debug, Error)]
pub enum DocGraphError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("type conflict: {0}")]
    TypeConflict(String),
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("a transaction is already active")]
    TransactionAlreadyActive,
    #[error("dangling endpoint: {0}")]
    DanglingEndpoint(String),
    #[error("write conflict: {0}")]
    WriteConflict(String),
    #[error("database is closed")]
    DatabaseClosed,
    #[error("query syntax error at {position}: {message}")]
    QuerySyntaxError { position: usize, message: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("database is read-only")]
    ReadOnly,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl DocGraphError {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        DocGraphError::NotFound(msg.into())
    }

    pub fn type_conflict<T: Into<String>>(msg: T) -> Self {
        DocGraphError::TypeConflict(msg.into())
    }

    pub fn dangling<T: Into<String>>(msg: T) -> Self {
        DocGraphError::DanglingEndpoint(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        DocGraphError::WriteConflict(msg.into())
    }

    pub fn syntax<T: Into<String>>(position: usize, msg: T) -> Self {
        DocGraphError::QuerySyntaxError {
            position,
            message: msg.into(),
        }
    }

    pub fn invalid_argument<T: Into<String>>(msg: T) -> Self {
        DocGraphError::InvalidArgument(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        DocGraphError::Timeout(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        DocGraphError::Storage(msg.into())
    }
}

impl From<rusqlite::Error> for DocGraphError {
    fn from(err: rusqlite::Error) -> Self {
        DocGraphError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DocGraphError {
    fn from(err: serde_json::Error) -> Self {
        DocGraphError::Storage(err.to_string())
    }
}
