/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found.
    #[error("storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: i64 },

    /// The operation's state precondition did not hold (e.g. beginning
    /// a run on a monitor that is already running).
    #[error("storage: {0}")]
    InvalidState(String),

    /// An underlying database error, including connection acquire and
    /// query timeouts; callers treat these as transient.
    #[error("storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON serialization failure on a payload column.
    #[error("storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column held a value outside its domain (unknown status or
    /// priority level).
    #[error("storage: invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
