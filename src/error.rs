use thiserror::Error;

/// Fehler bei der Partition-Key Transformation eines einzelnen Dokuments
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("ambiguous or malformed value at {path}: {reason}")]
    AmbiguousOrMalformed { path: String, reason: String },

    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },
}

/// Fehler der Store-Schicht (Dokumente, Jobs, Deadletter)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Item existiert bereits oder Concurrency-Token passt nicht
    #[error("conditional write rejected")]
    Conflict,

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Service(String),
}

impl StoreError {
    /// Nur Throttling wird von der Retry-Schicht wiederholt
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }
}

/// Batch-Level Fehler, der an den Change-Stream zurückgegeben wird
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to persist deadletter object {name}: {source}")]
    DeadletterPersist {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to serialize deadletter payload: {0}")]
    Serialization(String),

    #[error("batch cancelled before completion")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<csv::Error> for MigrationError {
    fn from(err: csv::Error) -> Self {
        MigrationError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::Serialization(err.to_string())
    }
}
