//! Error types for evlog-storage

use evlog_core::{CoreError, ProviderId};
use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error while opening the store
    #[error("I/O error: {0}")]
    Io(String),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Requested item was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write attempted on a store opened read-only
    #[error("Store is opened read-only")]
    ReadOnly,

    /// Operation attempted on a committed or aborted import job
    #[error("Import job is closed")]
    JobClosed,

    /// A header row with this record id already exists
    #[error("Duplicate record id {0}")]
    DuplicateRecord(i64),

    /// Dimension rows disagree with each other or with the store
    #[error(transparent)]
    Dimension(#[from] DimensionError),

    /// Time conversion failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Consistency violations in the dimension caches
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DimensionError {
    /// A known provider name observed with a different GUID
    #[error("Conflicting provider GUID declaration for '{name}': '{}' vs '{}'",
        .existing.as_deref().unwrap_or("NULL"), .observed.as_deref().unwrap_or("NULL"))]
    GuidConflict {
        name: String,
        existing: Option<String>,
        observed: Option<String>,
    },

    /// An explicit provider id is already bound to another name
    #[error("Provider ID {id} is already in use by '{bound_to}'")]
    IdInUse { id: ProviderId, bound_to: String },

    /// A provider name is already registered under another id
    #[error("Provider '{name}' is already registered as ID {id}")]
    NameRegistered { name: String, id: ProviderId },

    /// A provider row to flush already exists in the store
    #[error("Provider ID {0} already exists in the store")]
    AlreadyPersisted(ProviderId),

    /// Every surrogate provider id has been assigned
    #[error("No provider IDs left to assign")]
    IdsExhausted,
}

impl StoreError {
    /// Create a new NotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    /// Create a new Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Whether this error came from the dimension consistency checks
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Dimension(_) | Self::DuplicateRecord(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Convert from postcard Error to StoreError
impl From<postcard::Error> for StoreError {
    fn from(err: postcard::Error) -> Self {
        StoreError::Deserialization(err.to_string())
    }
}

macro_rules! database_error_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StoreError {
                fn from(err: $source) -> Self {
                    StoreError::Database(err.to_string())
                }
            }
        )*
    };
}

database_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
