//! Error types for evlog-archive

use std::path::PathBuf;

use evlog_core::CoreError;
use evlog_storage::StoreError;
use thiserror::Error;

/// Errors raised while naming, planning or writing archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error on an archive file or folder
    #[error("I/O error: {0}")]
    Io(String),

    /// Descriptor fields out of range
    #[error("Invalid archive descriptor: {0}")]
    InvalidDescriptor(String),

    /// File name not in the archive naming grammar
    #[error("Not an archive file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    /// Seal attempted with a conflicting or invalid range
    #[error("Cannot seal archive {current} with range {rid_min}-{rid_max}")]
    SealConflict {
        current: String,
        rid_min: i64,
        rid_max: i64,
    },

    /// The descriptor has no record id range yet
    #[error("Archive {0} is not sealed")]
    NotSealed(String),

    /// `build` called before `validate`
    #[error("Archive builder has not been validated")]
    NotValidated,

    /// `build` called after a failed validation, or the target appeared
    #[error("Archive validation failed: {0}")]
    Invalid(#[from] ValidationFailure),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

impl ArchiveError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFileName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reasons an archive request cannot be carried out
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("No records found at or after the starting record ID {0}")]
    NoRecordsFrom(i64),

    #[error("No records found at or before the ending record ID {0}")]
    NoRecordsUpTo(i64),

    #[error("Ending record ID {end} is less than the starting record ID {start}")]
    EndBeforeStart { start: i64, end: i64 },

    #[error("Ending record ID {end} is not in the same month as the starting record ID {start}")]
    SpansMonths { start: i64, end: i64 },

    #[error("Archive file {} already exists", .0.display())]
    TargetExists(PathBuf),
}

/// Framing errors in blob streams
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(String),

    /// Payload too large for the framing, rejected before writing
    #[error("Blob too large: {size} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload contains the delimited framing's end marker
    #[error("Blob contains an unsupported character (ASCII ETX)")]
    EmbeddedTerminator,

    /// Configured delimited record limit above the hard limit
    #[error("Blob size limit {0} too large (must be {max} or below)", max = crate::codec::delimited::HARD_MAX_BLOB_SIZE)]
    LimitTooLarge(usize),

    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A length-prefixed header that is not six digits and CRLF
    #[error("Invalid record header: {0}")]
    InvalidHeader(&'static str),

    /// A length-prefixed header carrying the gzip magic number
    #[error("Expecting a decompressed stream, but this looks like a GZip stream. Did you forget to insert a decompressor?")]
    LooksCompressed,

    #[error("No record end found, premature end of stream")]
    MissingRecordEnd,

    #[error("No record end within the maximum buffer size of {0} bytes")]
    RecordTooLong(usize),

    #[error("Record is not valid UTF-8")]
    InvalidUtf8,
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}
