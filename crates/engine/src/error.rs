/// Classified failures returned by every table operation.
///
/// Each variant belongs to exactly one [`ErrorKind`]; callers that only care
/// about the class (for example "was this a constraint violation?") should
/// match on [`Error::kind`] instead of individual variants.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or schema shape.
    Validation,
    /// A uniqueness rule or field registration rule was violated.
    Constraint,
    /// The on-disk table cannot be opened with the requested schema/options.
    Compatibility,
    /// File system or KV store problem.
    Environment,
    /// Stored bytes could not be decoded.
    Internal,
}

/// Errors produced by the table engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The record type declares no fields at all.
    #[error("type '{0}' has no fields")]
    NoFields(String),

    /// More than one field is tagged `primary`.
    #[error("cannot specify multiple primary keys")]
    MultiplePrimaryKeys,

    /// No field is tagged `primary`.
    #[error("a primary key is required")]
    MissingPrimaryKey,

    /// A field carries a role tag that is not `primary`, `index` or `unique`.
    #[error("unknown tag '{tag}' on field '{field}'")]
    UnknownTag {
        /// Field name.
        field: String,
        /// The unrecognised tag.
        tag: String,
    },

    /// The record does not expose a field the schema refers to.
    #[error("record has no field '{0}'")]
    UnknownField(String),

    /// A required parameter was not supplied.
    #[error("missing required value: {0}")]
    MissingRequiredValue(&'static str),

    /// A record with the same primary key already exists.
    #[error("duplicate value for primary key")]
    DuplicatePrimaryKey,

    /// A live record already holds this value for a unique field.
    #[error("duplicate value for unique field: {0}")]
    DuplicateUnique(String),

    /// Index query against a field that is not registered as an index.
    #[error("field '{0}' is not indexed")]
    FieldNotIndexed(String),

    /// Unique query against a field that is not registered as unique.
    #[error("field '{0}' is not unique")]
    FieldNotUnique(String),

    /// The requested schema is incompatible with the stored one.
    #[error("property changed: {0}")]
    PropertyChanged(String),

    /// The requested options differ from the options the table was created with.
    #[error("cannot change options of existing table")]
    OptionsChanged,

    /// The table was written by a newer schema format.
    #[error("unsupported table version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found on disk.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// The file exists but is not a table file.
    #[error("bad table file: {}", .0.display())]
    BadTableFile(PathBuf),

    /// Migration source does not exist.
    #[error("table path not found: {}", .0.display())]
    TablePathNotFound(PathBuf),

    /// A backup from a previous migration is still present.
    #[error("backup already exists: {}", .0.display())]
    BackupExists(PathBuf),

    /// The table handle has been closed.
    #[error("table is closed")]
    Closed,

    /// The config bucket has no config entry.
    #[error("table config is missing")]
    MissingConfig,

    /// An insertion-order entry was not 8 bytes long.
    #[error("corrupt insertion sequence entry ({0} bytes)")]
    CorruptSequence(usize),

    /// The insertion sequence reached `u64::MAX`.
    #[error("insertion sequence overflow")]
    SequenceOverflow,

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// A stored record does not match the record type, for example a field
    /// added without `#[serde(default)]`.
    #[error("record codec error: {0}")]
    Record(#[source] serde_json::Error),

    /// The migration transform returned an error.
    #[error("migration transform failed: {0}")]
    Transform(#[source] anyhow::Error),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The KV store reported an error.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),
}

impl Error {
    /// Returns the class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoFields(_)
            | Error::MultiplePrimaryKeys
            | Error::MissingPrimaryKey
            | Error::UnknownTag { .. }
            | Error::UnknownField(_)
            | Error::MissingRequiredValue(_) => ErrorKind::Validation,
            Error::DuplicatePrimaryKey
            | Error::DuplicateUnique(_)
            | Error::FieldNotIndexed(_)
            | Error::FieldNotUnique(_) => ErrorKind::Constraint,
            Error::PropertyChanged(_)
            | Error::OptionsChanged
            | Error::UnsupportedVersion { .. } => ErrorKind::Compatibility,
            Error::BadTableFile(_)
            | Error::TablePathNotFound(_)
            | Error::BackupExists(_)
            | Error::Closed
            | Error::Io(_)
            | Error::Storage(_)
            | Error::Transform(_) => ErrorKind::Environment,
            Error::MissingConfig
            | Error::CorruptSequence(_)
            | Error::SequenceOverflow
            | Error::Codec(_)
            | Error::Record(_) => ErrorKind::Internal,
        }
    }
}

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(e: $ty) -> Self {
                    Error::Storage(e.into())
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
