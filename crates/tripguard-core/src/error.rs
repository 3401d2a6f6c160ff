//! Error types for tripguard

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // ── Store discipline ────────────────────────────────────────────────────
    #[error("nested transaction")]
    NestedTransaction,

    #[error("transaction required")]
    TransactionRequired,

    #[error("write transaction required")]
    WriteTransactionRequired,

    #[error("transaction forbidden")]
    TransactionForbidden,

    // ── Data ────────────────────────────────────────────────────────────────
    #[error("record exists: {path}")]
    RecordExists { path: String },

    #[error("path {path:?} does not exist in fileset {fileset:?}")]
    PathNotFound { path: String, fileset: String },

    #[error("unknown fileset {0:?}")]
    UnknownFileset(String),

    #[error("fileset {0:?} already exists")]
    FilesetExists(String),

    #[error("corrupt record for {path:?}: {source}")]
    CorruptRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Usage ───────────────────────────────────────────────────────────────
    #[error("fileset {0:?}: underscore prefix reserved for internal use")]
    ReservedFileset(String),

    #[error("fileset name must not be empty")]
    EmptyFileset,

    #[error("unknown check {0:?}")]
    UnknownCheck(String),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    // ── Collaborators ───────────────────────────────────────────────────────
    #[error("file {path:?}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} {path:?} check {check:?}: {source}")]
    Prepare {
        kind: &'static str,
        path: String,
        check: String,
        #[source]
        source: crate::checks::CheckError,
    },

    #[error("walk {path:?}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures of the fileset signature protocol. The three verification
/// outcomes are kept apart so an operator can tell them from each other.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("fileset signature {0:?} exists")]
    Exists(String),

    #[error("no signature for {0:?}, not added or tampered")]
    Missing(String),

    #[error("wrong password or tampered")]
    WrongPassword,

    #[error("contents changed or tampered")]
    ContentsChanged,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encrypt,
}

pub type Result<T> = std::result::Result<T, Error>;
