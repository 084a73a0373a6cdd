use std::path::PathBuf;

/// An unexpected failure while a rule enumerates its locations.
///
/// Missing directories and permission problems are not errors: rules skip
/// those and report an empty category instead.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

/// Failure to read or modify the system configuration store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    PermissionDenied(String),

    #[error("configuration store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid registry path: {0}")]
    InvalidPath(String),

    #[error("registry I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Map an OS error from a store operation on `key` into the matching variant.
    pub fn from_io(key: impl Into<String>, err: std::io::Error) -> Self {
        let key = key.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(key),
            std::io::ErrorKind::PermissionDenied => StoreError::PermissionDenied(key),
            _ => StoreError::Io { key, source: err },
        }
    }
}

/// The audit destination could not be established or written.
///
/// This is the only error that aborts a deletion run.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("cannot open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write audit log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot flush audit log {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid exclusion pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
}

/// Why one item could not be deleted. Recorded in the audit log, never
/// propagated past the item.
#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),

    #[error("path no longer resolves inside {root}")]
    OutsideRoot { root: String },

    #[error("refusing to touch protected location {0}")]
    Protected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
