//! Error types for the viewsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Conflicts are absent from [`VcsError`]: a refused checkin or
//! checkout is reported as `Ok(false)` by the operation itself.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Remote session outcomes
// ---------------------------------------------------------------------------

/// Kind of repository entity named in a [`RemoteError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    View,
    Folder,
    File,
    Revision,
    User,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::View => write!(f, "view"),
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
            Self::Revision => write!(f, "revision"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Failure outcome of a [`RemoteSession`](crate::session::RemoteSession) call.
///
/// The variants let callers tell benign outcomes apart from real failures
/// without inspecting server messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The repository holds a copy newer than the one being submitted.
    #[error("the current copy of the object you are trying to modify is newer than your copy")]
    ConflictNewerOnServer,

    /// The revision being added is the same as the most recent revision.
    /// Raised by status refreshes right after a local modification.
    #[error("the revision being added is the same as the most recent revision")]
    TransientNoise,

    /// The addressed entity does not exist (any more) on the server.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Anything else: transport, permission, server-side failure.
    #[error("remote failure: {0}")]
    Fatal(String),
}

impl RemoteError {
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::Fatal(detail.into())
    }

    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace operation errors
// ---------------------------------------------------------------------------

/// Errors surfaced by workspace operations (checkin, checkout, tree mutation).
#[derive(Debug, Error)]
pub enum VcsError {
    /// The configured project does not exist on the server.
    #[error("configuration error: project '{0}' not found")]
    ProjectNotFound(String),

    /// The configured view does not exist in the project.
    #[error("configuration error: view '{0}' not found")]
    ViewNotFound(String),

    /// No file is tracked at the given path.
    #[error("configuration error: file '{0}' not found in repository")]
    FileNotFound(String),

    /// No folder is tracked at the given path.
    #[error("configuration error: folder '{0}' not found in repository")]
    FolderNotFound(String),

    /// The local working folder is missing.
    #[error("folder '{0}' not found on disk")]
    FolderNotFoundOnDisk(String),

    /// The local working file is missing.
    #[error("file '{0}' not found on disk")]
    FileNotFoundOnDisk(String),

    /// A path-relative operation was requested on a folder with no parent.
    #[error("folder '{0}' is the view root")]
    RootFolder(String),

    /// Fatal remote failure; aborts the current operation.
    #[error("repository operation failed: {0}")]
    Remote(#[from] RemoteError),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A stored value could not be decoded.
    #[error("corrupt {entity} record: {detail}")]
    Corrupt { entity: String, detail: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
