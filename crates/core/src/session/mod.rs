//! The narrow interface the workspace consumes from a repository server.
//!
//! Connection, authentication and the wire protocol live behind
//! [`RemoteSession`]; the core only ever talks to a server through it.
//! [`MemoryRepository`] is the bundled implementation: a complete
//! in-process repository persisted as a JSON store.

pub mod memory;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RemoteError;
use crate::models::{FileEntry, FolderEntry, HistoryEntry, ItemId, ItemKind, UserId, ViewInfo};

pub use memory::MemoryRepository;

// ---------------------------------------------------------------------------
// Transaction options
// ---------------------------------------------------------------------------

/// What happens to a file's lock when a transaction completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Leave the existing lock state alone.
    #[default]
    Unchanged,
    /// Release any lock.
    Unlocked,
    /// Take a non-exclusive lock.
    NonExclusive,
}

/// End-of-line handling for file content written to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EolFormat {
    /// Write content exactly as stored.
    #[default]
    Platform,
    Lf,
    CrLf,
}

/// Options applied to a checkin transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinOptions {
    pub reason: String,
    pub lock: LockPolicy,
    pub eol: EolFormat,
    /// Refresh the file's status once the checkin commits.
    pub update_status: bool,
    /// Accept the checkin whatever the server-side status.
    pub force: bool,
    pub restore_on_error: bool,
}

impl Default for CheckinOptions {
    fn default() -> Self {
        Self {
            reason: String::new(),
            lock: LockPolicy::Unchanged,
            eol: EolFormat::Platform,
            update_status: true,
            force: false,
            restore_on_error: false,
        }
    }
}

impl CheckinOptions {
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_lock(mut self, lock: LockPolicy) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Options applied to a checkout transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOptions {
    pub lock: LockPolicy,
    pub eol: EolFormat,
    pub update_status: bool,
    /// Overwrite working files even when they carry local changes.
    pub force: bool,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            lock: LockPolicy::Unchanged,
            eol: EolFormat::Platform,
            update_status: true,
            force: false,
        }
    }
}

/// The two kinds of staged transaction a session manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Checkin,
    Checkout,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkin => write!(f, "checkin"),
            Self::Checkout => write!(f, "checkout"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session interface
// ---------------------------------------------------------------------------

/// An authenticated connection to one repository server.
///
/// Every call is a synchronous round trip. Checkins and checkouts are staged
/// with `submit_*` and applied by [`commit`](Self::commit).
pub trait RemoteSession {
    /// Names of all projects visible to the logged-in user.
    fn projects(&self) -> Result<Vec<String>, RemoteError>;

    /// Views of a project.
    fn views(&self, project: &str) -> Result<Vec<ViewInfo>, RemoteError>;

    /// Redirect the view's working location.
    fn set_view_alternate_path(&mut self, view: ItemId, path: &str) -> Result<(), RemoteError>;

    /// Re-read the view's folder tree.
    fn refresh_view(&mut self, view: ItemId) -> Result<(), RemoteError>;

    fn folder(&self, folder: ItemId) -> Result<FolderEntry, RemoteError>;

    fn list_child_folders(&self, folder: ItemId) -> Result<Vec<FolderEntry>, RemoteError>;

    fn list_child_files(&self, folder: ItemId) -> Result<Vec<FileEntry>, RemoteError>;

    /// Re-read the items directly under `folder`.
    fn refresh_folder(&mut self, folder: ItemId) -> Result<(), RemoteError>;

    fn file(&self, file: ItemId) -> Result<FileEntry, RemoteError>;

    /// Recompute the file's status against the repository tip.
    fn update_status(&mut self, file: ItemId) -> Result<FileEntry, RemoteError>;

    /// Record the working file's modification time. The returned entry
    /// carries the status the server now reports for the file.
    fn set_content_modified_time(
        &mut self,
        file: ItemId,
        at: DateTime<Utc>,
    ) -> Result<FileEntry, RemoteError>;

    /// Tip content of a file, without touching the working tree.
    fn fetch_content(&self, file: ItemId) -> Result<Vec<u8>, RemoteError>;

    /// Content of a file as of a past content version.
    fn fetch_revision_content(&self, file: ItemId, content_version: u32)
        -> Result<Vec<u8>, RemoteError>;

    fn submit_checkin(
        &mut self,
        file: ItemId,
        source: &Path,
        options: &CheckinOptions,
    ) -> Result<(), RemoteError>;

    /// Stage a checkout; `destination` of `None` means the file's default
    /// working location.
    fn submit_checkout(
        &mut self,
        file: ItemId,
        destination: Option<&Path>,
        options: &CheckoutOptions,
    ) -> Result<(), RemoteError>;

    /// Whether the staged transaction of this kind holds work to commit.
    fn can_commit(&self, kind: TransactionKind) -> bool;

    fn commit(&mut self, kind: TransactionKind) -> Result<(), RemoteError>;

    fn create_folder(
        &mut self,
        parent: ItemId,
        name: &str,
        path_fragment: &str,
    ) -> Result<FolderEntry, RemoteError>;

    fn set_path_fragment(&mut self, folder: ItemId, fragment: &str) -> Result<(), RemoteError>;

    fn set_alternate_path_fragment(&mut self, folder: ItemId, path: &str)
        -> Result<(), RemoteError>;

    /// Create an empty file item; content arrives with its first checkin.
    fn create_file(&mut self, parent: ItemId, name: &str) -> Result<FileEntry, RemoteError>;

    fn move_item(&mut self, item: ItemId, new_parent: ItemId) -> Result<(), RemoteError>;

    fn rename_item(&mut self, item: ItemId, new_name: &str) -> Result<(), RemoteError>;

    /// Take a non-exclusive lock.
    fn lock(&mut self, file: ItemId) -> Result<(), RemoteError>;

    /// Release the lock; unlocking an unlocked file succeeds.
    fn unlock(&mut self, file: ItemId) -> Result<(), RemoteError>;

    /// Revision history of a file, oldest first.
    fn list_history(&self, file: ItemId) -> Result<Vec<HistoryEntry>, RemoteError>;

    fn user_name(&self, user: UserId) -> Result<String, RemoteError>;

    fn item_kind(&self, item: ItemId) -> Result<ItemKind, RemoteError>;
}
