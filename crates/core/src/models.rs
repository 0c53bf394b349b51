//! Domain model types used throughout viewsync.
//!
//! These types bridge the remote session, the workspace operations, the
//! database layer and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Server-side identity of a repository item (folder or file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Server-side identity of a repository user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

/// What kind of entity an [`ItemId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Folder,
    File,
}

// ---------------------------------------------------------------------------
// Item status
// ---------------------------------------------------------------------------

/// Synchronization state of a file relative to the repository tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Present locally but not tracked as a modification target.
    Unknown,
    /// Local and remote content match.
    Current,
    /// Local differs from the remote base; the remote has not moved.
    Modified,
    /// Both the local copy and the remote advanced.
    Merge,
    /// The remote advanced past the local base.
    OutOfDate,
}

impl ItemStatus {
    /// Parse a status string into an `ItemStatus`.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "current" => Some(Self::Current),
            "modified" => Some(Self::Modified),
            "merge" => Some(Self::Merge),
            "out_of_date" => Some(Self::OutOfDate),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Current => write!(f, "current"),
            Self::Modified => write!(f, "modified"),
            Self::Merge => write!(f, "merge"),
            Self::OutOfDate => write!(f, "out_of_date"),
        }
    }
}

/// Lock state of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unlocked,
    NonExclusive,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlocked => write!(f, "unlocked"),
            Self::NonExclusive => write!(f, "locked"),
        }
    }
}

// ---------------------------------------------------------------------------
// Listing records returned by a remote session
// ---------------------------------------------------------------------------

/// A project and the views it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub id: ItemId,
    pub name: String,
    pub root: ItemId,
}

/// One folder as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub id: ItemId,
    pub name: String,
    /// Working-folder fragment; the root carries the absolute working path.
    pub path_fragment: String,
    pub alternate_path: Option<String>,
}

/// One file as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: ItemId,
    pub name: String,
    pub content_version: u32,
    pub status: ItemStatus,
    pub modified_at: DateTime<Utc>,
    pub modified_by: UserId,
    pub comment: String,
    pub lock: LockState,
}

/// One entry of a file's revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub file: ItemId,
    /// Zero-based position in the history.
    pub revision_number: u32,
    pub content_version: u32,
    pub modified_at: DateTime<Utc>,
    pub author: UserId,
    pub comment: String,
}

// ---------------------------------------------------------------------------
// Audit Entry
// ---------------------------------------------------------------------------

/// An audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub path: Option<String>,
    pub details: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a success audit entry.
    pub fn success(action: &str, path: Option<&str>, details: &str) -> Self {
        Self {
            action: action.to_string(),
            path: path.map(str::to_string),
            details: details.to_string(),
            success: true,
            timestamp: Utc::now(),
        }
    }

    /// Create a failure audit entry.
    pub fn failure(action: &str, path: Option<&str>, details: &str) -> Self {
        Self {
            action: action.to_string(),
            path: path.map(str::to_string),
            details: details.to_string(),
            success: false,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_status_round_trips_through_display() {
        for status in [
            ItemStatus::Unknown,
            ItemStatus::Current,
            ItemStatus::Modified,
            ItemStatus::Merge,
            ItemStatus::OutOfDate,
        ] {
            assert_eq!(ItemStatus::from_str_val(&status.to_string()), Some(status));
        }
        assert_eq!(ItemStatus::from_str_val("missing"), None);
    }

    #[test]
    fn test_item_id_serializes_transparently() {
        let json = serde_json::to_string(&ItemId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(ItemId(42).to_string(), "#42");
    }

    #[test]
    fn test_audit_entry_constructors() {
        let ok = AuditEntry::success("checkin", Some("/w/a.txt"), "fix");
        assert!(ok.success);
        assert_eq!(ok.path.as_deref(), Some("/w/a.txt"));

        let failed = AuditEntry::failure("checkout", None, "refused");
        assert!(!failed.success);
        assert!(failed.path.is_none());
    }
}
