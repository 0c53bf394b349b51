//! File status refresh and the status-based commit rules.

use tracing::{debug, warn};

use crate::errors::{RemoteError, VcsError};
use crate::models::{FileEntry, ItemStatus};
use crate::session::RemoteSession;
use crate::tree::FileId;
use crate::workspace::Workspace;

/// What a checkin should do given the file's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinDecision {
    /// The repository moved past the local base; the checkin is refused.
    Refuse,
    /// Local and remote content already match.
    NothingToCommit,
    /// Submit the checkin. `force` is set for files the server reports as
    /// `Unknown` even though the local copy is newer.
    Proceed { force: bool },
}

impl CheckinDecision {
    pub fn for_status(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Merge | ItemStatus::OutOfDate => Self::Refuse,
            ItemStatus::Current => Self::NothingToCommit,
            ItemStatus::Modified => Self::Proceed { force: false },
            ItemStatus::Unknown => Self::Proceed { force: true },
        }
    }
}

/// Whether a verbose checkout over a file in this status must be confirmed.
pub fn needs_checkout_confirmation(status: ItemStatus) -> bool {
    !matches!(status, ItemStatus::Current | ItemStatus::OutOfDate)
}

impl<S: RemoteSession> Workspace<S> {
    /// Ask the server for the file's current status and record it.
    ///
    /// A [`RemoteError::TransientNoise`] answer keeps the cached status; any
    /// other failure aborts.
    pub fn refresh_status(&mut self, file: FileId) -> Result<ItemStatus, VcsError> {
        let remote = self.tree.file(file).remote;
        let result = self.session.update_status(remote);
        self.absorb_status(file, result)
    }

    /// Apply a status-bearing answer from the server to the cached node.
    pub(crate) fn absorb_status(
        &mut self,
        file: FileId,
        result: Result<FileEntry, RemoteError>,
    ) -> Result<ItemStatus, VcsError> {
        match result {
            Ok(entry) => {
                self.tree.update_file(file, &entry);
                debug!(file = %entry.name, status = %entry.status, "status refreshed");
                Ok(entry.status)
            }
            Err(RemoteError::TransientNoise) => {
                let node = self.tree.file(file);
                warn!(
                    file = %node.name,
                    status = %node.status,
                    "status refresh reported transient noise, keeping cached status"
                );
                Ok(node.status)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh and return the status of the file at `path`.
    pub fn update_status(&mut self, path: &str) -> Result<ItemStatus, VcsError> {
        let file = self.get_file(path)?;
        self.refresh_status(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::Operation;
    use crate::session::MemoryRepository;
    use crate::workspace::WorkspaceSettings;

    #[test]
    fn test_checkin_decision_table() {
        assert_eq!(CheckinDecision::for_status(ItemStatus::Merge), CheckinDecision::Refuse);
        assert_eq!(CheckinDecision::for_status(ItemStatus::OutOfDate), CheckinDecision::Refuse);
        assert_eq!(
            CheckinDecision::for_status(ItemStatus::Current),
            CheckinDecision::NothingToCommit
        );
        assert_eq!(
            CheckinDecision::for_status(ItemStatus::Modified),
            CheckinDecision::Proceed { force: false }
        );
        assert_eq!(
            CheckinDecision::for_status(ItemStatus::Unknown),
            CheckinDecision::Proceed { force: true }
        );
    }

    #[test]
    fn test_checkout_confirmation_rule() {
        assert!(!needs_checkout_confirmation(ItemStatus::Current));
        assert!(!needs_checkout_confirmation(ItemStatus::OutOfDate));
        assert!(needs_checkout_confirmation(ItemStatus::Modified));
        assert!(needs_checkout_confirmation(ItemStatus::Merge));
        assert!(needs_checkout_confirmation(ItemStatus::Unknown));
    }

    fn workspace(dir: &std::path::Path) -> (Workspace<MemoryRepository>, String) {
        let mut repo = MemoryRepository::new("alice");
        let root = repo.create_view("proj", "main", dir);
        let file = repo.seed_file(root, "a.txt", b"one", "initial");
        std::fs::write(dir.join("a.txt"), b"one").unwrap();
        repo.mark_working_copy(file);
        let settings = WorkspaceSettings::new("proj", "main").with_case_sensitive(true);
        let path = format!("{}/a.txt", dir.to_string_lossy().replace('\\', "/"));
        (Workspace::open(repo, settings).unwrap(), path)
    }

    #[test]
    fn test_update_status_tracks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ws, path) = workspace(dir.path());
        assert_eq!(ws.update_status(&path).unwrap(), ItemStatus::Current);
        std::fs::write(dir.path().join("a.txt"), b"edited").unwrap();
        assert_eq!(ws.update_status(&path).unwrap(), ItemStatus::Modified);
    }

    #[test]
    fn test_transient_noise_keeps_cached_status() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ws, path) = workspace(dir.path());
        let file = ws.get_file(&path).unwrap();
        assert_eq!(ws.refresh_status(file).unwrap(), ItemStatus::Current);

        std::fs::write(dir.path().join("a.txt"), b"edited").unwrap();
        ws.session()
            .fail_next(Operation::UpdateStatus, RemoteError::TransientNoise);
        assert_eq!(ws.refresh_status(file).unwrap(), ItemStatus::Current);
    }

    #[test]
    fn test_other_refresh_failures_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ws, path) = workspace(dir.path());
        let file = ws.get_file(&path).unwrap();
        ws.session()
            .fail_next(Operation::UpdateStatus, RemoteError::fatal("socket closed"));
        assert!(matches!(
            ws.refresh_status(file),
            Err(VcsError::Remote(RemoteError::Fatal(_)))
        ));
    }
}
