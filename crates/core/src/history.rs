//! Revision history of a file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::VcsError;
use crate::models::{ItemId, ItemKind};
use crate::session::RemoteSession;
use crate::tree::FileId;
use crate::workspace::Workspace;

/// Author shown when the server cannot name a revision's author.
pub const UNKNOWN_AUTHOR: &str = "unknown author";

/// One entry of a file's history.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    pub file: ItemId,
    /// Server-side, zero-based revision number.
    pub revision_number: u32,
    pub content_version: u32,
    pub author: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the view the history was read through.
    pub branch: String,
    #[serde(skip)]
    content: Option<Vec<u8>>,
}

impl Revision {
    /// One-based number shown to users.
    pub fn number(&self) -> u32 {
        self.revision_number + 1
    }

    /// Content fetched by [`Workspace::load_content`], if any.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
}

impl<S: RemoteSession> Workspace<S> {
    /// History of the file at `path`, oldest first.
    pub fn list_revisions(&mut self, path: &str) -> Result<Vec<Revision>, VcsError> {
        let file = self.get_file(path)?;
        self.revisions(file)
    }

    pub fn revisions(&mut self, file: FileId) -> Result<Vec<Revision>, VcsError> {
        let remote = self.tree.file(file).remote;
        let entries = self.session.list_history(remote)?;
        let branch = self.view.name.clone();
        let revisions = entries
            .into_iter()
            .map(|entry| {
                let author = self.session.user_name(entry.author).unwrap_or_else(|e| {
                    warn!(user = entry.author.0, error = %e, "cannot resolve revision author");
                    UNKNOWN_AUTHOR.to_string()
                });
                Revision {
                    file: entry.file,
                    revision_number: entry.revision_number,
                    content_version: entry.content_version,
                    author,
                    comment: entry.comment,
                    timestamp: entry.modified_at,
                    branch: branch.clone(),
                    content: None,
                }
            })
            .collect::<Vec<_>>();
        debug!(file = %self.tree.file(file).name, count = revisions.len(), "history listed");
        Ok(revisions)
    }

    /// Fetch the content of `revision`.
    ///
    /// The first call returns the bytes and caches them on the revision.
    /// Later calls return an empty buffer; the cached bytes stay available
    /// through [`Revision::content`].
    pub fn load_content(&self, revision: &mut Revision) -> Result<Vec<u8>, VcsError> {
        if revision.content.is_some() {
            return Ok(Vec::new());
        }
        if self.session.item_kind(revision.file)? != ItemKind::File {
            return Ok(Vec::new());
        }
        let bytes = self
            .session
            .fetch_revision_content(revision.file, revision.content_version)?;
        revision.content = Some(bytes.clone());
        Ok(bytes)
    }

    /// One-based number of the newest revision of the file at `path`, or
    /// `None` when the history is empty or cannot be read.
    pub fn current_revision_number(&mut self, path: &str) -> Option<u32> {
        let file = match self.get_file(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path, error = %e, "cannot resolve file for revision number");
                return None;
            }
        };
        self.current_revision_number_of(file)
    }

    pub fn current_revision_number_of(&mut self, file: FileId) -> Option<u32> {
        match self.revisions(file) {
            Ok(revisions) => revisions.last().map(Revision::number),
            Err(e) => {
                warn!(error = %e, "cannot list history");
                None
            }
        }
    }

    /// Content version of the file as last read from the server.
    pub fn get_file_revision(&self, file: FileId) -> u32 {
        self.tree.file(file).content_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;
    use crate::models::UserId;
    use crate::session::memory::Operation;
    use crate::session::MemoryRepository;
    use crate::workspace::WorkspaceSettings;

    fn workspace() -> (tempfile::TempDir, String, Workspace<MemoryRepository>) {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = MemoryRepository::new("alice");
        let bob = repo.add_user("bob", None);
        let root = repo.create_view("proj", "main", dir.path());
        let file = repo.seed_file(root, "a.txt", b"v1", "first");
        repo.seed_revision(file, b"v2", bob, "second");
        repo.seed_revision(file, b"v3", UserId(99), "third");
        let path = format!("{}/a.txt", dir.path().to_string_lossy().replace('\\', "/"));
        let settings = WorkspaceSettings::new("proj", "main").with_case_sensitive(true);
        (dir, path, Workspace::open(repo, settings).unwrap())
    }

    #[test]
    fn test_list_revisions() {
        let (_dir, path, mut ws) = workspace();
        let revisions = ws.list_revisions(&path).unwrap();
        assert_eq!(revisions.len(), 3);
        assert_eq!(revisions[0].author, "alice");
        assert_eq!(revisions[1].author, "bob");
        assert_eq!(revisions[2].author, UNKNOWN_AUTHOR);
        assert_eq!(revisions[2].comment, "third");
        assert_eq!(revisions[2].number(), 3);
        assert!(revisions.iter().all(|r| r.branch == "main"));
    }

    #[test]
    fn test_load_content_returns_bytes_once() {
        let (_dir, path, mut ws) = workspace();
        let mut revisions = ws.list_revisions(&path).unwrap();
        let second = &mut revisions[1];
        assert_eq!(ws.load_content(second).unwrap(), b"v2");
        assert!(ws.load_content(second).unwrap().is_empty());
        assert_eq!(second.content(), Some(&b"v2"[..]));
    }

    #[test]
    fn test_current_revision_number() {
        let (_dir, path, mut ws) = workspace();
        assert_eq!(ws.current_revision_number(&path), Some(3));

        ws.session()
            .fail_next(Operation::ListHistory, RemoteError::fatal("gone"));
        assert_eq!(ws.current_revision_number(&path), None);

        let missing = path.replace("a.txt", "zzz.txt");
        assert_eq!(ws.current_revision_number(&missing), None);
    }

    #[test]
    fn test_get_file_revision() {
        let (_dir, path, mut ws) = workspace();
        let file = ws.get_file(&path).unwrap();
        assert_eq!(ws.get_file_revision(file), 3);
    }
}
