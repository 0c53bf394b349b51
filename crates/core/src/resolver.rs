//! Local path to repository item resolution.
//!
//! Paths are compared in a uniform form: `/` separators, a trailing `/`, and
//! lowercase when the working tree's filesystem folds case. Resolution walks
//! the folder tree from the root one segment at a time and gives up at the
//! first segment that matches no child; there is no best-effort result.

use tracing::debug;

use crate::errors::VcsError;
use crate::session::RemoteSession;
use crate::tree::{FileId, FolderId};
use crate::workspace::Workspace;

/// Uniform comparison form of a path.
pub fn normalize_path(path: &str, case_sensitive: bool) -> String {
    let mut path = path.replace('\\', "/");
    if !case_sensitive {
        path = path.to_lowercase();
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

impl<S: RemoteSession> Workspace<S> {
    /// Find the folder whose working path is `path`.
    ///
    /// Returns `Ok(None)` when the path lies outside the managed root or any
    /// segment is unknown. With an overlay configured, the resolved folder's
    /// alternate path is stamped with `path`.
    pub fn resolve_folder(&mut self, path: &str) -> Result<Option<FolderId>, VcsError> {
        let cs = self.settings.case_sensitive;
        let target = normalize_path(path, cs);
        let mut current_path = normalize_path(&self.effective_root_path(), cs);
        if !target.starts_with(&current_path) {
            debug!(path, root = %current_path, "path is outside the managed root");
            return Ok(None);
        }

        let mut current = self.tree.root();
        while current_path != target {
            let mut next = None;
            for child in self.subfolders(current)? {
                let candidate = normalize_path(
                    &format!("{current_path}{}", self.tree.folder(child).name),
                    cs,
                );
                if target.starts_with(&candidate) {
                    next = Some((child, candidate));
                    break;
                }
            }
            match next {
                Some((child, child_path)) => {
                    current = child;
                    current_path = child_path;
                }
                None => return Ok(None),
            }
        }

        if self.settings.alternate_working_path.is_some() && current != self.tree.root() {
            let stamp = path.replace('\\', "/").trim_end_matches('/').to_string();
            self.tree.folder_mut(current).alternate_path = Some(stamp);
        }
        Ok(Some(current))
    }

    /// Find the file at `path`. A path without a separator names a file in
    /// the view root.
    pub fn resolve_file(&mut self, path: &str) -> Result<Option<FileId>, VcsError> {
        let path = path.replace('\\', "/");
        let (folder, file_name) = match path.rfind('/') {
            Some(idx) => match self.resolve_folder(&path[..idx])? {
                Some(folder) => (folder, &path[idx + 1..]),
                None => return Ok(None),
            },
            None => (self.tree.root(), path.as_str()),
        };

        let cs = self.settings.case_sensitive;
        for file in self.files(folder)? {
            if names_match(&self.tree.file(file).name, file_name, cs) {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    /// Refresh the view and resolve `path`, failing with
    /// [`VcsError::FileNotFound`] when nothing is tracked there.
    pub fn get_file(&mut self, path: &str) -> Result<FileId, VcsError> {
        self.refresh()?;
        self.resolve_file(path)?
            .ok_or_else(|| VcsError::FileNotFound(path.to_string()))
    }

    /// Refresh the view and resolve `path`, failing with
    /// [`VcsError::FolderNotFound`] when nothing is tracked there.
    pub fn get_folder(&mut self, path: &str) -> Result<FolderId, VcsError> {
        self.refresh()?;
        self.resolve_folder(path)?
            .ok_or_else(|| VcsError::FolderNotFound(path.to_string()))
    }

    pub fn exists_file(&mut self, path: &str) -> Result<bool, VcsError> {
        Ok(self.resolve_file(path)?.is_some())
    }

    pub fn exists_folder(&mut self, path: &str) -> Result<bool, VcsError> {
        Ok(self.resolve_folder(path)?.is_some())
    }
}
