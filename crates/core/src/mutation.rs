//! Adding, renaming and moving folders and files.
//!
//! The local working tree is assumed to already reflect the change; these
//! operations bring the repository in line with it. When a rename or move
//! targets a folder that already exists in the repository, the source's
//! content is merged into it item by item instead.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::VcsError;
use crate::models::ItemStatus;
use crate::session::{LockPolicy, RemoteSession};
use crate::tree::FolderId;
use crate::workspace::Workspace;

/// What a folder rename touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenameScope {
    /// Repository name and working-folder fragment.
    NameAndFragment,
    /// Working-folder fragment only.
    FragmentOnly,
}

fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.replace('\\', "/").trim_end_matches('/'), name)
}

/// `path` with its last segment replaced by `name`.
fn sibling_path(path: &str, name: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => join_path(&trimmed[..idx], name),
        None => name.to_string(),
    }
}

impl<S: RemoteSession> Workspace<S> {
    /// Put the local file `folder_path/file_name` under version control.
    /// Does nothing when the repository already tracks it.
    pub fn add_file(&mut self, folder_path: &str, file_name: &str, comment: &str) -> Result<(), VcsError> {
        debug!(folder_path, file_name, "add_file");
        self.refresh()?;
        let folder = self
            .resolve_folder(folder_path)?
            .ok_or_else(|| VcsError::FolderNotFound(folder_path.to_string()))?;
        self.refresh_folder_items(folder)?;

        let file_path = join_path(folder_path, file_name);
        if self.resolve_file(&file_path)?.is_some() {
            debug!(path = %file_path, "file is already tracked");
            return Ok(());
        }

        let disk_folder = Path::new(folder_path);
        if !disk_folder.is_dir() {
            return Err(VcsError::FolderNotFoundOnDisk(folder_path.to_string()));
        }
        let disk_file = disk_folder.join(file_name);
        if !disk_file.is_file() {
            return Err(VcsError::FileNotFoundOnDisk(file_path));
        }

        let entry = self
            .session
            .create_file(self.tree.folder(folder).remote, file_name)?;
        let options = self
            .checkin_template
            .clone()
            .with_reason(comment)
            .with_lock(LockPolicy::Unlocked);
        self.submit_checkin(entry.id, &disk_file, &options)?;
        self.refresh_folder_items(folder)?;
        self.pending.remove_new_file(&file_path);
        info!(path = %file_path, "file added");
        Ok(())
    }

    /// Create the folder `name` under `parent_path`, or return the existing
    /// one.
    pub fn add_directory(&mut self, parent_path: &str, name: &str) -> Result<FolderId, VcsError> {
        debug!(parent_path, name, "add_directory");
        self.refresh()?;
        let parent = self
            .resolve_folder(parent_path)?
            .ok_or_else(|| VcsError::FolderNotFound(parent_path.to_string()))?;
        self.add_folder(parent, name)
    }

    pub(crate) fn add_folder(&mut self, parent: FolderId, name: &str) -> Result<FolderId, VcsError> {
        for sub in self.subfolders(parent)? {
            let node = self.tree.folder(sub);
            if node.name == name && node.parent == Some(parent) {
                return Ok(sub);
            }
        }
        let entry = self
            .session
            .create_folder(self.tree.folder(parent).remote, name, name)?;
        self.tree.invalidate(parent);
        let folder = self.tree.upsert_folder(&entry, Some(parent));
        info!(parent = %self.tree.folder(parent).name, name, "folder created");
        Ok(folder)
    }

    /// Rename the folder at `path` to `new_name`. When a sibling named
    /// `new_name` already exists, the folder's content is merged into it and
    /// the emptied source stays behind.
    pub fn rename_directory(&mut self, path: &str, new_name: &str, comment: &str) -> Result<(), VcsError> {
        debug!(path, new_name, "rename_directory");
        self.refresh()?;
        let folder = self
            .resolve_folder(path)?
            .ok_or_else(|| VcsError::FolderNotFound(path.to_string()))?;
        if folder == self.tree.root() {
            return Err(VcsError::RootFolder(path.to_string()));
        }

        let new_path = sibling_path(path, new_name);
        if self.resolve_folder(&new_path)?.is_some() {
            info!(from = path, to = %new_path, "rename target exists, merging content");
            return self.merge_into(folder, path, &new_path, comment);
        }

        self.rename_folder_node(folder, new_name, RenameScope::NameAndFragment, true)?;
        self.pending.forget_renamed_dir(&new_path);
        info!(from = path, to = %new_path, "folder renamed");
        Ok(())
    }

    /// Point the folder at `path` to a new working-folder name without
    /// renaming it in the repository. Does nothing when the sibling
    /// destination is already tracked.
    pub fn set_working_folder_name(&mut self, path: &str, new_name: &str) -> Result<(), VcsError> {
        debug!(path, new_name, "set_working_folder_name");
        self.refresh()?;
        let folder = self
            .resolve_folder(path)?
            .ok_or_else(|| VcsError::FolderNotFound(path.to_string()))?;
        if folder == self.tree.root() {
            return Err(VcsError::RootFolder(path.to_string()));
        }
        if self.resolve_folder(&sibling_path(path, new_name))?.is_some() {
            debug!(path, new_name, "working folder already exists");
            return Ok(());
        }
        self.rename_folder_node(folder, new_name, RenameScope::FragmentOnly, true)
    }

    pub(crate) fn rename_folder_node(
        &mut self,
        folder: FolderId,
        new_name: &str,
        scope: RenameScope,
        reconcile_statuses: bool,
    ) -> Result<(), VcsError> {
        let remote = self.tree.folder(folder).remote;
        if scope == RenameScope::NameAndFragment {
            self.session.rename_item(remote, new_name)?;
        }
        self.session.set_path_fragment(remote, new_name)?;

        let node = self.tree.folder_mut(folder);
        if scope == RenameScope::NameAndFragment {
            node.name = new_name.to_string();
        }
        node.path_fragment = new_name.to_string();
        if let Some(parent) = node.parent {
            self.tree.invalidate(parent);
        }
        self.tree.clear_alternate_paths(folder);

        if reconcile_statuses {
            for file in self.files(folder)? {
                self.refresh_status(file)?;
            }
        }
        self.refresh_folder_items(folder)
    }

    /// Move the folder at `path` under `new_parent_path` as `name`.
    ///
    /// An existing `name` under the new parent receives the content instead.
    /// After a real move, empty placeholders mirroring the moved subtree are
    /// left at the old location so pending work against the old paths still
    /// resolves.
    pub fn move_and_rename_directory(
        &mut self,
        path: &str,
        new_parent_path: &str,
        name: &str,
        comment: &str,
    ) -> Result<(), VcsError> {
        debug!(path, new_parent_path, name, "move_and_rename_directory");
        self.refresh()?;
        let folder = self
            .resolve_folder(path)?
            .ok_or_else(|| VcsError::FolderNotFound(path.to_string()))?;
        let new_parent = self
            .resolve_folder(new_parent_path)?
            .ok_or_else(|| VcsError::FolderNotFound(new_parent_path.to_string()))?;
        let old_parent = self
            .tree
            .folder(folder)
            .parent
            .ok_or_else(|| VcsError::RootFolder(path.to_string()))?;

        let destination = join_path(new_parent_path, name);
        if self.resolve_folder(&destination)?.is_some() {
            info!(from = path, to = %destination, "move target exists, merging content");
            return self.merge_into(folder, path, &destination, comment);
        }

        let remote = self.tree.folder(folder).remote;
        let old_name = self.tree.folder(folder).name.clone();
        self.session
            .move_item(remote, self.tree.folder(new_parent).remote)?;
        if old_name != name {
            self.session.rename_item(remote, name)?;
            self.session.set_path_fragment(remote, name)?;
        }
        let node = self.tree.folder_mut(folder);
        node.parent = Some(new_parent);
        node.name = name.to_string();
        if old_name != name {
            node.path_fragment = name.to_string();
        }
        self.tree.clear_alternate_paths(folder);

        self.refresh_folder_items(new_parent)?;
        self.refresh_folder_items(old_parent)?;

        let placeholder = self.add_folder(old_parent, &old_name)?;
        self.copy_directory_structure(folder, placeholder)?;
        self.pending.forget_renamed_dir(&destination);
        info!(from = path, to = %destination, "folder moved");
        Ok(())
    }

    /// Recreate the folder skeleton of `from` under `to`.
    fn copy_directory_structure(&mut self, from: FolderId, to: FolderId) -> Result<(), VcsError> {
        for sub in self.subfolders(from)? {
            let name = self.tree.folder(sub).name.clone();
            let copy = self.add_folder(to, &name)?;
            self.copy_directory_structure(sub, copy)?;
        }
        Ok(())
    }

    /// Move everything under `src` into the folder at `dest_path`: each
    /// subfolder through [`move_and_rename_directory`](Self::move_and_rename_directory),
    /// each file through
    /// [`move_rename_and_checkin_file`](Self::move_rename_and_checkin_file).
    fn merge_into(&mut self, src: FolderId, src_path: &str, dest_path: &str, comment: &str) -> Result<(), VcsError> {
        let subfolders: Vec<String> = self
            .subfolders(src)?
            .into_iter()
            .map(|f| self.tree.folder(f).name.clone())
            .collect();
        let files: Vec<String> = self
            .files(src)?
            .into_iter()
            .map(|f| self.tree.file(f).name.clone())
            .collect();

        for name in subfolders {
            self.move_and_rename_directory(&join_path(src_path, &name), dest_path, &name, comment)?;
        }
        for name in files {
            self.move_rename_and_checkin_file(&join_path(src_path, &name), dest_path, &name, comment)?;
        }
        Ok(())
    }

    /// Move the file at `file_path` into `new_parent_path` as `new_name` and
    /// check in the working copy found there.
    pub fn move_rename_and_checkin_file(
        &mut self,
        file_path: &str,
        new_parent_path: &str,
        new_name: &str,
        comment: &str,
    ) -> Result<(), VcsError> {
        debug!(file_path, new_parent_path, new_name, "move_rename_and_checkin_file");
        let file = self.get_file(file_path)?;
        let new_folder = self
            .resolve_folder(new_parent_path)?
            .ok_or_else(|| VcsError::FolderNotFound(new_parent_path.to_string()))?;
        let old_folder = self.tree.file(file).parent;
        let remote = self.tree.file(file).remote;

        self.session
            .move_item(remote, self.tree.folder(new_folder).remote)?;
        self.session.rename_item(remote, new_name)?;

        let new_path = join_path(new_parent_path, new_name);
        let options = self
            .checkin_template
            .clone()
            .with_reason(comment)
            .with_lock(LockPolicy::Unchanged);
        self.submit_checkin(remote, &PathBuf::from(&new_path), &options)?;

        self.refresh_folder_items(new_folder)?;
        self.refresh_folder_items(old_folder)?;
        self.pending.forget_renamed_file(&new_path);
        info!(from = file_path, to = %new_path, "file moved");
        Ok(())
    }

    /// Rename the file at `path` in place and check it in. Files the server
    /// reports as `Unknown` are checked in with force.
    pub fn rename_and_checkin_file(&mut self, path: &str, new_name: &str, comment: &str) -> Result<(), VcsError> {
        debug!(path, new_name, "rename_and_checkin_file");
        let file = self.get_file(path)?;
        let folder = self.tree.file(file).parent;
        let remote = self.tree.file(file).remote;

        self.session.rename_item(remote, new_name)?;
        let force = self.tree.file(file).status == ItemStatus::Unknown;
        let new_path = sibling_path(path, new_name);
        let options = self
            .checkin_template
            .clone()
            .with_reason(comment)
            .with_lock(LockPolicy::Unchanged)
            .with_force(force);
        self.submit_checkin(remote, &PathBuf::from(&new_path), &options)?;

        self.refresh_folder_items(folder)?;
        self.pending.forget_renamed_file(&new_path);
        info!(from = path, to = %new_path, force, "file renamed");
        Ok(())
    }
}
