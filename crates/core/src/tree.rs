//! Arena of folder and file nodes materialized from a remote view.
//!
//! Nodes are addressed by [`FolderId`] / [`FileId`] handles that stay valid
//! for the lifetime of the tree. Parent links and child lists are stored as
//! handles, so the structure never owns a cycle. Child lists are filled on
//! demand and dropped by [`ItemTree::invalidate`] after a mutation.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::models::{FileEntry, FolderEntry, ItemId, ItemStatus, LockState, UserId};

/// Handle of a folder node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(usize);

/// Handle of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

#[derive(Debug, Clone)]
pub struct FolderNode {
    pub remote: ItemId,
    pub name: String,
    pub path_fragment: String,
    /// Local override of this folder's working location.
    pub alternate_path: Option<String>,
    pub parent: Option<FolderId>,
    subfolders: Option<Vec<FolderId>>,
    files: Option<Vec<FileId>>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub remote: ItemId,
    pub parent: FolderId,
    pub name: String,
    pub content_version: u32,
    pub status: ItemStatus,
    pub modified_at: DateTime<Utc>,
    pub modified_by: UserId,
    pub comment: String,
    pub lock: LockState,
}

impl FileNode {
    fn apply(&mut self, entry: &FileEntry) {
        self.name = entry.name.clone();
        self.content_version = entry.content_version;
        self.status = entry.status;
        self.modified_at = entry.modified_at;
        self.modified_by = entry.modified_by;
        self.comment = entry.comment.clone();
        self.lock = entry.lock;
    }
}

#[derive(Debug)]
pub struct ItemTree {
    folders: Vec<FolderNode>,
    files: Vec<FileNode>,
    folder_index: HashMap<ItemId, FolderId>,
    file_index: HashMap<ItemId, FileId>,
    root: FolderId,
}

impl ItemTree {
    /// Start a tree from the view's root folder.
    pub fn new(root: FolderEntry) -> Self {
        let mut tree = Self {
            folders: Vec::new(),
            files: Vec::new(),
            folder_index: HashMap::new(),
            file_index: HashMap::new(),
            root: FolderId(0),
        };
        tree.root = tree.upsert_folder(&root, None);
        tree
    }

    pub fn root(&self) -> FolderId {
        self.root
    }

    pub fn folder(&self, id: FolderId) -> &FolderNode {
        &self.folders[id.0]
    }

    pub fn folder_mut(&mut self, id: FolderId) -> &mut FolderNode {
        &mut self.folders[id.0]
    }

    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.0]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut FileNode {
        &mut self.files[id.0]
    }

    pub fn folder_by_remote(&self, remote: ItemId) -> Option<FolderId> {
        self.folder_index.get(&remote).copied()
    }

    pub fn file_by_remote(&self, remote: ItemId) -> Option<FileId> {
        self.file_index.get(&remote).copied()
    }

    /// Insert or refresh a folder node. A locally stamped alternate path
    /// survives a refresh that carries none.
    pub fn upsert_folder(&mut self, entry: &FolderEntry, parent: Option<FolderId>) -> FolderId {
        if let Some(id) = self.folder_by_remote(entry.id) {
            let node = self.folder_mut(id);
            node.name = entry.name.clone();
            node.path_fragment = entry.path_fragment.clone();
            if entry.alternate_path.is_some() {
                node.alternate_path = entry.alternate_path.clone();
            }
            if parent.is_some() {
                node.parent = parent;
            }
            return id;
        }
        let id = FolderId(self.folders.len());
        self.folders.push(FolderNode {
            remote: entry.id,
            name: entry.name.clone(),
            path_fragment: entry.path_fragment.clone(),
            alternate_path: entry.alternate_path.clone(),
            parent,
            subfolders: None,
            files: None,
        });
        self.folder_index.insert(entry.id, id);
        id
    }

    pub fn upsert_file(&mut self, entry: &FileEntry, parent: FolderId) -> FileId {
        if let Some(id) = self.file_by_remote(entry.id) {
            let node = self.file_mut(id);
            node.apply(entry);
            node.parent = parent;
            return id;
        }
        let id = FileId(self.files.len());
        self.files.push(FileNode {
            remote: entry.id,
            parent,
            name: entry.name.clone(),
            content_version: entry.content_version,
            status: entry.status,
            modified_at: entry.modified_at,
            modified_by: entry.modified_by,
            comment: entry.comment.clone(),
            lock: entry.lock,
        });
        self.file_index.insert(entry.id, id);
        id
    }

    /// Refresh a file node's metadata in place.
    pub fn update_file(&mut self, id: FileId, entry: &FileEntry) {
        self.file_mut(id).apply(entry);
    }

    pub fn cached_subfolders(&self, id: FolderId) -> Option<&[FolderId]> {
        self.folder(id).subfolders.as_deref()
    }

    pub fn cached_files(&self, id: FolderId) -> Option<&[FileId]> {
        self.folder(id).files.as_deref()
    }

    pub fn set_subfolders(&mut self, id: FolderId, children: Vec<FolderId>) {
        self.folder_mut(id).subfolders = Some(children);
    }

    pub fn set_files(&mut self, id: FolderId, children: Vec<FileId>) {
        self.folder_mut(id).files = Some(children);
    }

    /// Drop the cached child lists of one folder.
    pub fn invalidate(&mut self, id: FolderId) {
        let node = self.folder_mut(id);
        node.subfolders = None;
        node.files = None;
    }

    pub fn invalidate_all(&mut self) {
        for node in &mut self.folders {
            node.subfolders = None;
            node.files = None;
        }
    }

    /// Working path of a folder with `/` separators and no trailing slash.
    /// The alternate path wins; otherwise the parent's path is extended by
    /// the fragment, and the root's fragment is its absolute path.
    pub fn folder_path(&self, id: FolderId) -> String {
        let node = self.folder(id);
        if let Some(alt) = &node.alternate_path {
            return trim_separator(&alt.replace('\\', "/"));
        }
        let fragment = node.path_fragment.replace('\\', "/");
        match node.parent {
            Some(parent) => format!(
                "{}/{}",
                self.folder_path(parent),
                fragment.trim_matches('/')
            ),
            None => trim_separator(&fragment),
        }
    }

    pub fn file_path(&self, id: FileId) -> String {
        let node = self.file(id);
        format!("{}/{}", self.folder_path(node.parent), node.name)
    }

    pub fn folder_disk_path(&self, id: FolderId) -> PathBuf {
        PathBuf::from(self.folder_path(id))
    }

    pub fn file_disk_path(&self, id: FileId) -> PathBuf {
        PathBuf::from(self.file_path(id))
    }

    /// Drop the alternate path of `folder` and of every folder below it.
    pub fn clear_alternate_paths(&mut self, folder: FolderId) {
        let subtree: Vec<usize> = (0..self.folders.len())
            .filter(|&i| self.is_ancestor(folder, FolderId(i)))
            .collect();
        for i in subtree {
            self.folders[i].alternate_path = None;
        }
    }

    /// Whether `ancestor` is `folder` or one of its parents.
    pub fn is_ancestor(&self, ancestor: FolderId, folder: FolderId) -> bool {
        let mut current = Some(folder);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.folder(id).parent;
        }
        false
    }
}

fn trim_separator(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
