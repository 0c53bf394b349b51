//! Session state shared between file-system event intake and user
//! operations.
//!
//! [`PendingChanges`] tracks paths that were created, removed or renamed on
//! disk but not yet reconciled with the repository. All access goes through
//! one mutex, so an `Arc<PendingChanges>` can be handed to a watcher thread
//! while the workspace keeps operating.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Prefix given to a removed managed folder that is kept aside on disk.
pub const REMOVED_FOLDER_PREFIX: &str = ".viewsync-removed.";

/// Plain copy of the pending sets, as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    /// Files created locally, keyed by case-folded path. The value keeps
    /// the path as it was recorded.
    pub new_files: BTreeMap<String, String>,
    pub removed_files: BTreeSet<String>,
    pub removed_folders: BTreeSet<String>,
    /// New path -> old path.
    pub renamed_files: BTreeMap<String, String>,
    /// New path -> old path.
    pub renamed_dirs: BTreeMap<String, String>,
}

impl PendingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.removed_files.is_empty()
            && self.removed_folders.is_empty()
            && self.renamed_files.is_empty()
            && self.renamed_dirs.is_empty()
    }

    pub fn insert_new_file(&mut self, path: &str) {
        self.new_files.insert(fold(path), path.to_string());
    }

    /// Drop entries the disk no longer agrees with: a removal only stands
    /// while the path is still absent, a rename while its new path exists,
    /// and a new file while it exists.
    pub fn retain_valid(mut self) -> Self {
        self.new_files.retain(|_, original| Path::new(original).exists());
        self.removed_files.retain(|p| !Path::new(p).exists());
        self.removed_folders.retain(|p| !Path::new(p).exists());
        self.renamed_files.retain(|new, _| Path::new(new).exists());
        self.renamed_dirs.retain(|new, _| Path::new(new).exists());
        self
    }
}

#[derive(Debug, Default)]
pub struct PendingChanges {
    inner: Mutex<PendingSnapshot>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("pending-changes mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn add_new_file(&self, path: &str) {
        self.lock().insert_new_file(path);
    }

    pub fn remove_new_file(&self, path: &str) -> bool {
        self.lock().new_files.remove(&fold(path)).is_some()
    }

    /// Case-insensitive membership test.
    pub fn contains_new(&self, path: &str) -> bool {
        self.lock().new_files.contains_key(&fold(path))
    }

    pub fn mark_removed_file(&self, path: &str) {
        self.lock().removed_files.insert(path.to_string());
    }

    pub fn mark_removed_folder(&self, path: &str) {
        self.lock().removed_folders.insert(path.to_string());
    }

    pub fn mark_renamed_file(&self, old: &str, new: &str) {
        self.lock()
            .renamed_files
            .insert(new.to_string(), old.to_string());
    }

    pub fn mark_renamed_dir(&self, old: &str, new: &str) {
        self.lock()
            .renamed_dirs
            .insert(new.to_string(), old.to_string());
    }

    /// Forget a file rename once the repository has caught up with it.
    pub fn forget_renamed_file(&self, new: &str) -> Option<String> {
        self.lock().renamed_files.remove(new)
    }

    pub fn forget_renamed_dir(&self, new: &str) -> Option<String> {
        self.lock().renamed_dirs.remove(new)
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        self.lock().clone()
    }

    /// Replace the pending sets with a previously saved snapshot, keeping
    /// only the entries that still match the disk.
    pub fn restore(&self, snapshot: PendingSnapshot) {
        let valid = snapshot.retain_valid();
        debug!(
            new = valid.new_files.len(),
            removed = valid.removed_files.len() + valid.removed_folders.len(),
            renamed = valid.renamed_files.len() + valid.renamed_dirs.len(),
            "restored pending changes"
        );
        *self.lock() = valid;
    }

    pub fn clear(&self) {
        *self.lock() = PendingSnapshot::default();
    }

    /// Keep a locally deleted managed folder aside instead of losing it:
    /// move it to a prefixed sibling and record the original path as
    /// removed. Returns where the content now lives.
    pub fn stash_removed_folder(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stash = dir.with_file_name(format!("{REMOVED_FOLDER_PREFIX}{name}"));
        if stash.exists() {
            std::fs::remove_dir_all(&stash)?;
        }
        std::fs::rename(dir, &stash)?;
        self.mark_removed_folder(&dir.to_string_lossy().replace('\\', "/"));
        info!(from = %dir.display(), to = %stash.display(), "stashed removed folder");
        Ok(stash)
    }
}

fn fold(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_files_are_case_folded() {
        let pending = PendingChanges::new();
        pending.add_new_file("/W/Src/A.txt");
        assert!(pending.contains_new("/w/src/a.TXT"));
        assert!(pending.remove_new_file("/w/SRC/a.txt"));
        assert!(!pending.contains_new("/w/src/a.txt"));
    }

    #[test]
    fn test_restore_applies_disk_checks() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"x").unwrap();
        let present = present.to_string_lossy().to_string();
        let absent = dir.path().join("absent.txt").to_string_lossy().to_string();

        let mut snapshot = PendingSnapshot::default();
        snapshot.insert_new_file(&present);
        snapshot.insert_new_file(&absent);
        snapshot.removed_files.insert(present.clone());
        snapshot.removed_files.insert(absent.clone());
        snapshot.renamed_files.insert(present.clone(), "old.txt".into());
        snapshot.renamed_files.insert(absent.clone(), "older.txt".into());

        let pending = PendingChanges::new();
        pending.restore(snapshot);
        let restored = pending.snapshot();
        assert!(restored.removed_files.contains(&absent));
        assert!(!restored.removed_files.contains(&present));
        assert_eq!(restored.renamed_files.len(), 1);
        assert!(restored.renamed_files.contains_key(&present));
        assert!(!pending.contains_new(&absent));
        assert!(pending.contains_new(&present));
    }

    #[test]
    fn test_restore_keeps_existing_mixed_case_new_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Src")).unwrap();
        let main = dir.path().join("Src").join("Main.txt");
        std::fs::write(&main, b"x").unwrap();
        let main = main.to_string_lossy().to_string();

        let before = PendingChanges::new();
        before.add_new_file(&main);

        let after = PendingChanges::new();
        after.restore(before.snapshot());
        assert!(after.contains_new(&main));
        assert_eq!(
            after.snapshot().new_files.values().collect::<Vec<_>>(),
            vec![&main]
        );
    }

    #[test]
    fn test_stash_removed_folder() {
        let dir = tempfile::tempdir().unwrap();
        let managed = dir.path().join("lib");
        std::fs::create_dir(&managed).unwrap();
        std::fs::write(managed.join("a.txt"), b"keep").unwrap();

        let pending = PendingChanges::new();
        let stash = pending.stash_removed_folder(&managed).unwrap();
        assert!(!managed.exists());
        assert_eq!(std::fs::read(stash.join("a.txt")).unwrap(), b"keep");
        assert_eq!(pending.snapshot().removed_folders.len(), 1);
    }

    #[test]
    fn test_clear() {
        let pending = PendingChanges::new();
        pending.mark_renamed_dir("/w/a", "/w/b");
        pending.mark_removed_file("/w/c.txt");
        assert!(!pending.snapshot().is_empty());
        pending.clear();
        assert!(pending.snapshot().is_empty());
    }
}
