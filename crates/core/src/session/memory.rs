//! In-process repository server.
//!
//! [`MemoryRepository`] keeps projects, views, the folder/file tree, revision
//! history and locks in memory and can be persisted to a JSON store. File
//! status is computed the way a real server does it: by hashing the working
//! file on disk and comparing it with the recorded working base and the
//! repository tip.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    CheckinOptions, CheckoutOptions, EolFormat, LockPolicy, RemoteSession, TransactionKind,
};
use crate::errors::{EntityKind, RemoteError};
use crate::models::{
    FileEntry, FolderEntry, HistoryEntry, ItemId, ItemKind, ItemStatus, LockState, UserId,
    ViewInfo,
};
use crate::property::{default_file_properties, init_properties, ItemProperty};

// ---------------------------------------------------------------------------
// Call journal and fault injection
// ---------------------------------------------------------------------------

/// Every remote call the repository answers, for journaling and fault
/// injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Projects,
    Views,
    SetViewAlternatePath,
    RefreshView,
    GetFolder,
    ListFolders,
    ListFiles,
    RefreshFolder,
    GetFile,
    UpdateStatus,
    StampModifiedTime,
    FetchContent,
    SubmitCheckin,
    SubmitCheckout,
    Commit,
    CreateFolder,
    CreateFile,
    SetPathFragment,
    SetAlternatePath,
    Move,
    Rename,
    Lock,
    Unlock,
    ListHistory,
    UserName,
    ItemKind,
}

impl Operation {
    /// Whether the call changes repository state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::SubmitCheckin
                | Self::SubmitCheckout
                | Self::Commit
                | Self::CreateFolder
                | Self::CreateFile
                | Self::SetPathFragment
                | Self::Move
                | Self::Rename
                | Self::Lock
                | Self::Unlock
        )
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    name: String,
    #[serde(default)]
    password_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectRecord {
    name: String,
    views: Vec<ViewRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ViewRecord {
    id: ItemId,
    name: String,
    root: ItemId,
    #[serde(default)]
    alternate_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FolderRecord {
    name: String,
    parent: Option<ItemId>,
    path_fragment: String,
    #[serde(default)]
    alternate_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevisionRecord {
    #[serde(with = "hex_bytes")]
    content: Vec<u8>,
    modified_at: DateTime<Utc>,
    author: UserId,
    comment: String,
}

/// What the working copy was last synchronized to.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkingBase {
    version: u32,
    sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    name: String,
    parent: ItemId,
    created_at: DateTime<Utc>,
    created_by: UserId,
    revisions: Vec<RevisionRecord>,
    #[serde(default)]
    working: Option<WorkingBase>,
    #[serde(default)]
    content_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    lock: LockState,
    status: ItemStatus,
    #[serde(default)]
    properties: Vec<ItemProperty>,
}

impl FileRecord {
    fn content_version(&self) -> u32 {
        self.revisions.len() as u32
    }

    fn tip(&self) -> Option<&RevisionRecord> {
        self.revisions.last()
    }

    /// Status of the working copy given the bytes currently on disk.
    fn status_for(&self, local: Option<&[u8]>) -> ItemStatus {
        let (Some(tip), Some(base)) = (self.tip(), self.working.as_ref()) else {
            return ItemStatus::Unknown;
        };
        let Some(local) = local else {
            return ItemStatus::OutOfDate;
        };
        let local_hash = sha256_hex(local);
        if local_hash == sha256_hex(&tip.content) {
            return ItemStatus::Current;
        }
        let locally_changed = local_hash != base.sha256;
        let remote_advanced = self.content_version() > base.version;
        match (locally_changed, remote_advanced) {
            (true, true) => ItemStatus::Merge,
            (true, false) => ItemStatus::Modified,
            (false, true) => ItemStatus::OutOfDate,
            (false, false) => ItemStatus::Current,
        }
    }
}

#[derive(Debug, Clone)]
struct StagedCheckin {
    file: ItemId,
    content: Vec<u8>,
    options: CheckinOptions,
}

/// An injected failure, raised once `skip` more calls have gone through.
#[derive(Debug)]
struct Fault {
    skip: usize,
    err: RemoteError,
}

#[derive(Debug, Clone)]
struct StagedCheckout {
    file: ItemId,
    destination: PathBuf,
    options: CheckoutOptions,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// A complete repository server living in process memory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryRepository {
    next_id: u64,
    users: BTreeMap<UserId, UserRecord>,
    projects: Vec<ProjectRecord>,
    folders: BTreeMap<ItemId, FolderRecord>,
    files: BTreeMap<ItemId, FileRecord>,

    #[serde(skip)]
    current_user: Option<UserId>,
    #[serde(skip)]
    store_path: Option<PathBuf>,
    #[serde(skip)]
    staged_checkins: Vec<StagedCheckin>,
    #[serde(skip)]
    staged_checkouts: Vec<StagedCheckout>,
    #[serde(skip)]
    faults: RefCell<HashMap<Operation, Fault>>,
    #[serde(skip)]
    calls: RefCell<Vec<Operation>>,
}

impl MemoryRepository {
    /// Create an empty repository with one user, already logged on.
    pub fn new(user: &str) -> Self {
        let mut repo = Self::default();
        let id = repo.add_user(user, None);
        repo.current_user = Some(id);
        repo
    }

    /// Load a repository from its JSON store. Call [`log_on`](Self::log_on)
    /// before mutating it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RemoteError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening repository store");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RemoteError::fatal(format!("cannot read store {}: {e}", path.display()))
        })?;
        let mut repo: Self = serde_json::from_str(&contents)
            .map_err(|e| RemoteError::fatal(format!("corrupt store {}: {e}", path.display())))?;
        repo.store_path = Some(path.to_path_buf());
        Ok(repo)
    }

    /// Write the repository back to the store it was opened from.
    pub fn save(&self) -> Result<(), RemoteError> {
        let path = self
            .store_path
            .as_deref()
            .ok_or_else(|| RemoteError::fatal("repository has no store path"))?;
        self.save_to(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), RemoteError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RemoteError::fatal(format!("cannot encode store: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RemoteError::fatal(format!("cannot create {}: {e}", parent.display())))?;
        }
        std::fs::write(path, json)
            .map_err(|e| RemoteError::fatal(format!("cannot write store {}: {e}", path.display())))?;
        debug!(path = %path.display(), "repository store saved");
        Ok(())
    }

    pub fn set_store_path<P: AsRef<Path>>(&mut self, path: P) {
        self.store_path = Some(path.as_ref().to_path_buf());
    }

    /// Register a user. The password, if any, is kept as a SHA-256 digest.
    pub fn add_user(&mut self, name: &str, password: Option<&str>) -> UserId {
        let id = UserId(self.users.keys().map(|u| u.0 + 1).max().unwrap_or(1));
        self.users.insert(
            id,
            UserRecord {
                name: name.to_string(),
                password_sha256: password.map(|p| sha256_hex(p.as_bytes())),
            },
        );
        id
    }

    /// Authenticate as `user`.
    pub fn log_on(&mut self, user: &str, password: Option<&str>) -> Result<UserId, RemoteError> {
        let (id, record) = self
            .users
            .iter()
            .find(|(_, u)| u.name == user)
            .ok_or_else(|| RemoteError::fatal(format!("unknown user '{user}'")))?;
        if let Some(expected) = &record.password_sha256 {
            let given = password.map(|p| sha256_hex(p.as_bytes()));
            if given.as_deref() != Some(expected.as_str()) {
                return Err(RemoteError::fatal(format!("authentication failed for '{user}'")));
            }
        }
        let id = *id;
        self.current_user = Some(id);
        info!(user, "logged on");
        Ok(id)
    }

    /// Drop a user record. Revisions authored by it keep the dangling
    /// reference, which makes author lookups fail.
    pub fn forget_user(&mut self, user: UserId) {
        self.users.remove(&user);
    }

    /// Create a view whose root folder works out of `working_root`, creating
    /// the project on first use. Returns the root folder.
    pub fn create_view<P: AsRef<Path>>(&mut self, project: &str, view: &str, working_root: P) -> ItemId {
        let root = self.alloc_id();
        self.folders.insert(
            root,
            FolderRecord {
                name: project.to_string(),
                parent: None,
                path_fragment: path_string(working_root.as_ref()),
                alternate_path: None,
            },
        );
        let view_id = self.alloc_id();
        let record = ViewRecord {
            id: view_id,
            name: view.to_string(),
            root,
            alternate_path: None,
        };
        match self.projects.iter_mut().find(|p| p.name == project) {
            Some(p) => p.views.push(record),
            None => self.projects.push(ProjectRecord {
                name: project.to_string(),
                views: vec![record],
            }),
        }
        root
    }

    /// Create a folder directly, outside any transaction.
    pub fn seed_folder(&mut self, parent: ItemId, name: &str) -> ItemId {
        let id = self.alloc_id();
        self.folders.insert(
            id,
            FolderRecord {
                name: name.to_string(),
                parent: Some(parent),
                path_fragment: name.to_string(),
                alternate_path: None,
            },
        );
        id
    }

    /// Create a file with one revision. No working copy is recorded.
    pub fn seed_file(&mut self, parent: ItemId, name: &str, content: &[u8], comment: &str) -> ItemId {
        let id = self.alloc_id();
        let author = self.current_user.unwrap_or(UserId(1));
        let now = Utc::now();
        self.files.insert(
            id,
            FileRecord {
                name: name.to_string(),
                parent,
                created_at: now,
                created_by: author,
                revisions: vec![RevisionRecord {
                    content: content.to_vec(),
                    modified_at: now,
                    author,
                    comment: comment.to_string(),
                }],
                working: None,
                content_modified_at: None,
                lock: LockState::Unlocked,
                status: ItemStatus::Unknown,
                properties: default_file_properties(),
            },
        );
        id
    }

    /// Append a revision as if another user had checked it in.
    pub fn seed_revision(&mut self, file: ItemId, content: &[u8], author: UserId, comment: &str) {
        if let Some(record) = self.files.get_mut(&file) {
            record.revisions.push(RevisionRecord {
                content: content.to_vec(),
                modified_at: Utc::now(),
                author,
                comment: comment.to_string(),
            });
        }
    }

    /// Record that the working copy holds the tip revision.
    pub fn mark_working_copy(&mut self, file: ItemId) {
        if let Some(record) = self.files.get_mut(&file) {
            if let Some(tip) = record.revisions.last() {
                record.working = Some(WorkingBase {
                    version: record.revisions.len() as u32,
                    sha256: sha256_hex(&tip.content),
                });
                record.status = ItemStatus::Current;
            }
        }
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Operation, err: RemoteError) {
        self.fail_after(op, 0, err);
    }

    /// Let `skip` calls of `op` succeed, then fail the next one with `err`.
    pub fn fail_after(&self, op: Operation, skip: usize, err: RemoteError) {
        self.faults.borrow_mut().insert(op, Fault { skip, err });
    }

    /// Calls answered since the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.borrow().iter().filter(|op| op.is_mutation()).count()
    }

    /// Default working location of a file.
    pub fn working_path(&self, file: ItemId) -> Option<PathBuf> {
        let record = self.files.get(&file)?;
        Some(self.folder_working_path(record.parent)?.join(&record.name))
    }

    // -- internals ----------------------------------------------------------

    fn alloc_id(&mut self) -> ItemId {
        self.next_id += 1;
        ItemId(self.next_id)
    }

    fn enter(&self, op: Operation) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(op);
        let mut faults = self.faults.borrow_mut();
        if let Some(fault) = faults.get_mut(&op) {
            if fault.skip > 0 {
                fault.skip -= 1;
                return Ok(());
            }
        }
        match faults.remove(&op) {
            Some(Fault { err, .. }) => {
                warn!(?op, %err, "injected remote failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn author(&self) -> Result<UserId, RemoteError> {
        self.current_user
            .ok_or_else(|| RemoteError::fatal("not logged on"))
    }

    fn folder_record(&self, id: ItemId) -> Result<&FolderRecord, RemoteError> {
        self.folders
            .get(&id)
            .ok_or_else(|| RemoteError::not_found(EntityKind::Folder, id))
    }

    fn folder_record_mut(&mut self, id: ItemId) -> Result<&mut FolderRecord, RemoteError> {
        self.folders
            .get_mut(&id)
            .ok_or_else(|| RemoteError::not_found(EntityKind::Folder, id))
    }

    fn file_record(&self, id: ItemId) -> Result<&FileRecord, RemoteError> {
        self.files
            .get(&id)
            .ok_or_else(|| RemoteError::not_found(EntityKind::File, id))
    }

    fn file_record_mut(&mut self, id: ItemId) -> Result<&mut FileRecord, RemoteError> {
        self.files
            .get_mut(&id)
            .ok_or_else(|| RemoteError::not_found(EntityKind::File, id))
    }

    fn folder_working_path(&self, id: ItemId) -> Option<PathBuf> {
        let record = self.folders.get(&id)?;
        if let Some(alt) = &record.alternate_path {
            return Some(PathBuf::from(alt));
        }
        match record.parent {
            Some(parent) => Some(self.folder_working_path(parent)?.join(&record.path_fragment)),
            None => Some(PathBuf::from(&record.path_fragment)),
        }
    }

    fn folder_entry(&self, id: ItemId, record: &FolderRecord) -> FolderEntry {
        FolderEntry {
            id,
            name: record.name.clone(),
            path_fragment: record.path_fragment.clone(),
            alternate_path: record.alternate_path.clone(),
        }
    }

    fn file_entry(&self, id: ItemId, record: &FileRecord) -> FileEntry {
        let tip = record.tip();
        FileEntry {
            id,
            name: record.name.clone(),
            content_version: record.content_version(),
            status: record.status,
            modified_at: tip.map(|t| t.modified_at).unwrap_or(record.created_at),
            modified_by: tip.map(|t| t.author).unwrap_or(record.created_by),
            comment: tip.map(|t| t.comment.clone()).unwrap_or_default(),
            lock: record.lock,
        }
    }

    fn recompute_status(&mut self, file: ItemId) -> Result<FileEntry, RemoteError> {
        let local = self
            .working_path(file)
            .and_then(|p| std::fs::read(p).ok());
        let record = self.file_record_mut(file)?;
        record.status = record.status_for(local.as_deref());
        let record = self.file_record(file)?;
        Ok(self.file_entry(file, record))
    }

    fn is_descendant_or_self(&self, candidate: ItemId, ancestor: ItemId) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.folders.get(&id).and_then(|f| f.parent);
        }
        false
    }

    fn apply_lock_policy(record: &mut FileRecord, policy: LockPolicy) {
        match policy {
            LockPolicy::Unchanged => {}
            LockPolicy::Unlocked => record.lock = LockState::Unlocked,
            LockPolicy::NonExclusive => record.lock = LockState::NonExclusive,
        }
    }

    fn commit_checkins(&mut self, tx: Uuid) -> Result<(), RemoteError> {
        let author = self.author()?;
        for staged in std::mem::take(&mut self.staged_checkins) {
            let record = self.file_record_mut(staged.file)?;
            let stored = convert_eol(&staged.content, staged.options.eol);
            let changed = record
                .tip()
                .map(|t| sha256_hex(&t.content) != sha256_hex(&stored))
                .unwrap_or(true);
            if changed {
                record.revisions.push(RevisionRecord {
                    content: stored,
                    modified_at: Utc::now(),
                    author,
                    comment: staged.options.reason.clone(),
                });
            }
            record.working = Some(WorkingBase {
                version: record.content_version(),
                sha256: sha256_hex(&staged.content),
            });
            if staged.options.update_status {
                record.status = ItemStatus::Current;
            }
            Self::apply_lock_policy(record, staged.options.lock);
            info!(%tx, file = %staged.file, version = record.content_version(), changed, "checkin committed");
        }
        Ok(())
    }

    fn commit_checkouts(&mut self, tx: Uuid) -> Result<(), RemoteError> {
        for staged in std::mem::take(&mut self.staged_checkouts) {
            let record = self.file_record(staged.file)?;
            let tip = record
                .tip()
                .ok_or_else(|| RemoteError::not_found(EntityKind::Revision, staged.file))?;
            let content = convert_eol(&tip.content, staged.options.eol);
            if let Some(parent) = staged.destination.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RemoteError::fatal(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            std::fs::write(&staged.destination, &content).map_err(|e| {
                RemoteError::fatal(format!("cannot write {}: {e}", staged.destination.display()))
            })?;
            let record = self.file_record_mut(staged.file)?;
            record.working = Some(WorkingBase {
                version: record.content_version(),
                sha256: sha256_hex(&content),
            });
            if staged.options.update_status {
                record.status = ItemStatus::Current;
            }
            Self::apply_lock_policy(record, staged.options.lock);
            info!(%tx, file = %staged.file, destination = %staged.destination.display(), "checkout committed");
        }
        Ok(())
    }
}

impl RemoteSession for MemoryRepository {
    fn projects(&self) -> Result<Vec<String>, RemoteError> {
        self.enter(Operation::Projects)?;
        Ok(self.projects.iter().map(|p| p.name.clone()).collect())
    }

    fn views(&self, project: &str) -> Result<Vec<ViewInfo>, RemoteError> {
        self.enter(Operation::Views)?;
        let project = self
            .projects
            .iter()
            .find(|p| p.name == project)
            .ok_or_else(|| RemoteError::not_found(EntityKind::Project, project))?;
        Ok(project
            .views
            .iter()
            .map(|v| ViewInfo {
                id: v.id,
                name: v.name.clone(),
                root: v.root,
            })
            .collect())
    }

    fn set_view_alternate_path(&mut self, view: ItemId, path: &str) -> Result<(), RemoteError> {
        self.enter(Operation::SetViewAlternatePath)?;
        let record = self
            .projects
            .iter_mut()
            .flat_map(|p| p.views.iter_mut())
            .find(|v| v.id == view)
            .ok_or_else(|| RemoteError::not_found(EntityKind::View, view))?;
        record.alternate_path = Some(path.to_string());
        Ok(())
    }

    fn refresh_view(&mut self, view: ItemId) -> Result<(), RemoteError> {
        self.enter(Operation::RefreshView)?;
        if !self.projects.iter().flat_map(|p| &p.views).any(|v| v.id == view) {
            return Err(RemoteError::not_found(EntityKind::View, view));
        }
        Ok(())
    }

    fn folder(&self, folder: ItemId) -> Result<FolderEntry, RemoteError> {
        self.enter(Operation::GetFolder)?;
        let record = self.folder_record(folder)?;
        Ok(self.folder_entry(folder, record))
    }

    fn list_child_folders(&self, folder: ItemId) -> Result<Vec<FolderEntry>, RemoteError> {
        self.enter(Operation::ListFolders)?;
        self.folder_record(folder)?;
        let mut entries: Vec<FolderEntry> = self
            .folders
            .iter()
            .filter(|(_, f)| f.parent == Some(folder))
            .map(|(id, f)| self.folder_entry(*id, f))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    fn list_child_files(&self, folder: ItemId) -> Result<Vec<FileEntry>, RemoteError> {
        self.enter(Operation::ListFiles)?;
        self.folder_record(folder)?;
        let mut entries: Vec<FileEntry> = self
            .files
            .iter()
            .filter(|(_, f)| f.parent == folder)
            .map(|(id, f)| self.file_entry(*id, f))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    fn refresh_folder(&mut self, folder: ItemId) -> Result<(), RemoteError> {
        self.enter(Operation::RefreshFolder)?;
        self.folder_record(folder)?;
        Ok(())
    }

    fn file(&self, file: ItemId) -> Result<FileEntry, RemoteError> {
        self.enter(Operation::GetFile)?;
        let record = self.file_record(file)?;
        Ok(self.file_entry(file, record))
    }

    fn update_status(&mut self, file: ItemId) -> Result<FileEntry, RemoteError> {
        self.enter(Operation::UpdateStatus)?;
        self.recompute_status(file)
    }

    fn set_content_modified_time(
        &mut self,
        file: ItemId,
        at: DateTime<Utc>,
    ) -> Result<FileEntry, RemoteError> {
        self.enter(Operation::StampModifiedTime)?;
        self.file_record_mut(file)?.content_modified_at = Some(at);
        self.recompute_status(file)
    }

    fn fetch_content(&self, file: ItemId) -> Result<Vec<u8>, RemoteError> {
        self.enter(Operation::FetchContent)?;
        let record = self.file_record(file)?;
        Ok(record.tip().map(|t| t.content.clone()).unwrap_or_default())
    }

    fn fetch_revision_content(
        &self,
        file: ItemId,
        content_version: u32,
    ) -> Result<Vec<u8>, RemoteError> {
        self.enter(Operation::FetchContent)?;
        let record = self.file_record(file)?;
        content_version
            .checked_sub(1)
            .and_then(|i| record.revisions.get(i as usize))
            .map(|r| r.content.clone())
            .ok_or_else(|| {
                RemoteError::not_found(EntityKind::Revision, format!("{file}@{content_version}"))
            })
    }

    #[instrument(skip(self, source, options), fields(source = %source.display()))]
    fn submit_checkin(
        &mut self,
        file: ItemId,
        source: &Path,
        options: &CheckinOptions,
    ) -> Result<(), RemoteError> {
        self.enter(Operation::SubmitCheckin)?;
        let content = std::fs::read(source)
            .map_err(|e| RemoteError::fatal(format!("cannot read {}: {e}", source.display())))?;
        let record = self.file_record(file)?;
        if let Some(tip) = record.tip() {
            let differs = sha256_hex(&content) != sha256_hex(&tip.content);
            if differs && !options.force {
                let status = record.status_for(Some(&content));
                if matches!(
                    status,
                    ItemStatus::Merge | ItemStatus::OutOfDate | ItemStatus::Unknown
                ) {
                    debug!(%status, "checkin rejected by status");
                    return Err(RemoteError::ConflictNewerOnServer);
                }
                if record
                    .content_modified_at
                    .is_some_and(|stamped| stamped <= tip.modified_at)
                {
                    debug!("checkin rejected: working copy is not newer than the tip");
                    return Err(RemoteError::ConflictNewerOnServer);
                }
            }
        }
        self.staged_checkins.push(StagedCheckin {
            file,
            content,
            options: options.clone(),
        });
        Ok(())
    }

    #[instrument(skip(self, destination, options))]
    fn submit_checkout(
        &mut self,
        file: ItemId,
        destination: Option<&Path>,
        options: &CheckoutOptions,
    ) -> Result<(), RemoteError> {
        self.enter(Operation::SubmitCheckout)?;
        let destination = match destination {
            Some(p) => p.to_path_buf(),
            None => self
                .working_path(file)
                .ok_or_else(|| RemoteError::not_found(EntityKind::File, file))?,
        };
        let record = self.file_record(file)?;
        let tip = record
            .tip()
            .ok_or_else(|| RemoteError::not_found(EntityKind::Revision, file))?;
        if !options.force {
            if let Ok(local) = std::fs::read(&destination) {
                let status = record.status_for(Some(&local));
                let matches_tip = sha256_hex(&local) == sha256_hex(&tip.content);
                if !matches_tip
                    && matches!(
                        status,
                        ItemStatus::Modified | ItemStatus::Merge | ItemStatus::Unknown
                    )
                {
                    debug!(%status, "leaving locally changed working file in place");
                    return Ok(());
                }
            }
        }
        self.staged_checkouts.push(StagedCheckout {
            file,
            destination,
            options: options.clone(),
        });
        Ok(())
    }

    fn can_commit(&self, kind: TransactionKind) -> bool {
        match kind {
            TransactionKind::Checkin => !self.staged_checkins.is_empty(),
            TransactionKind::Checkout => !self.staged_checkouts.is_empty(),
        }
    }

    fn commit(&mut self, kind: TransactionKind) -> Result<(), RemoteError> {
        self.enter(Operation::Commit)?;
        let tx = Uuid::new_v4();
        debug!(%tx, %kind, "committing transaction");
        match kind {
            TransactionKind::Checkin => self.commit_checkins(tx),
            TransactionKind::Checkout => self.commit_checkouts(tx),
        }
    }

    #[instrument(skip(self))]
    fn create_folder(
        &mut self,
        parent: ItemId,
        name: &str,
        path_fragment: &str,
    ) -> Result<FolderEntry, RemoteError> {
        self.enter(Operation::CreateFolder)?;
        self.folder_record(parent)?;
        let id = self.alloc_id();
        let record = FolderRecord {
            name: name.to_string(),
            parent: Some(parent),
            path_fragment: path_fragment.to_string(),
            alternate_path: None,
        };
        let entry = self.folder_entry(id, &record);
        self.folders.insert(id, record);
        Ok(entry)
    }

    fn set_path_fragment(&mut self, folder: ItemId, fragment: &str) -> Result<(), RemoteError> {
        self.enter(Operation::SetPathFragment)?;
        self.folder_record_mut(folder)?.path_fragment = fragment.to_string();
        Ok(())
    }

    fn set_alternate_path_fragment(
        &mut self,
        folder: ItemId,
        path: &str,
    ) -> Result<(), RemoteError> {
        self.enter(Operation::SetAlternatePath)?;
        self.folder_record_mut(folder)?.alternate_path = Some(path.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    fn create_file(&mut self, parent: ItemId, name: &str) -> Result<FileEntry, RemoteError> {
        self.enter(Operation::CreateFile)?;
        self.folder_record(parent)?;
        let author = self.author()?;
        let id = self.alloc_id();
        let mut properties = default_file_properties();
        init_properties(&mut properties, name);
        let record = FileRecord {
            name: name.to_string(),
            parent,
            created_at: Utc::now(),
            created_by: author,
            revisions: Vec::new(),
            working: None,
            content_modified_at: None,
            lock: LockState::Unlocked,
            status: ItemStatus::Unknown,
            properties,
        };
        let entry = self.file_entry(id, &record);
        self.files.insert(id, record);
        Ok(entry)
    }

    #[instrument(skip(self))]
    fn move_item(&mut self, item: ItemId, new_parent: ItemId) -> Result<(), RemoteError> {
        self.enter(Operation::Move)?;
        self.folder_record(new_parent)?;
        if self.folders.contains_key(&item) {
            if self.is_descendant_or_self(new_parent, item) {
                return Err(RemoteError::fatal(format!(
                    "cannot move folder {item} into its own subtree"
                )));
            }
            self.folder_record_mut(item)?.parent = Some(new_parent);
            return Ok(());
        }
        self.file_record_mut(item)?.parent = new_parent;
        Ok(())
    }

    #[instrument(skip(self))]
    fn rename_item(&mut self, item: ItemId, new_name: &str) -> Result<(), RemoteError> {
        self.enter(Operation::Rename)?;
        if let Some(folder) = self.folders.get_mut(&item) {
            folder.name = new_name.to_string();
            return Ok(());
        }
        self.file_record_mut(item)?.name = new_name.to_string();
        Ok(())
    }

    fn lock(&mut self, file: ItemId) -> Result<(), RemoteError> {
        self.enter(Operation::Lock)?;
        self.file_record_mut(file)?.lock = LockState::NonExclusive;
        Ok(())
    }

    fn unlock(&mut self, file: ItemId) -> Result<(), RemoteError> {
        self.enter(Operation::Unlock)?;
        self.file_record_mut(file)?.lock = LockState::Unlocked;
        Ok(())
    }

    fn list_history(&self, file: ItemId) -> Result<Vec<HistoryEntry>, RemoteError> {
        self.enter(Operation::ListHistory)?;
        let record = self.file_record(file)?;
        Ok(record
            .revisions
            .iter()
            .enumerate()
            .map(|(i, r)| HistoryEntry {
                file,
                revision_number: i as u32,
                content_version: i as u32 + 1,
                modified_at: r.modified_at,
                author: r.author,
                comment: r.comment.clone(),
            })
            .collect())
    }

    fn user_name(&self, user: UserId) -> Result<String, RemoteError> {
        self.enter(Operation::UserName)?;
        self.users
            .get(&user)
            .map(|u| u.name.clone())
            .ok_or_else(|| RemoteError::fatal(format!("null user reference {}", user.0)))
    }

    fn item_kind(&self, item: ItemId) -> Result<ItemKind, RemoteError> {
        self.enter(Operation::ItemKind)?;
        if self.folders.contains_key(&item) {
            Ok(ItemKind::Folder)
        } else if self.files.contains_key(&item) {
            Ok(ItemKind::File)
        } else {
            Err(RemoteError::not_found(EntityKind::File, item))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn convert_eol(content: &[u8], eol: EolFormat) -> Vec<u8> {
    match eol {
        EolFormat::Platform => content.to_vec(),
        EolFormat::Lf => {
            let mut out = Vec::with_capacity(content.len());
            let mut iter = content.iter().peekable();
            while let Some(&b) = iter.next() {
                if b == b'\r' && iter.peek() == Some(&&b'\n') {
                    continue;
                }
                out.push(b);
            }
            out
        }
        EolFormat::CrLf => {
            let lf = convert_eol(content, EolFormat::Lf);
            let mut out = Vec::with_capacity(lf.len());
            for b in lf {
                if b == b'\n' {
                    out.push(b'\r');
                }
                out.push(b);
            }
            out
        }
    }
}

/// Byte buffers are stored hex-encoded in the JSON store.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
