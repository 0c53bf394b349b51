//! The workspace: one project view bound to a local working tree.
//!
//! [`Workspace`] owns the remote session, the materialized item tree and the
//! transaction option templates. Its operations are spread over several
//! modules, each adding an `impl` block:
//!
//! - [`resolver`](crate::resolver): path to folder/file resolution
//! - [`status`](crate::status): status refresh and the checkin decision
//! - [`transaction`](crate::transaction): checkin, checkout, locks
//! - [`mutation`](crate::mutation): add, rename and move of folders and files
//! - [`history`](crate::history): revision listing and content

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{platform_case_sensitive, WorkspaceConfig};
use crate::errors::VcsError;
use crate::models::ViewInfo;
use crate::session::{CheckinOptions, CheckoutOptions, EolFormat, LockPolicy, RemoteSession};
use crate::state::PendingChanges;
use crate::transaction::{AlwaysConfirm, CheckoutPrompt};
use crate::tree::{FileId, FolderId, ItemTree};

/// Settings that shape how the workspace maps onto the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub project: String,
    pub view: String,
    /// Local directory that stands in for the view root's working path.
    pub alternate_working_path: Option<String>,
    pub case_sensitive: bool,
    pub unlock_on_checkin: bool,
    pub lock_on_checkout: bool,
}

impl WorkspaceSettings {
    pub fn new(project: &str, view: &str) -> Self {
        Self {
            project: project.to_string(),
            view: view.to_string(),
            alternate_working_path: None,
            case_sensitive: platform_case_sensitive(),
            unlock_on_checkin: false,
            lock_on_checkout: false,
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self {
            project: config.project.clone(),
            view: config.view.clone(),
            alternate_working_path: config.alternate_working_path.clone(),
            case_sensitive: config.case_sensitive(),
            unlock_on_checkin: config.unlock_on_checkin,
            lock_on_checkout: config.lock_on_checkout,
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_overlay(mut self, path: impl Into<String>) -> Self {
        self.alternate_working_path = Some(path.into());
        self
    }
}

pub struct Workspace<S: RemoteSession> {
    pub(crate) session: S,
    pub(crate) settings: WorkspaceSettings,
    pub(crate) view: ViewInfo,
    pub(crate) tree: ItemTree,
    pub(crate) checkin_template: CheckinOptions,
    pub(crate) checkout_template: CheckoutOptions,
    pub(crate) prompt: Box<dyn CheckoutPrompt>,
    pub(crate) pending: Arc<PendingChanges>,
}

impl<S: RemoteSession> Workspace<S> {
    /// Select the configured project and view on `session` and bind the
    /// working tree to it.
    ///
    /// Fails with [`VcsError::ProjectNotFound`] or [`VcsError::ViewNotFound`]
    /// when the configuration names something the server does not have.
    pub fn open(mut session: S, settings: WorkspaceSettings) -> Result<Self, VcsError> {
        debug!(project = %settings.project, view = %settings.view, "opening workspace");

        let projects = session.projects()?;
        if !projects.iter().any(|p| *p == settings.project) {
            return Err(VcsError::ProjectNotFound(settings.project.clone()));
        }
        let view = session
            .views(&settings.project)?
            .into_iter()
            .find(|v| v.name == settings.view)
            .ok_or_else(|| VcsError::ViewNotFound(settings.view.clone()))?;

        if let Some(overlay) = &settings.alternate_working_path {
            session.set_view_alternate_path(view.id, overlay)?;
            session.set_alternate_path_fragment(view.root, overlay)?;
        }

        let root = session.folder(view.root)?;
        let tree = ItemTree::new(root);

        let checkin_template = CheckinOptions {
            lock: LockPolicy::Unchanged,
            eol: EolFormat::Platform,
            update_status: true,
            restore_on_error: false,
            ..CheckinOptions::default()
        };
        let checkout_template = CheckoutOptions {
            lock: LockPolicy::Unchanged,
            eol: EolFormat::Platform,
            update_status: true,
            force: false,
        };

        let workspace = Self {
            session,
            settings,
            view,
            tree,
            checkin_template,
            checkout_template,
            prompt: Box::new(AlwaysConfirm),
            pending: Arc::new(PendingChanges::new()),
        };
        info!(
            project = %workspace.settings.project,
            view = %workspace.view.name,
            root = %workspace.effective_root_path(),
            "workspace opened"
        );
        Ok(workspace)
    }

    /// Replace the collaborator asked before a verbose checkout overwrites
    /// local changes.
    pub fn with_prompt(mut self, prompt: Box<dyn CheckoutPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Share an existing pending-changes set, e.g. one fed by a watcher.
    pub fn with_pending(mut self, pending: Arc<PendingChanges>) -> Self {
        self.pending = pending;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    pub fn tree(&self) -> &ItemTree {
        &self.tree
    }

    pub fn pending(&self) -> Arc<PendingChanges> {
        Arc::clone(&self.pending)
    }

    /// Re-read the view's folder tree and drop every cached listing.
    pub fn refresh(&mut self) -> Result<(), VcsError> {
        debug!("refreshing view");
        self.session.refresh_view(self.view.id)?;
        let root = self.session.folder(self.view.root)?;
        self.tree.upsert_folder(&root, None);
        self.tree.invalidate_all();
        Ok(())
    }

    /// Child folders, listed from the server on first use.
    pub fn subfolders(&mut self, folder: FolderId) -> Result<Vec<FolderId>, VcsError> {
        if let Some(cached) = self.tree.cached_subfolders(folder) {
            return Ok(cached.to_vec());
        }
        let remote = self.tree.folder(folder).remote;
        let entries = self.session.list_child_folders(remote)?;
        let children: Vec<FolderId> = entries
            .iter()
            .map(|e| self.tree.upsert_folder(e, Some(folder)))
            .collect();
        self.tree.set_subfolders(folder, children.clone());
        Ok(children)
    }

    /// Files directly in `folder`, listed from the server on first use.
    pub fn files(&mut self, folder: FolderId) -> Result<Vec<FileId>, VcsError> {
        if let Some(cached) = self.tree.cached_files(folder) {
            return Ok(cached.to_vec());
        }
        let remote = self.tree.folder(folder).remote;
        let entries = self.session.list_child_files(remote)?;
        let children: Vec<FileId> = entries
            .iter()
            .map(|e| self.tree.upsert_file(e, folder))
            .collect();
        self.tree.set_files(folder, children.clone());
        Ok(children)
    }

    /// Ask the server to re-read a folder's items and drop its cache.
    pub(crate) fn refresh_folder_items(&mut self, folder: FolderId) -> Result<(), VcsError> {
        let remote = self.tree.folder(folder).remote;
        self.session.refresh_folder(remote)?;
        self.tree.invalidate(folder);
        Ok(())
    }

    /// Re-read one file's metadata from the server.
    pub(crate) fn reload_file(&mut self, file: FileId) -> Result<(), VcsError> {
        let entry = self.session.file(self.tree.file(file).remote)?;
        self.tree.update_file(file, &entry);
        Ok(())
    }

    /// The local path the view root maps to: the overlay when configured,
    /// otherwise the root folder's own working path.
    pub fn effective_root_path(&self) -> String {
        match &self.settings.alternate_working_path {
            Some(overlay) => overlay.replace('\\', "/"),
            None => self.tree.folder_path(self.tree.root()),
        }
    }

    /// Whether `local_path` lies inside the managed working tree.
    pub fn is_under_managed_root(&self, local_path: &str) -> bool {
        let cs = self.settings.case_sensitive;
        let root = crate::resolver::normalize_path(&self.effective_root_path(), cs);
        crate::resolver::normalize_path(local_path, cs).starts_with(&root)
    }

    pub fn folder_path(&self, folder: FolderId) -> String {
        self.tree.folder_path(folder)
    }

    pub fn file_path(&self, file: FileId) -> String {
        self.tree.file_path(file)
    }

    pub fn folder_disk_path(&self, folder: FolderId) -> PathBuf {
        self.tree.folder_disk_path(folder)
    }

    pub fn file_disk_path(&self, file: FileId) -> PathBuf {
        self.tree.file_disk_path(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;
    use crate::session::memory::Operation;
    use crate::session::MemoryRepository;

    fn repo(dir: &std::path::Path) -> MemoryRepository {
        let mut repo = MemoryRepository::new("alice");
        let root = repo.create_view("proj", "main", dir);
        repo.seed_folder(root, "src");
        repo
    }

    #[test]
    fn test_open_rejects_unknown_project_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let result = Workspace::open(repo(dir.path()), WorkspaceSettings::new("nope", "main"));
        assert!(matches!(result, Err(VcsError::ProjectNotFound(ref p)) if p == "nope"));

        let result = Workspace::open(repo(dir.path()), WorkspaceSettings::new("proj", "dev"));
        assert!(matches!(result, Err(VcsError::ViewNotFound(ref v)) if v == "dev"));
    }

    #[test]
    fn test_open_applies_overlay_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = tempfile::tempdir().unwrap();
        let overlay_path = overlay.path().to_string_lossy().replace('\\', "/");
        let settings = WorkspaceSettings::new("proj", "main").with_overlay(overlay_path.clone());
        let ws = Workspace::open(repo(dir.path()), settings).unwrap();

        assert_eq!(ws.effective_root_path(), overlay_path);
        assert_eq!(ws.folder_path(ws.tree().root()), overlay_path);
        assert!(ws.is_under_managed_root(&format!("{overlay_path}/src/a.txt")));
        assert!(!ws.is_under_managed_root(&dir.path().to_string_lossy()));
    }

    #[test]
    fn test_listings_are_cached_until_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::open(repo(dir.path()), WorkspaceSettings::new("proj", "main")).unwrap();
        let root = ws.tree().root();

        let first = ws.subfolders(root).unwrap();
        ws.session().clear_calls();
        let second = ws.subfolders(root).unwrap();
        assert_eq!(first, second);
        assert!(ws.session().calls().is_empty());

        ws.refresh().unwrap();
        ws.subfolders(root).unwrap();
        assert!(ws.session().calls().contains(&Operation::ListFolders));
    }

    #[test]
    fn test_open_propagates_fatal_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        repo.fail_next(Operation::Projects, RemoteError::fatal("connection refused"));
        let result = Workspace::open(repo, WorkspaceSettings::new("proj", "main"));
        assert!(matches!(result, Err(VcsError::Remote(RemoteError::Fatal(_)))));
    }
}
