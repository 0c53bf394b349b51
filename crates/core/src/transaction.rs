//! Checkin, checkout and lock operations.
//!
//! Each checkin or checkout is one transaction: options are derived from the
//! workspace templates, the work is submitted to the session and then
//! committed. A refused transaction is reported as `Ok(false)`, never as an
//! error.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::{RemoteError, VcsError};
use crate::models::{ItemId, ItemStatus};
use crate::session::{CheckinOptions, RemoteSession, TransactionKind};
use crate::status::{needs_checkout_confirmation, CheckinDecision};
use crate::tree::{FileId, FolderId};
use crate::workspace::Workspace;

/// Asked before a verbose checkout overwrites a file with local changes.
pub trait CheckoutPrompt {
    /// Return `true` to overwrite `path`.
    fn confirm_overwrite(&self, path: &str, status: ItemStatus) -> bool;
}

/// Overwrites without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl CheckoutPrompt for AlwaysConfirm {
    fn confirm_overwrite(&self, _path: &str, _status: ItemStatus) -> bool {
        true
    }
}

/// Declines every overwrite.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl CheckoutPrompt for NeverConfirm {
    fn confirm_overwrite(&self, _path: &str, _status: ItemStatus) -> bool {
        false
    }
}

impl<S: RemoteSession> Workspace<S> {
    /// Check in the working file at `path` with `comment`.
    ///
    /// Returns `Ok(false)` when the file's status refuses the checkin or the
    /// server holds a newer copy.
    pub fn checkin_file(&mut self, path: &str, comment: &str) -> Result<bool, VcsError> {
        debug!(path, "checkin_file");
        let file = self.get_file(path)?;
        self.checkin(file, Path::new(path), comment)
    }

    /// Check in `file` from the working copy at `source`.
    pub fn checkin(&mut self, file: FileId, source: &Path, comment: &str) -> Result<bool, VcsError> {
        let remote = self.tree.file(file).remote;

        // Only the stamp refreshes status before the decision.
        let stamped = self.session.set_content_modified_time(remote, Utc::now());
        let status = self.absorb_status(file, stamped)?;

        let force = match CheckinDecision::for_status(status) {
            CheckinDecision::Refuse => {
                info!(file = %self.tree.file(file).name, %status, "checkin refused by status");
                return Ok(false);
            }
            CheckinDecision::NothingToCommit => {
                debug!(file = %self.tree.file(file).name, "file is current, nothing to check in");
                return Ok(true);
            }
            CheckinDecision::Proceed { force } => force,
        };

        let options = self
            .checkin_template
            .clone()
            .with_reason(comment)
            .with_force(force);
        match self.submit_checkin(remote, source, &options) {
            Ok(()) => {}
            Err(RemoteError::ConflictNewerOnServer) => {
                info!(file = %self.tree.file(file).name, "server holds a newer copy, checkin refused");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        if self.settings.unlock_on_checkin {
            self.session.unlock(remote)?;
        }
        self.reload_file(file)?;
        let node = self.tree.file(file);
        info!(file = %node.name, version = node.content_version, force, "checked in");
        Ok(true)
    }

    /// Submit one checkin and commit it.
    pub(crate) fn submit_checkin(
        &mut self,
        remote: ItemId,
        source: &Path,
        options: &CheckinOptions,
    ) -> Result<(), RemoteError> {
        self.session.submit_checkin(remote, source, options)?;
        self.commit_transaction(TransactionKind::Checkin)
    }

    /// Commit the staged transaction. The commit is issued even when the
    /// session reports nothing to commit.
    pub(crate) fn commit_transaction(&mut self, kind: TransactionKind) -> Result<(), RemoteError> {
        if !self.session.can_commit(kind) {
            debug!(%kind, "session reports nothing to commit, committing anyway");
        }
        self.session.commit(kind)
    }

    /// Check out the file at `path`. With `verbose`, overwriting a file that
    /// is neither current nor merely out of date needs confirmation.
    pub fn checkout_file(&mut self, path: &str, verbose: bool) -> Result<bool, VcsError> {
        debug!(path, verbose, "checkout_file");
        let file = self.get_file(path)?;
        self.checkout(file, verbose)
    }

    pub fn checkout(&mut self, file: FileId, verbose: bool) -> Result<bool, VcsError> {
        let status = self.refresh_status(file)?;

        // Force applies to this transaction only.
        let mut options = self.checkout_template.clone();
        if verbose && needs_checkout_confirmation(status) {
            let full_name = self.file_path(file);
            if !self.prompt.confirm_overwrite(&full_name, status) {
                info!(file = %full_name, %status, "checkout declined");
                return Ok(false);
            }
            options.force = true;
        }

        let remote = self.tree.file(file).remote;
        let destination = self
            .settings
            .alternate_working_path
            .is_some()
            .then(|| self.file_disk_path(file));
        let result = self
            .session
            .submit_checkout(remote, destination.as_deref(), &options)
            .and_then(|()| self.commit_transaction(TransactionKind::Checkout));
        match result {
            Ok(()) => {}
            Err(RemoteError::ConflictNewerOnServer) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        if self.settings.lock_on_checkout {
            self.session.lock(remote)?;
        }
        self.reload_file(file)?;
        info!(file = %self.tree.file(file).name, force = options.force, "checked out");
        Ok(true)
    }

    /// Check out every file under `folder`, files first, then each
    /// subfolder. The first failure aborts the walk.
    pub fn checkout_folder(&mut self, folder: FolderId) -> Result<(), VcsError> {
        for file in self.files(folder)? {
            self.checkout(file, false)?;
        }
        for sub in self.subfolders(folder)? {
            self.checkout_folder(sub)?;
        }
        Ok(())
    }

    pub fn checkout_folder_path(&mut self, path: &str) -> Result<(), VcsError> {
        debug!(path, "checkout_folder");
        let folder = self.get_folder(path)?;
        self.checkout_folder(folder)
    }

    pub fn lock_file(&mut self, path: &str) -> Result<(), VcsError> {
        debug!(path, "lock_file");
        let file = self.get_file(path)?;
        self.session.lock(self.tree.file(file).remote)?;
        self.reload_file(file)
    }

    /// Release the lock on the file at `path`; unlocking an unlocked file
    /// succeeds.
    pub fn unlock_file(&mut self, path: &str) -> Result<(), VcsError> {
        debug!(path, "unlock_file");
        let file = self.get_file(path)?;
        self.session.unlock(self.tree.file(file).remote)?;
        self.reload_file(file)
    }

    /// Tip content of the file at `path`, read without touching the working
    /// tree.
    pub fn get_file_content(&mut self, path: &str) -> Result<Vec<u8>, VcsError> {
        debug!(path, "get_file_content");
        let file = self.get_file(path)?;
        let content = self.session.fetch_content(self.tree.file(file).remote)?;
        self.commit_transaction(TransactionKind::Checkout)?;
        Ok(content)
    }
}
