//! Local state database of a workspace.
//!
//! One SQLite file per data directory holds the pending changes between
//! runs and the audit trail of workspace operations. The SQL for each table
//! lives in [`queries`], the migrations in [`schema`].

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::DatabaseError;
use crate::models::AuditEntry;
use crate::state::PendingChanges;

/// File name of the state database inside a workspace data directory.
pub const DATABASE_FILE: &str = "viewsync.db";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the state database of the workspace whose data lives in
    /// `data_dir`, creating the directory and migrating the schema.
    pub fn open_workspace(data_dir: &Path) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DATABASE_FILE);
        info!(path = %path.display(), "opening state database");

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::migrated(conn)
    }

    /// A migrated database that lives only as long as the handle.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(conn: Connection) -> Result<Self, DatabaseError> {
        schema::run_migrations(&conn)?;
        debug!("state database schema is current");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("state database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Store the current pending changes, replacing what was saved before.
    pub fn persist_pending(&self, pending: &PendingChanges) -> Result<(), DatabaseError> {
        self.save_pending(&pending.snapshot())
    }

    /// Load the saved pending changes into `pending`. Entries the disk no
    /// longer agrees with are dropped.
    pub fn restore_pending(&self, pending: &PendingChanges) -> Result<(), DatabaseError> {
        pending.restore(self.load_pending()?);
        Ok(())
    }

    /// Append `entry` to the audit trail. A failed write is logged and
    /// reported as `false`; it never fails the audited operation.
    pub fn record_audit(&self, entry: &AuditEntry) -> bool {
        match self.insert_audit_entry(entry) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, action = %entry.action, "failed to write audit entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_workspace_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("state");
        let db = Database::open_workspace(&data_dir).unwrap();
        assert!(data_dir.join(DATABASE_FILE).exists());
        assert_eq!(db.count_audit_log().unwrap(), 0);
    }

    #[test]
    fn test_pending_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let new_file = dir.path().join("New.txt");
        std::fs::write(&new_file, b"x").unwrap();
        let new_file = new_file.to_string_lossy().to_string();

        {
            let db = Database::open_workspace(dir.path()).unwrap();
            let pending = PendingChanges::new();
            pending.add_new_file(&new_file);
            db.persist_pending(&pending).unwrap();
        }

        let db = Database::open_workspace(dir.path()).unwrap();
        let pending = PendingChanges::new();
        db.restore_pending(&pending).unwrap();
        assert!(pending.contains_new(&new_file));
    }

    #[test]
    fn test_record_audit() {
        let db = Database::in_memory().unwrap();
        assert!(db.record_audit(&AuditEntry::success("lock", Some("/w/a.txt"), "ok")));
        assert!(db.record_audit(&AuditEntry::failure("unlock", None, "not locked")));
        assert_eq!(db.count_audit_log().unwrap(), 2);
        assert_eq!(db.count_failures().unwrap(), 1);
    }
}
