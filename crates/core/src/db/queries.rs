//! Typed query helpers for every table in the viewsync database.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::AuditEntry;
use crate::state::PendingSnapshot;

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub path: Option<String>,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl Database {
    // -- pending_changes ----------------------------------------------------

    /// Replace the stored pending changes with `snapshot`.
    pub(crate) fn save_pending(&self, snapshot: &PendingSnapshot) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            tx.execute("DELETE FROM pending_changes", [])?;
            let mut stmt = tx.prepare(
                "INSERT INTO pending_changes (kind, path, target, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for path in snapshot.new_files.values() {
                stmt.execute(params!["new_file", path, None::<String>, now])?;
            }
            let singles = [
                ("removed_file", &snapshot.removed_files),
                ("removed_folder", &snapshot.removed_folders),
            ];
            for (kind, paths) in singles {
                for path in paths {
                    stmt.execute(params![kind, path, None::<String>, now])?;
                }
            }
            let renames = [
                ("renamed_file", &snapshot.renamed_files),
                ("renamed_dir", &snapshot.renamed_dirs),
            ];
            for (kind, map) in renames {
                for (new, old) in map {
                    stmt.execute(params![kind, new, old, now])?;
                }
            }
        }
        tx.commit()?;
        debug!("saved pending changes");
        Ok(())
    }

    /// Load the stored pending changes as saved, without disk checks.
    pub(crate) fn load_pending(&self) -> Result<PendingSnapshot, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT kind, path, target FROM pending_changes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut snapshot = PendingSnapshot::default();
        for (kind, path, target) in rows {
            match (kind.as_str(), target) {
                ("new_file", _) => {
                    snapshot.insert_new_file(&path);
                }
                ("removed_file", _) => {
                    snapshot.removed_files.insert(path);
                }
                ("removed_folder", _) => {
                    snapshot.removed_folders.insert(path);
                }
                ("renamed_file", Some(old)) => {
                    snapshot.renamed_files.insert(path, old);
                }
                ("renamed_dir", Some(old)) => {
                    snapshot.renamed_dirs.insert(path, old);
                }
                (other, _) => {
                    return Err(DatabaseError::Corrupt {
                        entity: "pending_changes".into(),
                        detail: format!("unexpected row kind '{other}' for {path}"),
                    })
                }
            }
        }
        Ok(snapshot)
    }

    // -- audit_log ----------------------------------------------------------

    pub(crate) fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, path, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.action,
                entry.path,
                entry.details,
                entry.success,
                entry.timestamp.to_rfc3339()
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action = %entry.action, success = entry.success, "inserted audit_log entry");
        Ok(id)
    }

    /// List recent audit-log entries, newest first.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, path, details, success, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    path: row.get(2)?,
                    details: row.get(3)?,
                    success: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count total audit-log entries.
    pub fn count_audit_log(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count audit entries recorded as failures.
    pub fn count_failures(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE success = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Parse a datetime string, returning Utc::now() as a fallback if parsing fails.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn test_pending_round_trip() {
        let db = setup_db();
        let mut snapshot = PendingSnapshot::default();
        snapshot.insert_new_file("/w/Src/A.txt");
        snapshot.removed_folders.insert("/w/old".into());
        snapshot
            .renamed_dirs
            .insert("/w/lib".into(), "/w/src".into());
        db.save_pending(&snapshot).unwrap();
        let loaded = db.load_pending().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(
            loaded.new_files.get("/w/src/a.txt").map(String::as_str),
            Some("/w/Src/A.txt")
        );

        db.save_pending(&PendingSnapshot::default()).unwrap();
        assert!(db.load_pending().unwrap().is_empty());
    }

    #[test]
    fn test_audit_log() {
        let db = setup_db();
        db.insert_audit_entry(&AuditEntry::success("checkin", Some("/w/a.txt"), "fix"))
            .unwrap();
        db.insert_audit_entry(&AuditEntry::failure("checkout", None, "refused"))
            .unwrap();

        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "checkout");
        assert!(!entries[0].success);
        assert_eq!(entries[1].path.as_deref(), Some("/w/a.txt"));
        assert_eq!(db.count_audit_log().unwrap(), 2);
        assert_eq!(db.count_failures().unwrap(), 1);
    }
}
