//! End-to-end tests for the workspace against an in-process repository.
//!
//! Each test builds a real temporary working tree, seeds a
//! `MemoryRepository` view whose root maps onto it and drives the public
//! `Workspace` API the way the CLI does.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use viewsync_core::db::Database;
use viewsync_core::errors::{RemoteError, VcsError};
use viewsync_core::models::{ItemId, ItemStatus, LockState};
use viewsync_core::session::memory::Operation;
use viewsync_core::state::PendingChanges;
use viewsync_core::tree::FolderId;
use viewsync_core::{MemoryRepository, RemoteSession, Workspace, WorkspaceSettings};

// ===========================================================================
// Helpers
// ===========================================================================

struct Tree {
    dir: TempDir,
    root: String,
}

impl Tree {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().replace('\\', "/");
        Self { dir, root }
    }

    fn path(&self, rel: &str) -> String {
        format!("{}/{rel}", self.root)
    }

    fn disk(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, content: &[u8]) {
        let path = self.disk(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// Seed a file in the repository and its matching working copy.
fn seed_tracked(repo: &mut MemoryRepository, tree: &Tree, folder: ItemId, rel: &str, content: &[u8]) -> ItemId {
    let name = Path::new(rel).file_name().unwrap().to_string_lossy().to_string();
    let id = repo.seed_file(folder, &name, content, "initial");
    tree.write(rel, content);
    repo.mark_working_copy(id);
    id
}

/// Paths, relative to `folder`, of every file below it.
fn files_below(ws: &mut Workspace<MemoryRepository>, folder: FolderId, prefix: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for file in ws.files(folder).unwrap() {
        found.insert(format!("{prefix}{}", ws.tree().file(file).name));
    }
    for sub in ws.subfolders(folder).unwrap() {
        let prefix = format!("{prefix}{}/", ws.tree().folder(sub).name);
        found.extend(files_below(ws, sub, &prefix));
    }
    found
}

fn open(repo: MemoryRepository, case_sensitive: bool) -> Workspace<MemoryRepository> {
    let settings = WorkspaceSettings::new("proj", "main").with_case_sensitive(case_sensitive);
    Workspace::open(repo, settings).unwrap()
}

// ===========================================================================
// Resolution
// ===========================================================================

#[test]
fn test_resolve_folder_is_deterministic() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    let deep = repo.seed_folder(src, "deep");
    repo.seed_folder(deep, "deeper");
    let mut ws = open(repo, true);

    for rel in ["src", "src/deep", "src/deep/deeper", "src/none"] {
        let path = tree.path(rel);
        let first = ws.resolve_folder(&path).unwrap();
        let second = ws.resolve_folder(&path).unwrap();
        ws.refresh().unwrap();
        let third = ws.resolve_folder(&path).unwrap();
        assert_eq!(first, second, "{rel}");
        assert_eq!(first, third, "{rel}");
    }
}

#[test]
fn test_case_insensitive_and_sensitive_resolution() {
    let tree = Tree::new();
    let build = |case_sensitive| {
        let mut repo = MemoryRepository::new("alice");
        let root = repo.create_view("proj", "main", tree.dir.path());
        let src = repo.seed_folder(root, "src");
        repo.seed_file(src, "a.txt", b"a", "initial");
        open(repo, case_sensitive)
    };
    let upper = format!("{}/SRC/A.TXT", tree.root);
    let lower = tree.path("src/a.txt");

    let mut insensitive = build(false);
    let found = insensitive.resolve_file(&upper).unwrap();
    assert!(found.is_some());
    assert_eq!(found, insensitive.resolve_file(&lower).unwrap());

    let mut sensitive = build(true);
    assert!(sensitive.resolve_file(&upper).unwrap().is_none());
    assert!(matches!(sensitive.get_file(&upper), Err(VcsError::FileNotFound(_))));
    assert!(sensitive.resolve_file(&lower).unwrap().is_some());
}

// ===========================================================================
// Adding
// ===========================================================================

#[test]
fn test_add_file_round_trip() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    repo.seed_folder(root, "src");
    tree.write("src/a.txt", b"hello");
    let mut ws = open(repo, true);

    ws.add_file(&tree.path("src"), "a.txt", "init").unwrap();
    let file = ws.resolve_file(&tree.path("src/a.txt")).unwrap().unwrap();
    let node = ws.tree().file(file);
    assert_eq!(node.name, "a.txt");
    assert_eq!(node.comment, "init");
    assert_eq!(ws.get_file_content(&tree.path("src/a.txt")).unwrap(), b"hello");
    assert_eq!(ws.update_status(&tree.path("src/a.txt")).unwrap(), ItemStatus::Current);
}

#[test]
fn test_add_file_requires_the_folder() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    repo.seed_folder(root, "src");
    let mut ws = open(repo, true);

    assert!(matches!(
        ws.add_file(&tree.path("missing"), "a.txt", "init"),
        Err(VcsError::FolderNotFound(_))
    ));
    assert!(matches!(
        ws.add_file(&tree.path("src"), "a.txt", "init"),
        Err(VcsError::FolderNotFoundOnDisk(_))
    ));
}

// ===========================================================================
// Checkin
// ===========================================================================

#[test]
fn test_checkin_refused_for_merge_and_out_of_date() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let bob = repo.add_user("bob", None);
    let root = repo.create_view("proj", "main", tree.dir.path());
    let merge = seed_tracked(&mut repo, &tree, root, "merge.txt", b"base");
    let stale = seed_tracked(&mut repo, &tree, root, "stale.txt", b"base");
    repo.seed_revision(merge, b"theirs", bob, "remote edit");
    repo.seed_revision(stale, b"theirs", bob, "remote edit");
    tree.write("merge.txt", b"mine");
    let mut ws = open(repo, true);

    assert_eq!(ws.update_status(&tree.path("merge.txt")).unwrap(), ItemStatus::Merge);
    assert_eq!(ws.update_status(&tree.path("stale.txt")).unwrap(), ItemStatus::OutOfDate);

    ws.session().clear_calls();
    assert!(!ws.checkin_file(&tree.path("merge.txt"), "mine").unwrap());
    assert!(!ws.checkin_file(&tree.path("stale.txt"), "mine").unwrap());
    assert_eq!(ws.session().mutation_count(), 0);
    assert_eq!(ws.session().file(merge).unwrap().content_version, 2);
}

#[test]
fn test_checkin_of_unknown_file_is_forced() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    // No working base recorded: the server cannot tell how the copy relates.
    let file = repo.seed_file(root, "a.txt", b"server", "initial");
    tree.write("a.txt", b"local");
    let mut ws = open(repo, true);

    assert_eq!(ws.update_status(&tree.path("a.txt")).unwrap(), ItemStatus::Unknown);
    assert!(ws.checkin_file(&tree.path("a.txt"), "take mine").unwrap());
    let entry = ws.session().file(file).unwrap();
    assert_eq!(entry.content_version, 2);
    assert_eq!(ws.session().fetch_content(file).unwrap(), b"local");
}

#[test]
fn test_checkin_of_modified_file_advances_version() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    let alice = repo.log_on("alice", None).unwrap();
    let file = repo.seed_file(src, "a.txt", b"v1", "one");
    repo.seed_revision(file, b"v2", alice, "two");
    repo.seed_revision(file, b"v3", alice, "three");
    tree.write("src/a.txt", b"v3");
    repo.mark_working_copy(file);
    tree.write("src/a.txt", b"v3 with a fix");
    let mut ws = open(repo, true);

    let path = tree.path("src/a.txt");
    let id = ws.get_file(&path).unwrap();
    assert_eq!(ws.tree().file(id).content_version, 3);
    assert_eq!(ws.update_status(&path).unwrap(), ItemStatus::Modified);

    assert!(ws.checkin_file(&path, "fix").unwrap());
    let id = ws.resolve_file(&path).unwrap().unwrap();
    assert_eq!(ws.tree().file(id).content_version, 4);
    assert_eq!(ws.tree().file(id).comment, "fix");
    assert_eq!(ws.current_revision_number(&path), Some(4));
}

#[test]
fn test_fatal_checkin_error_propagates() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    seed_tracked(&mut repo, &tree, root, "a.txt", b"one");
    tree.write("a.txt", b"two");
    let mut ws = open(repo, true);

    ws.session()
        .fail_next(Operation::Commit, RemoteError::fatal("connection reset"));
    assert!(matches!(
        ws.checkin_file(&tree.path("a.txt"), "edit"),
        Err(VcsError::Remote(RemoteError::Fatal(_)))
    ));
}

// ===========================================================================
// Restructuring
// ===========================================================================

#[test]
fn test_rename_directory_onto_existing_folder_merges() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    let nested = repo.seed_folder(src, "nested");
    repo.seed_folder(root, "lib");
    seed_tracked(&mut repo, &tree, src, "src/a.txt", b"a");
    seed_tracked(&mut repo, &tree, nested, "src/nested/b.txt", b"b");
    std::fs::create_dir_all(tree.disk("lib")).unwrap();
    let mut ws = open(repo, true);

    // The working tree already reflects the rename.
    std::fs::create_dir_all(tree.disk("lib/nested")).unwrap();
    std::fs::rename(tree.disk("src/a.txt"), tree.disk("lib/a.txt")).unwrap();
    std::fs::rename(tree.disk("src/nested/b.txt"), tree.disk("lib/nested/b.txt")).unwrap();

    ws.rename_directory(&tree.path("src"), "lib", "merge").unwrap();

    assert!(ws.exists_file(&tree.path("lib/a.txt")).unwrap());
    assert!(ws.exists_file(&tree.path("lib/nested/b.txt")).unwrap());
    let src = ws.get_folder(&tree.path("src")).unwrap();
    assert!(ws.files(src).unwrap().is_empty());
    assert!(!ws.exists_file(&tree.path("src/a.txt")).unwrap());
}

#[test]
fn test_rename_directory_merges_colliding_subfolders() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    let src_nested = repo.seed_folder(src, "nested");
    let src_deeper = repo.seed_folder(src_nested, "deeper");
    let lib = repo.seed_folder(root, "lib");
    let lib_nested = repo.seed_folder(lib, "nested");
    seed_tracked(&mut repo, &tree, src, "src/a.txt", b"a");
    seed_tracked(&mut repo, &tree, src_nested, "src/nested/b.txt", b"b");
    seed_tracked(&mut repo, &tree, src_deeper, "src/nested/deeper/d.txt", b"d");
    seed_tracked(&mut repo, &tree, lib_nested, "lib/nested/c.txt", b"c");
    let mut ws = open(repo, true);

    let src = ws.get_folder(&tree.path("src")).unwrap();
    let moving = files_below(&mut ws, src, "");
    assert_eq!(moving.len(), 3);

    for rel in ["a.txt", "nested/b.txt", "nested/deeper/d.txt"] {
        tree.write(&format!("lib/{rel}"), &std::fs::read(tree.disk(&format!("src/{rel}"))).unwrap());
    }
    std::fs::remove_dir_all(tree.disk("src")).unwrap();

    ws.rename_directory(&tree.path("src"), "lib", "merge").unwrap();

    let lib = ws.get_folder(&tree.path("lib")).unwrap();
    let merged = files_below(&mut ws, lib, "");
    assert!(moving.is_subset(&merged), "{moving:?} not in {merged:?}");
    assert!(merged.contains("nested/c.txt"));

    let src = ws.get_folder(&tree.path("src")).unwrap();
    assert!(files_below(&mut ws, src, "").is_empty());
}

#[test]
fn test_move_directory_onto_existing_folder_merges() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    let src_nested = repo.seed_folder(src, "nested");
    let docs = repo.seed_folder(root, "docs");
    let target = repo.seed_folder(docs, "lib");
    let target_nested = repo.seed_folder(target, "nested");
    seed_tracked(&mut repo, &tree, src, "src/a.txt", b"a");
    seed_tracked(&mut repo, &tree, src_nested, "src/nested/b.txt", b"b");
    seed_tracked(&mut repo, &tree, target_nested, "docs/lib/nested/c.txt", b"c");
    let mut ws = open(repo, true);

    tree.write("docs/lib/a.txt", b"a");
    tree.write("docs/lib/nested/b.txt", b"b");
    std::fs::remove_dir_all(tree.disk("src")).unwrap();

    ws.session().clear_calls();
    ws.move_and_rename_directory(&tree.path("src"), &tree.path("docs"), "lib", "merge")
        .unwrap();
    // Merging moves items one by one; the folder itself stays put.
    let calls = ws.session().calls();
    assert_eq!(calls.iter().filter(|op| **op == Operation::Move).count(), 2);

    let lib = ws.get_folder(&tree.path("docs/lib")).unwrap();
    let merged = files_below(&mut ws, lib, "");
    let expected: BTreeSet<String> = ["a.txt", "nested/b.txt", "nested/c.txt"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(merged, expected);

    let src = ws.get_folder(&tree.path("src")).unwrap();
    assert!(files_below(&mut ws, src, "").is_empty());
    assert!(ws.exists_folder(&tree.path("src/nested")).unwrap());
}

#[test]
fn test_move_file_between_folders() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let src = repo.seed_folder(root, "src");
    repo.seed_folder(root, "docs");
    let file = seed_tracked(&mut repo, &tree, src, "src/a.txt", b"a");
    std::fs::create_dir_all(tree.disk("docs")).unwrap();
    std::fs::rename(tree.disk("src/a.txt"), tree.disk("docs/readme.txt")).unwrap();
    let mut ws = open(repo, true);

    ws.move_rename_and_checkin_file(&tree.path("src/a.txt"), &tree.path("docs"), "readme.txt", "move")
        .unwrap();
    let moved = ws.get_file(&tree.path("docs/readme.txt")).unwrap();
    assert_eq!(ws.tree().file(moved).remote, file);
    assert!(!ws.exists_file(&tree.path("src/a.txt")).unwrap());
}

// ===========================================================================
// Checkout and locks
// ===========================================================================

#[test]
fn test_checkout_brings_out_of_date_file_current() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let alice = repo.log_on("alice", None).unwrap();
    let file = seed_tracked(&mut repo, &tree, root, "a.txt", b"old");
    repo.seed_revision(file, b"new", alice, "remote");
    let mut ws = open(repo, true);

    let path = tree.path("a.txt");
    assert_eq!(ws.update_status(&path).unwrap(), ItemStatus::OutOfDate);
    assert!(ws.checkout_file(&path, true).unwrap());
    assert_eq!(std::fs::read(tree.disk("a.txt")).unwrap(), b"new");
    assert_eq!(ws.update_status(&path).unwrap(), ItemStatus::Current);
}

#[test]
fn test_unlock_is_idempotent() {
    let tree = Tree::new();
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    let file = seed_tracked(&mut repo, &tree, root, "a.txt", b"a");
    let mut ws = open(repo, true);
    let path = tree.path("a.txt");

    let before = ws.update_status(&path).unwrap();
    ws.unlock_file(&path).unwrap();
    ws.unlock_file(&path).unwrap();
    assert_eq!(ws.update_status(&path).unwrap(), before);
    assert_eq!(ws.session().file(file).unwrap().lock, LockState::Unlocked);

    ws.lock_file(&path).unwrap();
    assert_eq!(ws.session().file(file).unwrap().lock, LockState::NonExclusive);
    ws.unlock_file(&path).unwrap();
    assert_eq!(ws.session().file(file).unwrap().lock, LockState::Unlocked);
}

// ===========================================================================
// Persistence
// ===========================================================================

#[test]
fn test_pending_changes_survive_a_restart() {
    let tree = Tree::new();
    tree.write("Kept.txt", b"x");
    let db = Database::in_memory().unwrap();

    let before = PendingChanges::new();
    before.add_new_file(&tree.path("Kept.txt"));
    before.mark_removed_file(&tree.path("gone.txt"));
    before.mark_renamed_dir(&tree.path("old"), &tree.path("missing"));
    db.persist_pending(&before).unwrap();

    let mut repo = MemoryRepository::new("alice");
    repo.create_view("proj", "main", tree.dir.path());
    let ws = open(repo, true);
    db.restore_pending(&ws.pending()).unwrap();

    assert!(ws.pending().contains_new(&tree.path("Kept.txt")));
    let restored = ws.pending().snapshot();
    assert!(restored.removed_files.contains(&tree.path("gone.txt")));
    assert!(restored.renamed_dirs.is_empty());
}

#[test]
fn test_store_round_trip_keeps_history() {
    let tree = Tree::new();
    let store = tree.disk("store.json");
    let mut repo = MemoryRepository::new("alice");
    let root = repo.create_view("proj", "main", tree.dir.path());
    seed_tracked(&mut repo, &tree, root, "a.txt", b"one");
    tree.write("a.txt", b"two");
    let mut ws = open(repo, true);
    assert!(ws.checkin_file(&tree.path("a.txt"), "second").unwrap());
    ws.into_session().save_to(&store).unwrap();

    let mut reopened = MemoryRepository::open(&store).unwrap();
    reopened.log_on("alice", None).unwrap();
    let mut ws = open(reopened, true);
    let revisions = ws.list_revisions(&tree.path("a.txt")).unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].comment, "second");
    assert_eq!(revisions[1].author, "alice");
}
