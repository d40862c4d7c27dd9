use olivaw_core::{Error, Event, Production};
use olivaw_ledger::{GitBackend, Ledger};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(["-c", "init.defaultBranch=master"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn clone(root: &Path, name: &str) -> std::path::PathBuf {
    git(root, &["clone", "--quiet", "remote.git", name]);
    let dir = root.join(name);
    git(&dir, &["config", "user.email", "ledger@test.com"]);
    git(&dir, &["config", "user.name", "Ledger Test"]);
    dir
}

fn open(clone_dir: &Path) -> Ledger {
    let backend = GitBackend::new(clone_dir.join("ledger.yml"), "origin", "master").unwrap();
    Ledger::open(Box::new(backend)).unwrap()
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git").args(args).current_dir(dir).output().unwrap();
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn hook(clone_dir: &Path, name: &str, body: &str) {
    let dir = clone_dir.join(".git/hooks");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn unhook(clone_dir: &Path, name: &str) {
    std::fs::remove_file(clone_dir.join(".git/hooks").join(name)).unwrap();
}

fn names(ledger: &Ledger) -> Vec<&str> {
    ledger.events().iter().map(|e| e.name.as_str()).collect()
}

fn event(name: &str) -> Event {
    let mut e = Event::new(name);
    e.add_production(Production::new("Prod0", "rift")).unwrap();
    e
}

#[test]
fn concurrent_push_is_detected() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    git(root, &["init", "--quiet", "--bare", "remote.git"]);

    let a_dir = clone(root, "a");
    let mut a = open(&a_dir);
    a.update_event(event("S1")).unwrap();

    let b_dir = clone(root, "b");
    let mut b = open(&b_dir);
    assert_eq!(b.get_event(None).len(), 1);

    // Writer A publishes first.
    a.update_event(event("S2")).unwrap();

    // Writer B is now behind the remote.
    let err = b.update_event(event("S3")).unwrap_err();
    assert!(matches!(err, Error::LedgerSync(_)), "got {err}");
    let names: Vec<&str> = b.events().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["S1"]);

    // Reload and retry succeeds.
    b.load().unwrap();
    b.update_event(event("S3")).unwrap();
    assert_eq!(b.events().len(), 3);

    a.load().unwrap();
    assert!(a.event("S3").is_some());
}

#[test]
fn each_save_is_one_commit() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    git(root, &["init", "--quiet", "--bare", "remote.git"]);
    let dir = clone(root, "a");
    let mut ledger = open(&dir);

    ledger.update_event(event("S1")).unwrap();
    ledger.update_event(event("S2")).unwrap();
    // Unchanged content produces no commit.
    ledger.save(ledger.events().to_vec()).unwrap();

    let out = Command::new("git")
        .args(["rev-list", "--count", "origin/master"])
        .current_dir(&dir)
        .output()
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "2");
}

#[test]
fn failed_commit_leaves_clone_clean() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    git(root, &["init", "--quiet", "--bare", "remote.git"]);
    let dir = clone(root, "a");
    let mut ledger = open(&dir);

    // First write into an empty clone.
    hook(&dir, "pre-commit", "echo refused >&2\nexit 1\n");
    let err = ledger.update_event(event("S1")).unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {err}");
    assert!(ledger.events().is_empty());
    assert!(!dir.join("ledger.yml").exists());
    assert!(git_stdout(&dir, &["status", "--porcelain", "--", "ledger.yml"]).is_empty());

    unhook(&dir, "pre-commit");
    ledger.update_event(event("S1")).unwrap();
    let head = git_stdout(&dir, &["rev-parse", "HEAD"]);

    // A later write on top of history.
    hook(&dir, "pre-commit", "exit 1\n");
    assert!(ledger.update_event(event("S2")).is_err());
    assert_eq!(names(&ledger), vec!["S1"]);
    assert_eq!(git_stdout(&dir, &["rev-parse", "HEAD"]), head);
    assert!(git_stdout(&dir, &["status", "--porcelain", "--", "ledger.yml"]).is_empty());
    assert!(!std::fs::read_to_string(dir.join("ledger.yml")).unwrap().contains("S2"));

    ledger.load().unwrap();
    assert_eq!(names(&ledger), vec!["S1"]);
}

#[test]
fn rejected_push_rolls_back() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    git(root, &["init", "--quiet", "--bare", "remote.git"]);

    let a_dir = clone(root, "a");
    let mut a = open(&a_dir);
    a.update_event(event("S1")).unwrap();

    let b_dir = clone(root, "b");
    let mut b = open(&b_dir);
    let before = git_stdout(&b_dir, &["rev-parse", "HEAD"]);

    // Another clone publishes between B's freshness check and B's push.
    let c_dir = clone(root, "c");
    std::fs::write(c_dir.join("notes.txt"), "calibration updated\n").unwrap();
    git(&c_dir, &["add", "notes.txt"]);
    git(&c_dir, &["commit", "--quiet", "-m", "notes"]);
    hook(
        &b_dir,
        "pre-push",
        &format!(
            "cat >/dev/null\n\
             unset GIT_DIR GIT_WORK_TREE GIT_INDEX_FILE\n\
             git -C '{}' push --quiet origin HEAD:refs/heads/master >/dev/null 2>&1\n\
             rm \"$0\"\n",
            c_dir.display()
        ),
    );

    let err = b.update_event(event("S3")).unwrap_err();
    assert!(matches!(err, Error::LedgerSync(_)), "got {err}");
    assert_eq!(names(&b), vec!["S1"]);
    assert_eq!(git_stdout(&b_dir, &["rev-parse", "HEAD"]), before);
    assert!(!std::fs::read_to_string(b_dir.join("ledger.yml")).unwrap().contains("S3"));

    // Reload picks up the other clone's commit and the retry goes through.
    b.load().unwrap();
    assert!(b_dir.join("notes.txt").exists());
    b.update_event(event("S3")).unwrap();
    a.load().unwrap();
    assert_eq!(names(&a), vec!["S1", "S3"]);
}
