use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TASKS: &str = "\
# Tasks

- [x] 1. Scaffold project
- [ ] 2. Implement login
  - _Prompt: Build the login form_
- [ ] 3. Write docs
";

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let spec = temp.path().join(".spec-workflow/specs/user-auth");
    fs::create_dir_all(&spec).unwrap();
    fs::write(spec.join("tasks.md"), TASKS).unwrap();
    fs::write(spec.join("requirements.md"), "# Requirements\n").unwrap();
    temp
}

fn specflow(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("specflow").unwrap();
    cmd.arg("--project").arg(project).env_remove("RUST_LOG");
    cmd
}

fn write_approval(project: &Path, id: &str, status: &str) {
    let dir = project.join(".spec-workflow/approvals/user-auth");
    fs::create_dir_all(&dir).unwrap();
    let record = serde_json::json!({
        "id": id,
        "title": "Requirements review",
        "filePath": ".spec-workflow/specs/user-auth/requirements.md",
        "type": "document",
        "status": status,
        "createdAt": "2025-01-01T00:00:00Z",
        "categoryName": "user-auth",
        "category": "spec"
    });
    fs::write(dir.join(format!("{id}.json")), record.to_string()).unwrap();
}

#[test]
fn test_specs_lists_active_specs() {
    let temp = project();
    specflow(temp.path())
        .arg("specs")
        .assert()
        .success()
        .stdout(predicate::str::contains("user-auth"))
        .stdout(predicate::str::contains("1/3 tasks"));
}

#[test]
fn test_specs_json() {
    let temp = project();
    let output = specflow(temp.path())
        .args(["--json", "specs"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let specs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(specs[0]["displayName"], "User Auth");
}

#[test]
fn test_tasks_next_shows_prompt() {
    let temp = project();
    specflow(temp.path())
        .args(["tasks", "next", "user-auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 Implement login"))
        .stdout(predicate::str::contains("Build the login form"));
}

#[test]
fn test_set_status_dry_run_leaves_file() {
    let temp = project();
    specflow(temp.path())
        .args(["tasks", "set-status", "user-auth", "2", "completed", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- [ ] 2. Implement login"))
        .stdout(predicate::str::contains("+- [x] 2. Implement login"));

    let on_disk =
        fs::read_to_string(temp.path().join(".spec-workflow/specs/user-auth/tasks.md")).unwrap();
    assert_eq!(on_disk, TASKS);
}

#[test]
fn test_set_status_dry_run_refuses_second_in_progress() {
    let temp = project();
    specflow(temp.path())
        .args(["tasks", "set-status", "user-auth", "2", "in-progress"])
        .assert()
        .success();
    specflow(temp.path())
        .args(["tasks", "set-status", "user-auth", "3", "in-progress", "--dry-run"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_set_status_writes_one_marker() {
    let temp = project();
    specflow(temp.path())
        .args(["tasks", "set-status", "user-auth", "3", "in-progress"])
        .assert()
        .success();

    let on_disk =
        fs::read_to_string(temp.path().join(".spec-workflow/specs/user-auth/tasks.md")).unwrap();
    assert_eq!(on_disk, TASKS.replace("- [ ] 3.", "- [-] 3."));
}

#[test]
fn test_unknown_task_fails_with_id() {
    let temp = project();
    specflow(temp.path())
        .args(["tasks", "set-status", "user-auth", "7.4", "completed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("7.4"));
}

#[test]
fn test_archive_blocked_by_pending_approval() {
    let temp = project();
    write_approval(temp.path(), "approval_1_abc", "pending");

    specflow(temp.path())
        .args(["archive", "user-auth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pending approval"));

    specflow(temp.path())
        .args(["approvals", "decide", "approval_1_abc", "approve", "-r", "ok"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"));

    specflow(temp.path())
        .args(["archive", "user-auth"])
        .assert()
        .success();
    specflow(temp.path())
        .args(["locate", "user-auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archived"));
}

#[test]
fn test_approval_content_resolves_artifact() {
    let temp = project();
    write_approval(temp.path(), "approval_2_def", "pending");
    specflow(temp.path())
        .args(["approvals", "content", "approval_2_def"])
        .assert()
        .success()
        .stdout("# Requirements\n");
}

#[test]
fn test_locate_missing() {
    let temp = project();
    specflow(temp.path())
        .args(["locate", "nothing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not-found"));
}
