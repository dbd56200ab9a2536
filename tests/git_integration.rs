//! Integration tests for the Git interface and the engine on real repositories.
//!
//! These tests use real git repositories created via tempfile and the git
//! CLI, then check the results with the git CLI as well.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use reweave::core::rules::{FieldPatch, Matcher, RewriteRule, RuleSet};
use reweave::core::types::{BranchName, Oid, RefName};
use reweave::engine::{
    apply_rewrite, list_history, plan_rewrite, preview_rewrite, restore_branch, ApplyOptions,
    PlanOptions,
};
use reweave::git::{Git, GitError, GitState};
use reweave::store::ObjectStore;

/// Test fixture that creates a real git repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit on main.
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);

        let repo = Self { dir };
        repo.commit_file("README.md", "# Test Repo\n", "Initial commit");
        repo
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git(&self) -> Git {
        Git::open(self.path()).expect("failed to open test repo")
    }

    /// Create a file and commit it, returning the new commit id.
    fn commit_file(&self, path: &str, content: &str, message: &str) -> Oid {
        std::fs::write(self.path().join(path), content).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-m", message]);
        self.rev_parse("HEAD")
    }

    /// Commit with an explicit author.
    fn commit_as(&self, author: &str, path: &str, message: &str) -> Oid {
        std::fs::write(self.path().join(path), message).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "--author", author, "-m", message]);
        self.rev_parse("HEAD")
    }

    fn rev_parse(&self, rev: &str) -> Oid {
        Oid::new(git_output(self.path(), &["rev-parse", rev])).unwrap()
    }

    fn log_format(&self, format: &str) -> Vec<String> {
        git_output(self.path(), &["log", &format!("--format={format}"), "main"])
            .lines()
            .map(String::from)
            .collect()
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn main_branch() -> BranchName {
    BranchName::new("main").unwrap()
}

fn retag_author(from: &str, name: &str, email: &str) -> RuleSet {
    RuleSet::single(RewriteRule::new(
        Matcher::AuthorEmail { email: from.into() },
        FieldPatch {
            author_name: Some(name.into()),
            author_email: Some(email.into()),
            ..FieldPatch::default()
        },
    ))
}

// =============================================================================
// Repository access
// =============================================================================

#[test]
fn open_non_repository_fails() {
    let dir = TempDir::new().unwrap();
    let result = Git::open(dir.path());
    assert!(matches!(result, Err(GitError::NotARepo { .. })));
}

#[test]
fn open_from_subdirectory() {
    let repo = TestRepo::new();
    let sub = repo.path().join("nested/dir");
    std::fs::create_dir_all(&sub).unwrap();
    let git = Git::open(&sub).unwrap();
    assert_eq!(
        git.info().common_dir.canonicalize().unwrap(),
        repo.path().join(".git").canonicalize().unwrap()
    );
}

#[test]
fn clean_state_when_no_operation() {
    let repo = TestRepo::new();
    assert_eq!(repo.git().state(), GitState::Clean);
}

#[test]
fn read_commit_matches_git() {
    let repo = TestRepo::new();
    let id = repo.commit_as("Ada <ada@example.com>", "a.txt", "Add a");
    let commit = repo.git().read_commit(&id).unwrap().unwrap();

    assert_eq!(commit.author.name, "Ada");
    assert_eq!(commit.author.email, "ada@example.com");
    assert_eq!(commit.committer.email, "test@example.com");
    assert_eq!(commit.message, "Add a\n");
    assert_eq!(commit.tree, repo.rev_parse("HEAD^{tree}"));
    assert_eq!(commit.parents, vec![repo.rev_parse("HEAD~1")]);
    assert_eq!(commit.compute_id(repo.git().hash_algorithm()), id);
}

#[test]
fn list_history_matches_rev_list() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a", "Add a");
    repo.commit_file("b.txt", "b", "Add b");

    let listed: Vec<String> = list_history(&repo.git(), &main_branch(), None)
        .unwrap()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    let expected: Vec<String> = git_output(repo.path(), &["rev-list", "--topo-order", "main"])
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(listed, expected);
}

#[test]
fn cas_on_branch_ref() {
    let repo = TestRepo::new();
    let first = repo.rev_parse("HEAD");
    let second = repo.commit_file("a.txt", "a", "Add a");
    let git = repo.git();
    let branch = RefName::for_branch(&main_branch());

    let stale = git
        .compare_and_swap_ref(&branch, Some(&first), &first, "test")
        .unwrap();
    assert_eq!(
        stale,
        reweave::store::CasOutcome::Mismatch {
            current: Some(second.clone())
        }
    );

    let swapped = git
        .compare_and_swap_ref(&branch, Some(&second), &first, "test")
        .unwrap();
    assert_eq!(swapped, reweave::store::CasOutcome::Updated);
    assert_eq!(repo.rev_parse("main"), first);
}

// =============================================================================
// Rewrites
// =============================================================================

#[test]
fn rewrite_author_in_real_repository() {
    let repo = TestRepo::new();
    let root = repo.rev_parse("HEAD");
    repo.commit_as("Old Name <old@example.com>", "a.txt", "Add a");
    repo.commit_file("b.txt", "b", "Add b");
    let trees_before = repo.log_format("%T");

    let git = repo.git();
    let rules = retag_author("old@example.com", "New Name", "new@example.com");
    let plan = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    assert_eq!(preview_rewrite(&plan).changed_count(), 2);
    let outcome = apply_rewrite(&git, &plan, &ApplyOptions::default()).unwrap();

    assert_eq!(repo.rev_parse("main"), outcome.new_tip);
    assert_eq!(
        repo.log_format("%an <%ae>"),
        vec![
            "Test User <test@example.com>",
            "New Name <new@example.com>",
            "Test User <test@example.com>"
        ]
    );
    assert_eq!(repo.log_format("%T"), trees_before);
    assert_eq!(repo.rev_parse("main~2"), root);
    run_git(repo.path(), &["fsck", "--strict", "--no-dangling"]);
}

#[test]
fn merge_commits_keep_parent_order() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-b", "side"]);
    repo.commit_as("Side Dev <side@example.com>", "side.txt", "Side work");
    run_git(repo.path(), &["checkout", "main"]);
    repo.commit_file("main.txt", "m", "Main work");
    run_git(repo.path(), &["merge", "--no-ff", "-m", "Merge side", "side"]);
    let first_parent = repo.rev_parse("main^1");

    let git = repo.git();
    let rules = retag_author("side@example.com", "Side Dev", "side@new.example");
    let plan = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    apply_rewrite(&git, &plan, &ApplyOptions::default()).unwrap();

    assert_eq!(repo.rev_parse("main^1"), first_parent);
    assert_eq!(
        git_output(repo.path(), &["log", "-1", "--format=%ae", "main^2"]),
        "side@new.example"
    );
    assert_eq!(git_output(repo.path(), &["log", "-1", "--format=%s", "main"]), "Merge side");
    run_git(repo.path(), &["fsck", "--strict", "--no-dangling"]);
}

#[test]
fn edited_dates_and_message_round_trip_through_git() {
    let repo = TestRepo::new();
    let target = repo.commit_file("a.txt", "a", "Old message");
    let when = reweave::core::commit::parse_date("2021-06-01 10:30:00 +0200").unwrap();

    let git = repo.git();
    let rules = RuleSet::single(RewriteRule::new(
        Matcher::Ids {
            ids: vec![target.short(10).to_string()],
        },
        FieldPatch {
            author_date: Some(when),
            message: Some("New message\n\nWith a body.".into()),
            ..FieldPatch::default()
        },
    ));
    let plan = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    apply_rewrite(&git, &plan, &ApplyOptions::default()).unwrap();

    assert_eq!(
        git_output(repo.path(), &["log", "-1", "--format=%ad", "--date=iso-strict", "main"]),
        "2021-06-01T10:30:00+02:00"
    );
    assert_eq!(git_output(repo.path(), &["log", "-1", "--format=%B", "main"]), "New message\n\nWith a body.");
}

#[test]
fn legacy_encoded_commit_keeps_its_bytes() {
    let repo = TestRepo::new();
    let root = repo.rev_parse("HEAD");
    std::fs::write(repo.path().join("a.txt"), "a").unwrap();
    std::fs::write(repo.path().join("msg.txt"), b"caf\xE9\n").unwrap();
    run_git(repo.path(), &["add", "a.txt"]);
    run_git(
        repo.path(),
        &["-c", "i18n.commitEncoding=ISO-8859-1", "commit", "-F", "msg.txt"],
    );

    let git = repo.git();
    let when = reweave::core::commit::parse_date("2021-06-01 10:30:00 +0200").unwrap();
    let rules = RuleSet::single(RewriteRule::new(
        Matcher::Ids {
            ids: vec![root.as_str().to_string()],
        },
        FieldPatch {
            author_date: Some(when),
            ..FieldPatch::default()
        },
    ));
    let plan = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    assert_eq!(plan.changed_count(), 2);
    apply_rewrite(&git, &plan, &ApplyOptions::default()).unwrap();

    let output = Command::new("git")
        .args(["cat-file", "commit", "main"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let raw = output.stdout;
    let has = |needle: &[u8]| raw.windows(needle.len()).any(|w| w == needle);
    assert!(has(b"\nencoding ISO-8859-1\n"));
    assert!(raw.ends_with(b"\n\ncaf\xE9\n"));
    assert_ne!(repo.rev_parse("main~1"), root);
    run_git(repo.path(), &["fsck", "--strict", "--no-dangling"]);

    let reword = RuleSet::single(RewriteRule::new(
        Matcher::Any,
        FieldPatch {
            message: Some("cafe\n".into()),
            ..FieldPatch::default()
        },
    ));
    let err = plan_rewrite(&git, &main_branch(), &reword, &PlanOptions::default()).unwrap_err();
    assert!(matches!(err, reweave::engine::RewriteError::Validation(_)));
}

#[test]
fn backups_allow_restore() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a", "Add a");
    let before = repo.rev_parse("main");

    let git = repo.git();
    let rules = retag_author("test@example.com", "Renamed", "renamed@example.com");
    let plan = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    let outcome = apply_rewrite(&git, &plan, &ApplyOptions::default()).unwrap();

    assert_eq!(repo.rev_parse("refs/reweave/original/main"), before);
    assert_eq!(repo.rev_parse("refs/reweave/rewritten/main"), outcome.new_tip);

    let restored = restore_branch(&git, &main_branch(), false).unwrap();
    assert_eq!(restored.to, before);
    assert_eq!(repo.rev_parse("main"), before);
}

#[test]
fn parallel_rehash_matches_sequential_on_git() {
    let repo = TestRepo::new();
    for i in 0..8 {
        repo.commit_file(&format!("f{i}.txt"), "x", &format!("Commit {i}"));
    }
    let git = repo.git();
    let rules = retag_author("test@example.com", "Renamed", "renamed@example.com");

    let sequential = plan_rewrite(&git, &main_branch(), &rules, &PlanOptions::default()).unwrap();
    let parallel = plan_rewrite(
        &git,
        &main_branch(),
        &rules,
        &PlanOptions {
            workers: 3,
            ..PlanOptions::default()
        },
    )
    .unwrap();
    assert_eq!(sequential.new_tip, parallel.new_tip);
    assert_eq!(sequential.mapping, parallel.mapping);
}
