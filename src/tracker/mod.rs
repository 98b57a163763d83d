//! Git-backed change tracking for quests.
//!
//! The review phase is only eligible when something actually changed since
//! the quest started, so each quest records the HEAD sha at creation and
//! this tracker diffs the working tree against it.

use anyhow::{Context, Result};
use git2::{DiffOptions, Repository};
use std::path::Path;

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Current HEAD sha, or `None` for an unborn branch.
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string())
    }

    /// Paths changed between the given baseline commit and the working
    /// directory (including uncommitted changes).
    pub fn changed_files_since(&self, baseline_sha: &str) -> Result<Vec<String>> {
        let baseline = self
            .repo
            .find_commit(self.repo.revparse_single(baseline_sha)?.id())
            .context("Baseline commit not found")?;
        let baseline_tree = baseline.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&baseline_tree), Some(&mut opts))?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().to_string());
            if let Some(path) = path {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    fn setup_repo() -> (GitTracker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let tracker = GitTracker::new(dir.path()).unwrap();
        (tracker, dir)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("test", "test@localhost").unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_head_sha_unborn_then_populated() {
        let (tracker, dir) = setup_repo();
        assert!(tracker.head_sha().is_none());
        commit_file(dir.path(), "a.txt", "hello", "init");
        assert!(tracker.head_sha().is_some());
    }

    #[test]
    fn test_changed_files_since_detects_new_and_modified() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");
        let baseline = tracker.head_sha().unwrap();

        fs::write(dir.path().join("a.txt"), "changed").unwrap();
        fs::write(dir.path().join("b.txt"), "new file").unwrap();

        let changed = tracker.changed_files_since(&baseline).unwrap();
        assert!(changed.contains(&"a.txt".to_string()));
        assert!(changed.contains(&"b.txt".to_string()));
    }

    #[test]
    fn test_changed_files_since_empty_when_clean() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");
        let baseline = tracker.head_sha().unwrap();
        let changed = tracker.changed_files_since(&baseline).unwrap();
        assert!(changed.is_empty());
    }
}
