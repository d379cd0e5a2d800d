//! Working directories for candidate runs.
//!
//! Each round gets a directory it owns exclusively. Without a configured
//! working directory that is a fresh scratch directory; with one, the
//! directory is reset to the state captured when the loop started: files added
//! since are removed, and baseline files that were changed or deleted are
//! restored from a private copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use super::executor::SandboxError;
use super::policy::Policy;

/// Hands out per-round working directories.
#[derive(Debug)]
pub struct WorkspaceManager {
    scoped: Option<ScopedDir>,
    input_files: Vec<PathBuf>,
}

#[derive(Debug)]
struct ScopedDir {
    root: PathBuf,
    /// Baseline file path to content digest.
    baseline_files: BTreeMap<String, String>,
    baseline_dirs: BTreeSet<String>,
    /// Copy of every baseline file, laid out like `root`.
    backup: TempDir,
}

impl WorkspaceManager {
    /// Prepares workspaces for `policy`.
    ///
    /// A configured working directory is created if missing and its current
    /// contents become the baseline restored before every round.
    pub fn new(policy: &Policy) -> Result<Self, SandboxError> {
        for input in &policy.input_files {
            if !input.is_file() {
                return Err(SandboxError::Setup(format!(
                    "input file {} does not exist",
                    input.display()
                )));
            }
        }

        let scoped = match &policy.working_directory {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Some(ScopedDir::capture(dir.canonicalize()?)?)
            }
            None => None,
        };

        Ok(Self {
            scoped,
            input_files: policy.input_files.clone(),
        })
    }

    /// Returns a clean working directory for the next round.
    pub fn fresh_round(&self) -> Result<RunWorkspace, SandboxError> {
        let workspace = match &self.scoped {
            Some(scoped) => {
                scoped.reset()?;
                RunWorkspace {
                    root: scoped.root.clone(),
                    _scratch: None,
                }
            }
            None => {
                let scratch = tempfile::Builder::new().prefix("codeloop-run-").tempdir()?;
                RunWorkspace {
                    root: scratch.path().canonicalize()?,
                    _scratch: Some(scratch),
                }
            }
        };

        for input in &self.input_files {
            let name = input.file_name().ok_or_else(|| {
                SandboxError::Setup(format!("input file {} has no file name", input.display()))
            })?;
            fs::copy(input, workspace.root.join(name))?;
        }

        Ok(workspace)
    }
}

impl ScopedDir {
    fn capture(root: PathBuf) -> Result<Self, SandboxError> {
        let (files, baseline_dirs) = list_entries(&root);
        let backup = tempfile::Builder::new().prefix("codeloop-base-").tempdir()?;

        let mut baseline_files = BTreeMap::new();
        for file in files {
            let source = root.join(&file);
            let copy = backup.path().join(&file);
            if let Some(parent) = copy.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &copy)?;
            baseline_files.insert(file, file_digest(&copy)?);
        }

        debug!(
            dir = %root.display(),
            files = baseline_files.len(),
            "Captured working directory baseline"
        );
        Ok(Self {
            root,
            baseline_files,
            baseline_dirs,
            backup,
        })
    }

    fn reset(&self) -> Result<(), SandboxError> {
        let (files, dirs) = list_entries(&self.root);

        for file in files.iter().filter(|f| !self.baseline_files.contains_key(*f)) {
            fs::remove_file(self.root.join(file))?;
        }

        // Deepest first so parents are empty when reached.
        let mut new_dirs: Vec<&String> = dirs.difference(&self.baseline_dirs).collect();
        new_dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
        for dir in new_dirs {
            fs::remove_dir_all(self.root.join(dir))?;
        }

        for dir in self.baseline_dirs.difference(&dirs) {
            fs::create_dir_all(self.root.join(dir))?;
        }

        let mut restored = 0;
        for (file, digest) in &self.baseline_files {
            let target = self.root.join(file);
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            }
            let intact = target.is_file() && file_digest(&target).ok().as_ref() == Some(digest);
            if !intact {
                fs::copy(self.backup.path().join(file), &target)?;
                restored += 1;
            }
        }
        if restored > 0 {
            debug!(restored, "Restored changed baseline files");
        }

        Ok(())
    }
}

fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(fs::read(path)?);
    Ok(hex::encode(hasher.finalize()))
}

/// The working directory of one round.
///
/// Scratch directories are deleted when this value is dropped.
#[derive(Debug)]
pub struct RunWorkspace {
    root: PathBuf,
    _scratch: Option<TempDir>,
}

impl RunWorkspace {
    /// Uses an existing directory as-is, without reset or cleanup.
    pub fn existing(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _scratch: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Relative paths of all files currently in the directory.
    pub fn snapshot(&self) -> BTreeSet<String> {
        list_entries(&self.root).0
    }
}

/// Files and directories under `root`, as `/`-separated relative paths.
fn list_entries(root: &Path) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut files = BTreeSet::new();
    let mut dirs = BTreeSet::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            dirs.insert(relative);
        } else {
            files.insert(relative);
        }
    }

    (files, dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_rounds_are_fresh() {
        let manager = WorkspaceManager::new(&Policy::default()).unwrap();

        let first = manager.fresh_round().unwrap();
        fs::write(first.path().join("leftover.txt"), "x").unwrap();
        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());

        let second = manager.fresh_round().unwrap();
        assert!(second.snapshot().is_empty());
    }

    #[test]
    fn test_scoped_directory_reset_to_baseline() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), "baseline").unwrap();

        let policy = Policy::default().with_working_directory(dir.path());
        let manager = WorkspaceManager::new(&policy).unwrap();

        let round = manager.fresh_round().unwrap();
        fs::write(round.path().join("new.txt"), "created").unwrap();
        fs::create_dir_all(round.path().join("nested/deeper")).unwrap();
        fs::write(round.path().join("nested/deeper/file.csv"), "a,b").unwrap();
        drop(round);

        let round = manager.fresh_round().unwrap();
        let files = round.snapshot();
        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["keep.txt"]);
        assert!(!round.path().join("nested").exists());
        // Scoped directories are not deleted on drop.
        drop(round);
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_scoped_directory_restores_changed_baseline_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), "baseline").unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/input.csv"), "a,b\n1,2\n").unwrap();

        let policy = Policy::default().with_working_directory(dir.path());
        let manager = WorkspaceManager::new(&policy).unwrap();

        let round = manager.fresh_round().unwrap();
        fs::write(round.path().join("keep.txt"), "mutated by round 1").unwrap();
        fs::remove_dir_all(round.path().join("data")).unwrap();
        drop(round);

        let round = manager.fresh_round().unwrap();
        assert_eq!(
            fs::read_to_string(round.path().join("keep.txt")).unwrap(),
            "baseline"
        );
        assert_eq!(
            fs::read_to_string(round.path().join("data/input.csv")).unwrap(),
            "a,b\n1,2\n"
        );
    }

    #[test]
    fn test_input_files_copied_each_round() {
        let data = TempDir::new().unwrap();
        let input = data.path().join("data.csv");
        fs::write(&input, "x,y\n1,2\n").unwrap();

        let policy = Policy::default().with_input_file(&input);
        let manager = WorkspaceManager::new(&policy).unwrap();

        let round = manager.fresh_round().unwrap();
        assert_eq!(
            fs::read_to_string(round.path().join("data.csv")).unwrap(),
            "x,y\n1,2\n"
        );
        assert!(round.snapshot().contains("data.csv"));
    }

    #[test]
    fn test_missing_input_file_rejected() {
        let policy = Policy::default().with_input_file("/nonexistent/input.csv");
        let err = WorkspaceManager::new(&policy).unwrap_err();
        assert!(matches!(err, SandboxError::Setup(_)));
    }

    #[test]
    fn test_snapshot_uses_forward_slashes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), "").unwrap();

        let workspace = RunWorkspace::existing(dir.path());
        assert!(workspace.snapshot().contains("a/b/c.txt"));
    }
}
