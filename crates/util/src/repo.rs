//! Text-file access to a target repository.
//!
//! Artifact stores never touch the filesystem directly; they go through
//! [`RepoAccess`] so tests and alternative backends can supply their own
//! implementation. All paths handed to the trait are repo-relative.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::paths::normalize_relpath;

/// Text-file capability over a repository root.
pub trait RepoAccess: Send + Sync {
    /// Root directory all relative paths are resolved against.
    fn root(&self) -> &Path;

    /// True if a file or directory exists at `relpath`.
    fn exists(&self, relpath: &Path) -> bool;

    fn read_text(&self, relpath: &Path) -> io::Result<String>;

    /// Writes `content` to `relpath`, creating parent directories and
    /// replacing any existing file.
    fn write_text(&self, relpath: &Path, content: &str) -> io::Result<()>;

    /// Repo-relative paths matching `pattern` (for example `**/*.yaml`), sorted.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;
}

/// [`RepoAccess`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRepoAccess {
    root: PathBuf,
}

impl FsRepoAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relpath: &Path) -> io::Result<PathBuf> {
        let normalized = normalize_relpath(relpath).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path '{}' escapes the repository root", relpath.display()),
            )
        })?;
        Ok(self.root.join(normalized))
    }
}

impl RepoAccess for FsRepoAccess {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, relpath: &Path) -> bool {
        self.resolve(relpath).map(|path| path.exists()).unwrap_or(false)
    }

    fn read_text(&self, relpath: &Path) -> io::Result<String> {
        let path = self.resolve(relpath)?;
        debug!(path = %path.display(), "reading repository file");
        fs::read_to_string(path)
    }

    fn write_text(&self, relpath: &Path, content: &str) -> io::Result<()> {
        let path = self.resolve(relpath)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), bytes = content.len(), "writing repository file");
        fs::write(path, content)
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let full_pattern = format!("{}/{}", root.trim_end_matches('/'), pattern.trim_start_matches('/'));
        let entries = glob::glob(&full_pattern).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;

        let mut matches = Vec::new();
        for entry in entries {
            let path = entry.map_err(|error| io::Error::other(error.to_string()))?;
            if let Ok(relative) = path.strip_prefix(&self.root) {
                matches.push(relative.to_path_buf());
            }
        }
        matches.sort();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_create_parent_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FsRepoAccess::new(temp_dir.path());

        repo.write_text(Path::new("project/design/udd.yaml"), "id: UDD-01\n").unwrap();

        assert!(repo.exists(Path::new("project/design/udd.yaml")));
        assert_eq!(repo.read_text(Path::new("project/design/udd.yaml")).unwrap(), "id: UDD-01\n");
    }

    #[test]
    fn glob_returns_sorted_relative_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FsRepoAccess::new(temp_dir.path());
        repo.write_text(Path::new("b/UDD-01.yaml"), "").unwrap();
        repo.write_text(Path::new("a/nested/UDD-01.yaml"), "").unwrap();
        repo.write_text(Path::new("a/UDD-02.yaml"), "").unwrap();

        let matches = repo.glob("**/UDD-01.yaml").unwrap();

        assert_eq!(matches, vec![PathBuf::from("a/nested/UDD-01.yaml"), PathBuf::from("b/UDD-01.yaml")]);
    }

    #[test]
    fn rejects_paths_outside_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FsRepoAccess::new(temp_dir.path().join("repo"));

        assert!(!repo.exists(Path::new("../secret.txt")));
        let error = repo.read_text(Path::new("../secret.txt")).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }
}
