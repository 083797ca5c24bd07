//! Per-request scratch files for the transcode path.
//!
//! Every allocation gets a request-unique token in its filenames, so two
//! requests for the same source never share (or delete) each other's files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Root directory under which scratch files are allocated.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

/// Source copy and processed copy for one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    pub source: PathBuf,
    pub processed: PathBuf,
}

impl WorkDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the working directory exists and return fresh paths for `base_name`.
    /// No files are created; the caller writes them.
    pub async fn allocate(&self, base_name: &str) -> Result<ScratchGuard, std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{token}_{base_name}");
        let paths = ScratchPaths {
            source: self.root.join(&name),
            processed: self.root.join(format!("processed_{name}")),
        };

        tracing::debug!(
            source = %paths.source.display(),
            processed = %paths.processed.display(),
            "Allocated scratch files"
        );
        Ok(ScratchGuard {
            paths,
            released: false,
        })
    }
}

/// Remove both scratch files. Missing files are fine; other failures are
/// logged and otherwise ignored. Safe to call any number of times.
pub fn release(paths: &ScratchPaths) {
    for path in [&paths.source, &paths.processed] {
        report_removal(path, std::fs::remove_file(path));
    }
}

/// Async form of [`release`] for use on the runtime.
pub async fn release_async(paths: &ScratchPaths) {
    for path in [&paths.source, &paths.processed] {
        report_removal(path, tokio::fs::remove_file(path).await);
    }
}

fn report_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
        }
    }
}

/// Owns a [`ScratchPaths`] pair. [`ScratchGuard::release`] removes the files
/// without blocking the runtime; if the guard is dropped first (for example
/// when the request future is cancelled mid-transcode) they are removed
/// synchronously instead.
#[derive(Debug)]
pub struct ScratchGuard {
    paths: ScratchPaths,
    released: bool,
}

impl ScratchGuard {
    pub fn paths(&self) -> &ScratchPaths {
        &self.paths
    }

    pub async fn release(mut self) {
        release_async(&self.paths).await;
        self.released = true;
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if !self.released {
            release(&self.paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("video");
        let workdir = WorkDir::new(&root);

        let guard = workdir.allocate("2025_01_a.mp4").await.unwrap();
        assert!(root.is_dir());
        assert!(guard.paths().source.starts_with(&root));
        assert_ne!(guard.paths().source, guard.paths().processed);

        // Idempotent
        workdir.allocate("2025_01_a.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn allocations_for_same_name_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(dir.path());

        let first = workdir.allocate("same.mp4").await.unwrap();
        let second = workdir.allocate("same.mp4").await.unwrap();
        assert_ne!(first.paths(), second.paths());
    }

    #[tokio::test]
    async fn release_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(dir.path());
        let guard = workdir.allocate("clip.mp4").await.unwrap();
        let paths = guard.paths().clone();

        std::fs::write(&paths.source, b"src").unwrap();
        std::fs::write(&paths.processed, b"out").unwrap();

        release(&paths);
        release(&paths);
        assert!(!paths.source.exists());
        assert!(!paths.processed.exists());

        // Guard release after manual release is also a no-op
        guard.release().await;
    }

    #[tokio::test]
    async fn async_release_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(dir.path());
        let guard = workdir.allocate("clip.mp4").await.unwrap();
        let paths = guard.paths().clone();

        std::fs::write(&paths.source, b"src").unwrap();
        std::fs::write(&paths.processed, b"out").unwrap();

        guard.release().await;
        assert!(!paths.source.exists());
        assert!(!paths.processed.exists());

        release_async(&paths).await;
    }

    #[tokio::test]
    async fn dropping_guard_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(dir.path());

        let paths = {
            let guard = workdir.allocate("clip.mp4").await.unwrap();
            std::fs::write(&guard.paths().source, b"src").unwrap();
            guard.paths().clone()
        };

        assert!(!paths.source.exists());
        assert!(!paths.processed.exists());
    }
}
