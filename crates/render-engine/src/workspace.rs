//! Per-job temporary directory.

use std::path::{Path, PathBuf};

use fragcut_common::FragcutResult;

/// File names used inside a job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    root: PathBuf,
}

impl JobPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Core filter-complex script.
    pub fn filter_script(&self) -> PathBuf {
        self.root.join("f.txt")
    }

    pub fn intro_filter_script(&self) -> PathBuf {
        self.root.join("f_intro.txt")
    }

    pub fn core_video(&self) -> PathBuf {
        self.root.join("core.mp4")
    }

    pub fn intro_video(&self) -> PathBuf {
        self.root.join("intro.mp4")
    }

    pub fn caption_png(&self) -> PathBuf {
        self.root.join("caption.png")
    }

    pub fn concat_list(&self) -> PathBuf {
        self.root.join("concat.txt")
    }

    pub fn final_video(&self) -> PathBuf {
        self.root.join("final.mp4")
    }
}

/// A freshly created, randomly named directory removed when the job ends.
#[derive(Debug)]
pub struct TempJobDir {
    dir: tempfile::TempDir,
    paths: JobPaths,
}

impl TempJobDir {
    /// Create `fragcut-<random>` under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> FragcutResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fragcut-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let paths = JobPaths::new(dir.path());
        tracing::debug!(dir = %dir.path().display(), "Created job directory");
        Ok(Self { dir, paths })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    /// Remove the directory and everything in it. Failures are logged.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(dir = %path.display(), "Removed job directory"),
            Err(e) => {
                tracing::warn!(dir = %path.display(), error = %e, "Failed to remove job directory")
            }
        }
    }
}
