use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::info;

use crate::error::{ReviewError, Result};

/// A project tree made available for one run.
///
/// Git URLs are cloned into a temporary directory under the sandbox
/// directory and removed on [`ProjectSource::release`]; local paths are used
/// in place and never touched.
#[derive(Debug)]
pub enum ProjectSource {
    Local(PathBuf),
    Cloned { url: String, dir: TempDir },
}

impl ProjectSource {
    pub fn acquire(source: &str, sandbox_dir: &Path) -> Result<Self> {
        if is_remote_source(source) {
            Self::clone_remote(source, sandbox_dir)
        } else {
            let path = PathBuf::from(source);
            if !path.is_dir() {
                return Err(ReviewError::Acquire(format!(
                    "local project path '{}' is not a directory",
                    path.display()
                )));
            }
            Ok(ProjectSource::Local(path))
        }
    }

    fn clone_remote(url: &str, sandbox_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(sandbox_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("project_")
            .tempdir_in(sandbox_dir)?;

        info!(url = %url, dir = %dir.path().display(), "Cloning repository");

        let output = Command::new("git")
            .arg("clone")
            .arg(url)
            .arg(dir.path())
            .output()
            .map_err(|e| ReviewError::Acquire(format!("Failed to run git clone: {}", e)))?;

        if !output.status.success() {
            return Err(ReviewError::Acquire(format!(
                "git clone of '{}' failed: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(ProjectSource::Cloned {
            url: url.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            ProjectSource::Local(path) => path,
            ProjectSource::Cloned { dir, .. } => dir.path(),
        }
    }

    /// Removes a cloned checkout; a local project is left as is.
    pub fn release(self) -> Result<()> {
        match self {
            ProjectSource::Local(_) => Ok(()),
            ProjectSource::Cloned { url, dir } => {
                info!(url = %url, dir = %dir.path().display(), "Removing cloned project");
                dir.close()?;
                Ok(())
            }
        }
    }
}

pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
