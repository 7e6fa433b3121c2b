use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{ReviewError, Result};
use crate::languages::LanguageRegistry;

pub struct FileWalker {
    registry: LanguageRegistry,
}

impl FileWalker {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    /// Collects every supported file under `root`, sorted by path string so
    /// runs are deterministic. Hidden and ignore-listed paths are included;
    /// only the extension allow-list filters.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(ReviewError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("project root '{}' is not a directory", root.display()),
            )));
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() && self.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
        Ok(files)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.is_supported(path)
    }
}
