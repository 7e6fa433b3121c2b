//! Source-side collaborators: file discovery, chunking, symbol heuristics
//! and project acquisition.

pub mod acquire;
pub mod chunker;
pub mod symbols;
pub mod walker;

use std::path::{Path, PathBuf};

use crate::languages::{Language, LanguageRegistry};

pub use acquire::ProjectSource;
pub use chunker::chunk;
pub use symbols::extract_symbol_names;
pub use walker::FileWalker;

/// A file selected for one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: Language,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, registry: &LanguageRegistry) -> Self {
        let path = path.into();
        let language = registry.detect(&path);
        Self { path, language }
    }

    /// Identifier used for memory records and the action log.
    pub fn id(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
