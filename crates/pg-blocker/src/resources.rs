//! Bundled rule document resources.

use std::io;
use std::path::{Path, PathBuf};

/// Source of packaged rule documents.
pub trait ResourceLoader: Send + Sync {
    /// Path of `<basename>.<extension>`, if the bundle has it.
    fn locate(&self, basename: &str, extension: &str) -> Option<PathBuf>;

    fn read_text(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Resources laid out flat in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for DirectoryResources {
    fn locate(&self, basename: &str, extension: &str) -> Option<PathBuf> {
        if basename.is_empty() || basename.contains(['/', '\\']) {
            return None;
        }
        let path = self.root.join(format!("{}.{}", basename, extension));
        path.is_file().then_some(path)
    }
}
