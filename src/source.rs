//! Where module source text comes from.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::table::ModuleId;

/// Read access to module sources, keyed by module identity.
///
/// Implementations must be `Sync`: the parallel builder reads from several
/// threads at once.
pub trait SourceProvider: Sync {
    fn is_file(&self, id: &ModuleId) -> bool;
    fn read(&self, id: &ModuleId) -> io::Result<String>;
}

/// Sources on disk below a project root.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceProvider for FsSource {
    fn is_file(&self, id: &ModuleId) -> bool {
        id.to_path(&self.root).is_file()
    }

    fn read(&self, id: &ModuleId) -> io::Result<String> {
        fs::read_to_string(id.to_path(&self.root))
    }
}

/// Virtual sources, keyed by root-relative path (`src/index.js` or
/// `./src/index.js`).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, source: &str) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: &str, source: &str) {
        self.files.insert(normalize_key(path), source.to_string());
    }
}

fn normalize_key(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    format!("./{}", trimmed)
}

impl SourceProvider for MemorySource {
    fn is_file(&self, id: &ModuleId) -> bool {
        self.files.contains_key(id.as_str())
    }

    fn read(&self, id: &ModuleId) -> io::Result<String> {
        self.files.get(id.as_str()).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no virtual module {}", id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_key_forms() {
        let source = MemorySource::new()
            .with_file("src/a.js", "a")
            .with_file("./src/b.js", "b");
        let a = ModuleId::from_segments(&["src", "a.js"]);
        let b = ModuleId::from_segments(&["src", "b.js"]);
        assert!(source.is_file(&a));
        assert_eq!(source.read(&b).unwrap(), "b");
        assert!(source
            .read(&ModuleId::from_segments(&["c.js"]))
            .is_err());
    }

    #[test]
    fn test_fs_source_reads_below_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.js"), "console.log(1);").unwrap();

        let source = FsSource::new(dir.path());
        let id = ModuleId::from_segments(&["src", "index.js"]);
        assert!(source.is_file(&id));
        assert_eq!(source.read(&id).unwrap(), "console.log(1);");
        assert!(!source.is_file(&ModuleId::from_segments(&["src"])));
    }
}
