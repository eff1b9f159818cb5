//! Module identities, records and the module table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::resolve::normalize;

/// Canonical key of one physical module: root-relative, `/`-separated,
/// `./`-prefixed, with no `.` or `..` segments. Two imports of the same file
/// always produce byte-identical ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Normalizes a root-relative path (`src/a.js`, `./src/./a.js`) into an
    /// id. Returns `None` for an empty path or one that climbs above the root.
    pub fn new(path: &str) -> Option<Self> {
        let segments = normalize(&[], &format!("./{}", path.trim_start_matches('/')))?;
        if segments.is_empty() {
            return None;
        }
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
        Some(Self::from_segments(&parts))
    }

    /// Builds an id from already-normalized path segments.
    pub(crate) fn from_segments(segments: &[&str]) -> Self {
        ModuleId(format!("./{}", segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments below the root, e.g. `["src", "add.js"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.0
            .trim_start_matches("./")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Segments of the containing directory.
    pub fn dir_segments(&self) -> Vec<&str> {
        let mut segments = self.segments();
        segments.pop();
        segments
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.0).extension().and_then(|e| e.to_str())
    }

    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bundled module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Raw specifier as written in the source -> resolved identity. Always
    /// present; a module without imports has an empty map.
    pub deps: BTreeMap<String, ModuleId>,
    /// CommonJS-shaped, downleveled module body.
    pub code: String,
}

impl ModuleRecord {
    pub fn new(id: ModuleId, deps: BTreeMap<String, ModuleId>, code: String) -> Self {
        ModuleRecord { id, deps, code }
    }
}

/// Identity -> record. Keys are unique and iteration is sorted by identity,
/// so serialization does not depend on visit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable {
    records: BTreeMap<ModuleId, ModuleRecord>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless its identity is already present. Returns
    /// whether the record was stored; an existing record is never replaced.
    pub fn insert(&mut self, record: ModuleRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        true
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.records.get(id)
    }

    pub fn get_str(&self, id: &str) -> Option<&ModuleRecord> {
        self.records.get(&ModuleId::new(id)?)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.values()
    }

    /// Dependency targets that have no record of their own.
    pub fn dangling_deps(&self) -> Vec<(&ModuleId, &str, &ModuleId)> {
        let mut dangling = Vec::new();
        for record in self.records.values() {
            for (specifier, target) in &record.deps {
                if !self.records.contains_key(target) {
                    dangling.push((&record.id, specifier.as_str(), target));
                }
            }
        }
        dangling
    }
}
