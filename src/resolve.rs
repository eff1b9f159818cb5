//! Module Identity Resolver
//!
//! Maps `(importing directory, specifier)` to a canonical [`ModuleId`].
//! Normalization is purely lexical; the only filesystem access is the
//! existence probe through the [`SourceProvider`].

use tracing::trace;

use crate::error::{BundleError, Result};
use crate::source::SourceProvider;
use crate::table::ModuleId;

/// Extensions tried, in order, when a specifier does not name a file as-is.
pub const PROBE_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx"];

/// Label used as the importer of the entry module in diagnostics.
pub const ENTRY_IMPORTER: &str = "<entry>";

pub struct Resolver<'s> {
    source: &'s dyn SourceProvider,
}

impl<'s> Resolver<'s> {
    pub fn new(source: &'s dyn SourceProvider) -> Self {
        Self { source }
    }

    /// Resolves a specifier written inside `importer`.
    pub fn resolve(&self, importer: &ModuleId, specifier: &str) -> Result<ModuleId> {
        self.resolve_from_dir(&importer.dir_segments(), specifier, importer.as_str())
    }

    /// Resolves the configured entry. A path without a leading `./` is still
    /// taken relative to the root.
    pub fn resolve_entry(&self, entry: &str) -> Result<ModuleId> {
        let specifier = if is_path_like(entry) {
            entry.to_string()
        } else {
            format!("./{}", entry)
        };
        self.resolve_from_dir(&[], &specifier, ENTRY_IMPORTER)
    }

    pub fn resolve_from_dir(
        &self,
        dir: &[&str],
        specifier: &str,
        importer: &str,
    ) -> Result<ModuleId> {
        let fail = |reason: &str| BundleError::Resolution {
            specifier: specifier.to_string(),
            importer: importer.to_string(),
            reason: reason.to_string(),
        };

        if !is_path_like(specifier) {
            return Err(fail("bare package specifiers are not supported"));
        }

        let segments = normalize(dir, specifier)
            .ok_or_else(|| fail("path escapes the project root"))?;

        for candidate in candidates(&segments, specifier.ends_with('/')) {
            let parts: Vec<&str> = candidate.iter().map(String::as_str).collect();
            let id = ModuleId::from_segments(&parts);
            if self.source.is_file(&id) {
                trace!(specifier, importer, module = %id, "resolved");
                return Ok(id);
            }
        }

        Err(fail("no such file"))
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
}

/// Joins `specifier` onto `dir` and collapses `.` and `..`. Returns `None`
/// when `..` would climb above the root.
pub fn normalize(dir: &[&str], specifier: &str) -> Option<Vec<String>> {
    let mut out: Vec<String> = if specifier.starts_with('/') {
        Vec::new()
    } else {
        dir.iter().map(|s| s.to_string()).collect()
    };

    for part in specifier.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            other => out.push(other.to_string()),
        }
    }
    Some(out)
}

fn candidates(segments: &[String], directory_only: bool) -> Vec<Vec<String>> {
    let mut out = Vec::new();

    if !segments.is_empty() && !directory_only {
        out.push(segments.to_vec());
        if let Some((last, parent)) = segments.split_last() {
            for ext in PROBE_EXTENSIONS {
                let mut with_ext = parent.to_vec();
                with_ext.push(format!("{}.{}", last, ext));
                out.push(with_ext);
            }
        }
    }

    for ext in PROBE_EXTENSIONS {
        let mut index = segments.to_vec();
        index.push(format!("index.{}", ext));
        out.push(index);
    }

    out
}
