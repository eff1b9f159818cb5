//! # Static Module Bundler
//!
//! Turns an entry module and everything it imports into one self-contained
//! script that runs in an environment with no module loader of its own.
//!
//! ```text
//! entry ─▶ resolve ─▶ read ─▶ downlevel ─▶ extract imports ─▶ rewrite to CJS
//!              ▲                                  │
//!              └──────────── worklist ◀───────────┘
//!                                │
//!                        ModuleTable ─▶ emit ─▶ Artifact
//! ```
//!
//! ## Build Invariants
//!
//! 1. **Identity**: every module is keyed by its root-relative, `./`-prefixed,
//!    normalized path. Two specifiers that reach the same file share one key.
//! 2. **Dedup**: each identity is read, parsed and transformed at most once
//!    per build, and appears exactly once in the table.
//! 3. **Termination**: identities are claimed before their imports are
//!    looked at, so cycles of any length stop.
//! 4. **Completeness**: every `deps` target has its own record.
//! 5. **Determinism**: the table is ordered by identity, so the same sources
//!    always produce a byte-identical artifact, sequential or parallel.
//! 6. **All or nothing**: any build-time failure aborts with a coded
//!    [`BundleError`] and no artifact.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod config;
pub mod emit;
pub mod error;
pub mod graph;
pub mod helpers;
pub mod imports;
pub mod interop;
pub mod resolve;
pub mod runtime;
pub mod source;
pub mod table;
pub mod transform;

#[cfg(test)]
mod graph_tests;

pub use config::{BundleOptions, LoaderFormat};
pub use emit::{emit, Artifact};
pub use error::{BundleError, Diagnostic, Result, RuntimeError};
pub use graph::{build_graph, ModuleGraph};
pub use runtime::{ModuleContext, ModuleRuntime, ModuleState};
pub use source::{FsSource, MemorySource, SourceProvider};
pub use table::{ModuleId, ModuleRecord, ModuleTable};

use tracing::warn;

/// Bundles `options.entry` from the filesystem under `options.root`.
pub fn bundle(options: &BundleOptions) -> Result<Artifact> {
    let source = FsSource::new(&options.root);
    bundle_with_source(&source, options)
}

/// Bundles from any [`SourceProvider`].
pub fn bundle_with_source(source: &dyn SourceProvider, options: &BundleOptions) -> Result<Artifact> {
    let graph = build_graph(source, options).map_err(|e| {
        warn!(code = e.code(), "bundle failed: {}", e);
        e
    })?;
    emit(&graph.entry, &graph.table, options)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi(object)]
pub struct BundleOutput {
    pub has_errors: bool,
    pub errors: Vec<Diagnostic>,
    pub entry: String,
    pub code: String,
    pub hash: String,
}

/// `bundleNative(optionsJson)`: build failures come back as diagnostics, only
/// malformed options reject the call.
#[cfg(feature = "napi")]
#[napi]
pub fn bundle_native(options_json: String) -> napi::Result<BundleOutput> {
    let options = BundleOptions::from_json_str(&options_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;

    match bundle(&options) {
        Ok(artifact) => Ok(BundleOutput {
            has_errors: false,
            errors: vec![],
            entry: artifact.entry.to_string(),
            code: artifact.code,
            hash: artifact.hash,
        }),
        Err(e) => Ok(BundleOutput {
            has_errors: true,
            errors: vec![e.to_diagnostic()],
            entry: String::new(),
            code: String::new(),
            hash: String::new(),
        }),
    }
}
