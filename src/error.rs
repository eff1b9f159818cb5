//! Error taxonomy for the bundler.
//!
//! Every build-time failure is fatal: the build aborts and no artifact is
//! produced. Each variant carries a stable code so that callers (and the
//! Node-API bridge) can branch on the failure kind without string matching.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_RESOLUTION: &str = "E-RESOLVE";
pub const ERR_SYNTAX: &str = "E-SYNTAX";
pub const ERR_UNSUPPORTED_IMPORT: &str = "E-UNSUPPORTED-IMPORT";
pub const ERR_EMISSION: &str = "E-EMIT";
pub const ERR_IO: &str = "E-IO";
pub const ERR_CONFIG: &str = "E-CONFIG";
pub const ERR_UNKNOWN_MODULE: &str = "E-UNKNOWN-MODULE";
pub const ERR_RUNAWAY_REQUIRE: &str = "E-RUNAWAY-REQUIRE";
pub const ERR_MODULE_THREW: &str = "E-MODULE-THREW";

pub type Result<T> = std::result::Result<T, BundleError>;

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD-TIME ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum BundleError {
    /// A specifier could not be mapped to a module on disk.
    #[error("cannot resolve \"{specifier}\" imported from {importer}: {reason}")]
    Resolution {
        specifier: String,
        importer: String,
        reason: String,
    },

    /// Source text failed to parse (or the transformer rejected it).
    #[error("syntax error in {path}: {message}")]
    Syntax { path: String, message: String },

    /// Dynamic or computed module loading the static graph cannot capture.
    #[error("unsupported import in {path}: {expression}")]
    UnsupportedImport { path: String, expression: String },

    #[error("cannot emit module {module}: {reason}")]
    Emission { module: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BundleError {
    pub fn code(&self) -> &'static str {
        match self {
            BundleError::Resolution { .. } => ERR_RESOLUTION,
            BundleError::Syntax { .. } => ERR_SYNTAX,
            BundleError::UnsupportedImport { .. } => ERR_UNSUPPORTED_IMPORT,
            BundleError::Emission { .. } => ERR_EMISSION,
            BundleError::Io { .. } => ERR_IO,
            BundleError::Config(_) => ERR_CONFIG,
        }
    }

    /// The module path the failure is attributed to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            BundleError::Resolution { importer, .. } => Some(importer),
            BundleError::Syntax { path, .. } => Some(path),
            BundleError::UnsupportedImport { path, .. } => Some(path),
            BundleError::Emission { module, .. } => Some(module),
            BundleError::Io { path, .. } => Some(path),
            BundleError::Config(_) => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.code().to_string(),
            message: self.to_string(),
            module: self.module().map(str::to_string),
        }
    }
}

/// Serializable view of an error, handed across the Node-API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub module: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures raised by [`crate::runtime::ModuleRuntime`]. These mirror the
/// errors the embedded JavaScript loader throws.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The module table has no record for this identity. Not recoverable:
    /// the table is fixed at build time.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Without a module cache, a cyclic `require` chain re-executes forever.
    #[error("require depth exceeded {depth} while loading {module}")]
    RunawayRequire { module: String, depth: usize },

    /// A module body failed on its own terms.
    #[error("module {module} threw: {message}")]
    Thrown { module: String, message: String },
}

impl RuntimeError {
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::UnknownModule(_) => ERR_UNKNOWN_MODULE,
            RuntimeError::RunawayRequire { .. } => ERR_RUNAWAY_REQUIRE,
            RuntimeError::Thrown { .. } => ERR_MODULE_THREW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_diagnostic_names_importer() {
        let err = BundleError::Resolution {
            specifier: "./missing.js".to_string(),
            importer: "./src/index.js".to_string(),
            reason: "no such file".to_string(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, ERR_RESOLUTION);
        assert_eq!(diag.module.as_deref(), Some("./src/index.js"));
        assert!(diag.message.contains("./missing.js"));
    }

    #[test]
    fn test_config_error_has_no_module() {
        let err = BundleError::Config("bad target".to_string());
        assert_eq!(err.code(), ERR_CONFIG);
        assert!(err.module().is_none());
    }
}
