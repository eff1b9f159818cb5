//! Bundle configuration.
//!
//! Everything the builder and emitter need is passed in explicitly through
//! [`BundleOptions`]; there is no process-wide entry or output state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BundleError, Result};

pub const DEFAULT_ENTRY: &str = "./src/index.js";
pub const DEFAULT_OUTPUT: &str = "./dist/bundle.js";
pub const DEFAULT_TARGET: &str = "es2015";

/// How module bodies are embedded in the artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoaderFormat {
    /// Each module body is wrapped in a function value created once when the
    /// artifact loads. Records are `{ deps, factory }`.
    #[default]
    Closure,
    /// Each module body is stored as a string and run through `eval`.
    /// Records are `{ deps, code }`, the format older artifacts used.
    Eval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleOptions {
    /// Project root. Module identities are relative to it.
    pub root: PathBuf,
    /// Entry module, relative to `root`.
    pub entry: String,
    /// Where a caller should write the artifact. The library never writes it.
    pub output: String,
    /// Syntax profile passed to the transformer (`es2015` .. `esnext`).
    pub target: String,
    pub loader: LoaderFormat,
    /// Memoize module exports at runtime. `false` reproduces the legacy
    /// re-execute-on-every-require behavior.
    pub runtime_cache: bool,
    /// Process the module frontier in parallel waves.
    pub parallel: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            root: PathBuf::from("."),
            entry: DEFAULT_ENTRY.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
            target: DEFAULT_TARGET.to_string(),
            loader: LoaderFormat::default(),
            runtime_cache: true,
            parallel: false,
        }
    }
}

impl BundleOptions {
    pub fn new(root: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        BundleOptions {
            root: root.into(),
            entry: entry.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: BundleOptions = serde_json::from_str(json)
            .map_err(|e| BundleError::Config(format!("invalid options JSON: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// The legacy artifact: eval'd string bodies, no module cache.
    pub fn compat(mut self) -> Self {
        self.loader = LoaderFormat::Eval;
        self.runtime_cache = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.entry.trim().is_empty() {
            return Err(BundleError::Config("entry must not be empty".to_string()));
        }
        oxc_transformer::TransformOptions::from_target(&self.target)
            .map_err(|e| BundleError::Config(format!("unknown target \"{}\": {}", self.target, e)))?;
        Ok(())
    }
}
