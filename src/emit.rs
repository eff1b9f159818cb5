//! Bundle Emitter
//!
//! Serializes a [`ModuleTable`] into one self-executing script: the table
//! literal plus a small loader that runs the entry module once.
//!
//! Two record layouts are supported:
//!
//! - **closure** (default): `{ deps, factory: function (require, exports, module) { … } }`.
//!   Bodies are compiled once by the engine when the artifact loads.
//! - **eval**: `{ deps, code: "<string>" }`, evaluated on every execution.
//!   This is the layout of artifacts produced before the closure loader.
//!
//! When any module calls a transformer helper, the loader is wrapped in a
//! function scope that first defines `babelHelpers`.

use oxc_allocator::Allocator;
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{BundleOptions, LoaderFormat};
use crate::error::{BundleError, Result};
use crate::helpers::helper_prelude;
use crate::interop::js_string;
use crate::table::{ModuleId, ModuleRecord, ModuleTable};

/// The emitted bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub entry: ModuleId,
    pub code: String,
    /// Hex SHA-256 of `code`.
    pub hash: String,
    pub modules: usize,
}

impl Artifact {
    /// `bundle.<first 8 hash chars>.js`
    pub fn content_addressed_name(&self) -> String {
        format!("bundle.{}.js", self.hash.get(..8).unwrap_or(&self.hash))
    }
}

pub fn compute_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Wraps `table` in the loader selected by `options`. Pure: the same inputs
/// always produce the same text.
pub fn emit(entry: &ModuleId, table: &ModuleTable, options: &BundleOptions) -> Result<Artifact> {
    check_table(entry, table)?;
    let prelude = helper_prelude(table)?;

    let modules = match options.loader {
        LoaderFormat::Closure => closure_table(table)?,
        LoaderFormat::Eval => eval_table(table)?,
    };
    let template = match options.loader {
        LoaderFormat::Closure => CLOSURE_LOADER,
        LoaderFormat::Eval => EVAL_LOADER,
    };

    let loader = render_loader(template, options.runtime_cache, entry, &modules);
    // Helpers live in a scope shared by every factory and by `eval`.
    let code = match prelude {
        Some(prelude) => format!("(function () {{
{}{}}})();
", prelude, loader),
        None => loader,
    };

    let hash = compute_hash(&code);
    info!(
        entry = %entry,
        modules = table.len(),
        loader = ?options.loader,
        bytes = code.len(),
        "artifact emitted"
    );
    Ok(Artifact {
        entry: entry.clone(),
        code,
        hash,
        modules: table.len(),
    })
}

/// Fills the loader placeholders. The table text is spliced in last so that
/// module code is never scanned for placeholders.
fn render_loader(template: &str, use_cache: bool, entry: &ModuleId, modules: &str) -> String {
    let (head, tail) = template
        .split_once("__MODULES__")
        .expect("loader templates contain a __MODULES__ placeholder");
    let mut code = head.replace("__USE_CACHE__", if use_cache { "true" } else { "false" });
    code.push_str(modules);
    code.push_str(&tail.replace("__ENTRY__", &js_string(entry.as_str())));
    code
}

fn check_table(entry: &ModuleId, table: &ModuleTable) -> Result<()> {
    if !table.contains(entry) {
        return Err(BundleError::Emission {
            module: entry.to_string(),
            reason: "entry module is not in the module table".to_string(),
        });
    }
    if let Some((from, specifier, target)) = table.dangling_deps().into_iter().next() {
        return Err(BundleError::Emission {
            module: from.to_string(),
            reason: format!(
                "dependency \"{}\" points at {} which has no record",
                specifier, target
            ),
        });
    }
    Ok(())
}

/// A body embedded verbatim inside a function wrapper must be a complete
/// script on its own, or it could close the wrapper and leak into the table.
fn check_embeddable(record: &ModuleRecord) -> Result<()> {
    let allocator = Allocator::default();
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, &record.code, SourceType::cjs())
        .with_options(options)
        .parse();
    if ret.panicked || !ret.errors.is_empty() {
        let reason = ret
            .errors
            .first()
            .map(|e| format!("code does not parse as a standalone script: {}", e))
            .unwrap_or_else(|| "code does not parse as a standalone script".to_string());
        return Err(BundleError::Emission {
            module: record.id.to_string(),
            reason,
        });
    }
    Ok(())
}

fn deps_literal(record: &ModuleRecord) -> Result<String> {
    serde_json::to_string(&record.deps).map_err(|e| BundleError::Emission {
        module: record.id.to_string(),
        reason: e.to_string(),
    })
}

fn closure_table(table: &ModuleTable) -> Result<String> {
    let mut out = String::from("{\n");
    for record in table.records() {
        check_embeddable(record)?;
        out.push_str(&format!(
            "  {}: {{\n    deps: {},\n    factory: function (require, exports, module) {{\n{}\n    }}\n  }},\n",
            js_string(record.id.as_str()),
            deps_literal(record)?,
            record.code.trim_end()
        ));
        debug!(module = %record.id, "embedded as closure");
    }
    out.push('}');
    Ok(out)
}

#[derive(Serialize)]
struct EvalRecord<'a> {
    deps: &'a BTreeMap<String, ModuleId>,
    code: &'a str,
}

fn eval_table(table: &ModuleTable) -> Result<String> {
    let records: BTreeMap<&str, EvalRecord> = table
        .records()
        .map(|r| {
            (
                r.id.as_str(),
                EvalRecord {
                    deps: &r.deps,
                    code: &r.code,
                },
            )
        })
        .collect();
    let json = serde_json::to_string_pretty(&records).map_err(|e| BundleError::Emission {
        module: "<table>".to_string(),
        reason: e.to_string(),
    })?;
    Ok(escape_for_script(&json))
}

/// JSON is valid JavaScript except for raw line/paragraph separators in
/// older engines. `</` is escaped so the artifact can be inlined in HTML.
fn escape_for_script(json: &str) -> String {
    json.replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
        .replace("</", "<\\/")
}

const CLOSURE_LOADER: &str = r#"(function (modules, entry) {
  var useCache = __USE_CACHE__;
  var cache = {};
  var hasOwn = Object.prototype.hasOwnProperty;

  function load(id) {
    if (!hasOwn.call(modules, id)) {
      throw new Error("Unknown module: " + id);
    }
    if (useCache && hasOwn.call(cache, id)) {
      return cache[id].exports;
    }
    var record = modules[id];
    var deps = record.deps || {};
    var module = { id: id, exports: {} };
    if (useCache) cache[id] = module;

    function localRequire(specifier) {
      if (!hasOwn.call(deps, specifier)) {
        throw new Error("Unknown module: " + specifier + " (required from " + id + ")");
      }
      return load(deps[specifier]);
    }

    try {
      record.factory.call(module.exports, localRequire, module.exports, module);
    } catch (err) {
      if (useCache) delete cache[id];
      throw err;
    }
    return module.exports;
  }

  load(entry);
})(__MODULES__, __ENTRY__);
"#;

const EVAL_LOADER: &str = r#"(function (modules, entry) {
  var useCache = __USE_CACHE__;
  var cache = {};
  var hasOwn = Object.prototype.hasOwnProperty;

  function load(id) {
    if (!hasOwn.call(modules, id)) {
      throw new Error("Unknown module: " + id);
    }
    if (useCache && hasOwn.call(cache, id)) {
      return cache[id].exports;
    }
    var record = modules[id];
    var deps = record.deps || {};
    var module = { id: id, exports: {} };
    if (useCache) cache[id] = module;

    function localRequire(specifier) {
      if (!hasOwn.call(deps, specifier)) {
        throw new Error("Unknown module: " + specifier + " (required from " + id + ")");
      }
      return load(deps[specifier]);
    }

    try {
      (function (require, exports, module, code) {
        eval(code);
      })(localRequire, module.exports, module, record.code);
    } catch (err) {
      if (useCache) delete cache[id];
      throw err;
    }
    return module.exports;
  }

  load(entry);
})(__MODULES__, __ENTRY__);
"#;
