//! Parse and downlevel module sources through oxc.
//!
//! `parse` and `downlevel` are the whole contract with the external
//! toolchain: everything else in the crate works on the `Program` these
//! functions hand back or on the text they print.

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_codegen::Codegen;
use oxc_parser::{ParseOptions, Parser};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{HelperLoaderMode, JsxRuntime, TransformOptions, Transformer};
use std::fmt::Display;
use std::path::Path;
use tracing::trace;

use crate::error::{BundleError, Result};
use crate::table::ModuleId;

/// Source type from the module's extension. Unknown extensions are read as
/// ES modules.
pub fn source_type_for(id: &ModuleId) -> SourceType {
    SourceType::from_path(id.as_str()).unwrap_or_else(|_| SourceType::mjs())
}

/// Parses `source` and fails with a syntax error naming `id` on any
/// diagnostic. Scripts (`.cjs`) may `return` at the top level, as they can
/// inside the loader's module wrapper.
pub fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    source_type: SourceType,
    id: &ModuleId,
) -> Result<Program<'a>> {
    let options = ParseOptions {
        allow_return_outside_function: !source_type.is_module(),
        ..ParseOptions::default()
    };
    let ret = Parser::new(allocator, source, source_type)
        .with_options(options)
        .parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(syntax_error(id, &ret.errors));
    }
    Ok(ret.program)
}

/// Transformer options for a target profile (`es2015` .. `esnext`).
///
/// JSX compiles to `React.createElement` and helpers are referenced through
/// a global `babelHelpers`, so the transformer never injects imports of its
/// own into the graph.
pub fn transform_options(target: &str) -> Result<TransformOptions> {
    let mut options = TransformOptions::from_target(target)
        .map_err(|e| BundleError::Config(format!("unknown target \"{}\": {}", target, e)))?;
    options.jsx.runtime = JsxRuntime::Classic;
    options.helper_loader.mode = HelperLoaderMode::External;
    Ok(options)
}

/// Parses, strips types, lowers syntax to `options`' profile and prints the
/// result. Module syntax (`import`/`export`) is left in place.
pub fn downlevel(source: &str, id: &ModuleId, options: &TransformOptions) -> Result<String> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, source, source_type_for(id), id)?;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let ret = Transformer::new(&allocator, Path::new(id.as_str()), options)
        .build_with_scoping(scoping, &mut program);
    if !ret.errors.is_empty() {
        return Err(syntax_error(id, &ret.errors));
    }

    let code = Codegen::new().build(&program).code;
    trace!(module = %id, bytes = code.len(), "downleveled");
    Ok(code)
}

fn syntax_error<E: Display>(id: &ModuleId, errors: &[E]) -> BundleError {
    let message = if errors.is_empty() {
        "parser aborted".to_string()
    } else {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    };
    BundleError::Syntax {
        path: id.to_string(),
        message,
    }
}
