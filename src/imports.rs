//! AST Import Extractor
//!
//! Collects the static module specifiers of a parsed module, in source
//! order, and resolves each one. Anything that loads a module by a value only
//! known at runtime is rejected: a bundle that silently misses a dependency
//! is worse than no bundle.

use oxc_ast::ast::{
    Argument, CallExpression, Expression, IdentifierReference, ImportExpression, Program,
    Statement,
};
use oxc_ast_visit::Visit;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::GetSpan;
use std::collections::HashSet;

use crate::error::{BundleError, Result};
use crate::resolve::Resolver;
use crate::table::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import … from "x"` or `import "x"`
    Static,
    /// `export … from "x"`
    ReExport,
    /// `require("x")`
    Require,
}

/// A specifier found in the source, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    pub kind: ImportKind,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub id: ModuleId,
    pub kind: ImportKind,
}

/// Static imports of `program`, ordered by first appearance. A specifier
/// written several times is reported once.
pub fn scan_imports<'a>(
    program: &'a Program<'a>,
    importer: &ModuleId,
) -> Result<Vec<ImportRef>> {
    let mut refs = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if decl.import_kind.is_type() {
                    continue;
                }
                refs.push(ImportRef {
                    specifier: decl.source.value.to_string(),
                    kind: ImportKind::Static,
                    offset: decl.span.start,
                });
            }
            Statement::ExportNamedDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    continue;
                }
                if let Some(source) = &decl.source {
                    refs.push(ImportRef {
                        specifier: source.value.to_string(),
                        kind: ImportKind::ReExport,
                        offset: decl.span.start,
                    });
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    continue;
                }
                refs.push(ImportRef {
                    specifier: decl.source.value.to_string(),
                    kind: ImportKind::ReExport,
                    offset: decl.span.start,
                });
            }
            _ => {}
        }
    }

    let semantic = SemanticBuilder::new().build(program).semantic;
    let mut scanner = RuntimeLoadScanner::new(program.source_text, semantic.scoping());
    scanner.visit_program(program);
    if let Some(expression) = scanner.unsupported {
        return Err(BundleError::UnsupportedImport {
            path: importer.to_string(),
            expression,
        });
    }
    refs.extend(scanner.requires);

    refs.sort_by_key(|r| r.offset);
    let mut seen = HashSet::new();
    refs.retain(|r| seen.insert(r.specifier.clone()));
    Ok(refs)
}

/// Scans and resolves the imports of `program`, which lives at `importer`.
pub fn extract_imports<'a>(
    program: &'a Program<'a>,
    importer: &ModuleId,
    resolver: &Resolver,
) -> Result<Vec<ImportRecord>> {
    scan_imports(program, importer)?
        .into_iter()
        .map(|r| {
            let id = resolver.resolve(importer, &r.specifier)?;
            Ok(ImportRecord {
                specifier: r.specifier,
                id,
                kind: r.kind,
            })
        })
        .collect()
}

/// Finds `require("literal")` calls and anything that loads a module by a
/// computed value (`import(x)`, `require(x)`). Only the global `require`
/// counts; a parameter or local named `require` is an ordinary function.
struct RuntimeLoadScanner<'s> {
    source_text: &'s str,
    scoping: &'s Scoping,
    requires: Vec<ImportRef>,
    unsupported: Option<String>,
}

impl<'s> RuntimeLoadScanner<'s> {
    fn new(source_text: &'s str, scoping: &'s Scoping) -> Self {
        Self {
            source_text,
            scoping,
            requires: Vec::new(),
            unsupported: None,
        }
    }

    fn is_global_require(&self, ident: &IdentifierReference) -> bool {
        if ident.name != "require" {
            return false;
        }
        match ident.reference_id.get() {
            Some(reference) => self.scoping.get_reference(reference).symbol_id().is_none(),
            None => true,
        }
    }

    fn reject(&mut self, start: u32, end: u32) {
        if self.unsupported.is_none() {
            let text = self
                .source_text
                .get(start as usize..end as usize)
                .unwrap_or("<dynamic import>");
            self.unsupported = Some(text.to_string());
        }
    }
}

impl<'a, 's> Visit<'a> for RuntimeLoadScanner<'s> {
    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        self.reject(expr.span.start, expr.span.end);
        oxc_ast_visit::walk::walk_import_expression(self, expr);
    }

    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &expr.callee {
            if self.is_global_require(ident) {
                match (expr.arguments.len(), expr.arguments.first()) {
                    (1, Some(Argument::StringLiteral(lit))) => {
                        self.requires.push(ImportRef {
                            specifier: lit.value.to_string(),
                            kind: ImportKind::Require,
                            offset: expr.span().start,
                        });
                    }
                    _ => self.reject(expr.span.start, expr.span.end),
                }
            }
        }
        oxc_ast_visit::walk::walk_call_expression(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn scan(code: &str) -> Result<Vec<ImportRef>> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        assert!(ret.errors.is_empty());
        let importer = ModuleId::from_segments(&["src", "index.js"]);
        scan_imports(&ret.program, &importer)
    }

    fn specifiers(refs: &[ImportRef]) -> Vec<&str> {
        refs.iter().map(|r| r.specifier.as_str()).collect()
    }

    #[test]
    fn test_source_order_and_kinds() {
        let refs = scan(
            r#"
            import add from "./add.js";
            import { minus } from "./minus.js";
            export { times } from "./times.js";
            import "./side-effect.js";
            export * from "./all.js";
            const legacy = require("./legacy.js");
        "#,
        )
        .unwrap();
        assert_eq!(
            specifiers(&refs),
            vec![
                "./add.js",
                "./minus.js",
                "./times.js",
                "./side-effect.js",
                "./all.js",
                "./legacy.js"
            ]
        );
        assert_eq!(refs[2].kind, ImportKind::ReExport);
        assert_eq!(refs[5].kind, ImportKind::Require);
    }

    #[test]
    fn test_repeated_specifier_reported_once() {
        let refs = scan(
            r#"
            import a from "./a.js";
            import { b } from "./a.js";
        "#,
        )
        .unwrap();
        assert_eq!(specifiers(&refs), vec!["./a.js"]);
    }

    #[test]
    fn test_no_imports_is_empty() {
        assert!(scan("console.log('alone');").unwrap().is_empty());
    }

    #[test]
    fn test_dynamic_import_rejected() {
        let err = scan("export async function load() { return import('./lazy.js'); }")
            .unwrap_err();
        match err {
            BundleError::UnsupportedImport { path, expression } => {
                assert_eq!(path, "./src/index.js");
                assert!(expression.contains("import('./lazy.js')"));
            }
            other => panic!("expected unsupported import, got {:?}", other),
        }
    }

    #[test]
    fn test_computed_require_rejected() {
        let err = scan("const name = './x.js'; require(name);").unwrap_err();
        assert!(matches!(err, BundleError::UnsupportedImport { .. }));
    }

    #[test]
    fn test_local_require_is_not_a_module_load() {
        let refs = scan(
            r#"
            function make(require) { return require('x'); }
            const load = (require, name) => require(name);
            {
                const require = (n) => n;
                require('y');
            }
            const real = require('./real.js');
        "#,
        )
        .unwrap();
        assert_eq!(specifiers(&refs), vec!["./real.js"]);
    }

    #[test]
    fn test_extract_resolves_each_specifier() {
        let source = MemorySource::new()
            .with_file("src/index.js", "")
            .with_file("src/add.js", "")
            .with_file("src/lib/minus.js", "");
        let resolver = Resolver::new(&source);
        let allocator = Allocator::default();
        let code = "import add from './add';\nimport { minus } from './lib/../lib/minus.js';";
        let program = Parser::new(&allocator, code, SourceType::mjs()).parse().program;
        let importer = ModuleId::from_segments(&["src", "index.js"]);

        let records = extract_imports(&program, &importer, &resolver).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].specifier, "./add");
        assert_eq!(records[0].id.as_str(), "./src/add.js");
        assert_eq!(records[1].id.as_str(), "./src/lib/minus.js");
    }

    #[test]
    fn test_extract_fails_on_missing_module() {
        let source = MemorySource::new().with_file("src/index.js", "");
        let resolver = Resolver::new(&source);
        let allocator = Allocator::default();
        let program = Parser::new(&allocator, "import x from './gone.js';", SourceType::mjs())
            .parse()
            .program;
        let importer = ModuleId::from_segments(&["src", "index.js"]);
        let err = extract_imports(&program, &importer, &resolver).unwrap_err();
        assert!(matches!(err, BundleError::Resolution { ref specifier, .. } if specifier == "./gone.js"));
    }
}
