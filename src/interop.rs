//! ESM → CommonJS rewriting.
//!
//! Module bodies in the bundle talk to each other only through the injected
//! `require`/`exports` bindings, so every `import`/`export` statement is
//! rewritten into plain statements:
//!
//! - `import a, { b as c } from "x"` binds a namespace var from `require("x")`
//!   and every reference to `a`/`c` is rewritten to a member access on it, so
//!   imported bindings stay live.
//! - Named exports become getters on `exports`, defined before the body runs.
//! - `export default <expr>` becomes an assignment to `exports.default`.
//!
//! Rewrites are collected as `(start, end, text)` span replacements over the
//! printed source and applied back to front.

use lazy_static::lazy_static;
use oxc_ast::ast::{
    BindingPattern, CallExpression, Declaration, ExportDefaultDeclarationKind, Expression,
    IdentifierReference, ImportDeclarationSpecifier, ModuleExportName, ObjectProperty, Program,
    Statement,
};
use oxc_ast_visit::Visit;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::GetSpan;
use oxc_syntax::symbol::SymbolId;
use regex::Regex;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap();
    static ref NON_IDENT_CHAR_RE: Regex = Regex::new(r"[^A-Za-z0-9_$]").unwrap();
}

const INTEROP_DEFAULT_HELPER: &str =
    "function _interopDefault(m) { return m && m.__esModule ? m : { default: m }; }";

/// Rewrites the module syntax of `program` into CommonJS. `program` must
/// have been parsed from `program.source_text`.
pub fn rewrite_to_commonjs<'a>(program: &'a Program<'a>) -> String {
    let source = program.source_text;
    let semantic = SemanticBuilder::new().build(program).semantic;
    let scoping = semantic.scoping();

    let mut names = NameAllocator::new(source);
    let mut replacements: Vec<(u32, u32, String)> = Vec::new();
    let mut header: Vec<String> = Vec::new();
    let mut bindings: HashMap<SymbolId, String> = HashMap::new();
    let mut needs_interop = false;
    let mut has_esm = false;
    let mut has_exports = false;

    if let Some(hashbang) = &program.hashbang {
        replacements.push((hashbang.span.start, hashbang.span.end, String::new()));
    }

    // Imports first: an `export { x }` may precede the `import x` it names.
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        has_esm = true;
        if decl.import_kind.is_type() {
            replacements.push((decl.span.start, decl.span.end, String::new()));
            continue;
        }

        let specifier = js_string(&decl.source.value);
        let specifiers = match &decl.specifiers {
            Some(s) if !s.is_empty() => s,
            _ => {
                replacements.push((
                    decl.span.start,
                    decl.span.end,
                    format!("require({});", specifier),
                ));
                continue;
            }
        };

        let ns = names.fresh(&decl.source.value);
        let mut text = format!("var {} = require({});", ns, specifier);
        let mut default_ns: Option<String> = None;

        for spec in specifiers {
            match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    if let Some(symbol) = s.local.symbol_id.get() {
                        bindings.insert(symbol, member(&ns, &s.imported.name()));
                    }
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    let wrapped = default_ns.get_or_insert_with(|| {
                        let name = names.fresh(&format!("{}Default", &ns[1..]));
                        text.push_str(&format!(" var {} = _interopDefault({});", name, ns));
                        name
                    });
                    needs_interop = true;
                    if let Some(symbol) = s.local.symbol_id.get() {
                        bindings.insert(symbol, member(wrapped, "default"));
                    }
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    if let Some(symbol) = s.local.symbol_id.get() {
                        bindings.insert(symbol, ns.clone());
                    }
                }
            }
        }

        replacements.push((decl.span.start, decl.span.end, text));
    }

    let mut live = LiveBindingRewriter {
        scoping,
        bindings: &bindings,
        replacements: Vec::new(),
    };

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(_) => {}

            Statement::ExportNamedDeclaration(decl) => {
                has_esm = true;
                if decl.export_kind.is_type() {
                    replacements.push((decl.span.start, decl.span.end, String::new()));
                    continue;
                }
                has_exports = true;

                if let Some(declaration) = &decl.declaration {
                    let mut exported = Vec::new();
                    match declaration {
                        Declaration::VariableDeclaration(var) => {
                            for d in &var.declarations {
                                collect_binding_names(&d.id, &mut exported);
                            }
                        }
                        Declaration::FunctionDeclaration(func) => {
                            if let Some(id) = &func.id {
                                exported.push(id.name.to_string());
                            }
                        }
                        Declaration::ClassDeclaration(class) => {
                            if let Some(id) = &class.id {
                                exported.push(id.name.to_string());
                            }
                        }
                        _ => {
                            // Type-level declarations have no runtime value.
                            replacements.push((decl.span.start, decl.span.end, String::new()));
                            continue;
                        }
                    }
                    replacements.push((decl.span.start, declaration.span().start, String::new()));
                    for name in exported {
                        header.push(define_export(&name, &name));
                    }
                    live.visit_declaration(declaration);
                } else if let Some(source) = &decl.source {
                    let ns = names.fresh(&source.value);
                    replacements.push((
                        decl.span.start,
                        decl.span.end,
                        format!("var {} = require({});", ns, js_string(&source.value)),
                    ));
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        header.push(define_export(
                            &spec.exported.name(),
                            &member(&ns, &spec.local.name()),
                        ));
                    }
                } else {
                    replacements.push((decl.span.start, decl.span.end, String::new()));
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        let value = match &spec.local {
                            ModuleExportName::IdentifierReference(ident) => live
                                .target_of(ident)
                                .cloned()
                                .unwrap_or_else(|| ident.name.to_string()),
                            other => other.name().to_string(),
                        };
                        header.push(define_export(&spec.exported.name(), &value));
                    }
                }
            }

            Statement::ExportDefaultDeclaration(decl) => {
                has_esm = true;
                has_exports = true;
                let inner = decl.declaration.span();
                match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func)
                        if func.id.is_some() =>
                    {
                        let name = func.id.as_ref().map(|id| id.name.to_string());
                        replacements.push((decl.span.start, inner.start, String::new()));
                        if let Some(name) = name {
                            header.push(format!("exports.default = {};", name));
                        }
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class)
                        if class.id.is_some() =>
                    {
                        let name = class.id.as_ref().map(|id| id.name.to_string());
                        replacements.push((decl.span.start, inner.start, String::new()));
                        if let Some(name) = name {
                            replacements.push((
                                decl.span.end,
                                decl.span.end,
                                format!("\nexports.default = {};", name),
                            ));
                        }
                    }
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        replacements.push((decl.span.start, decl.span.end, String::new()));
                        continue;
                    }
                    ExportDefaultDeclarationKind::FunctionDeclaration(_)
                    | ExportDefaultDeclarationKind::ClassDeclaration(_) => {
                        replacements.push((
                            decl.span.start,
                            inner.start,
                            "exports.default = ".to_string(),
                        ));
                        replacements.push((decl.span.end, decl.span.end, ";".to_string()));
                    }
                    _ => {
                        replacements.push((
                            decl.span.start,
                            inner.start,
                            "exports.default = ".to_string(),
                        ));
                    }
                }
                live.visit_export_default_declaration_kind(&decl.declaration);
            }

            Statement::ExportAllDeclaration(decl) => {
                has_esm = true;
                if decl.export_kind.is_type() {
                    replacements.push((decl.span.start, decl.span.end, String::new()));
                    continue;
                }
                has_exports = true;
                let ns = names.fresh(&decl.source.value);
                let mut text = format!("var {} = require({});", ns, js_string(&decl.source.value));
                match &decl.exported {
                    Some(exported) => header.push(define_export(&exported.name(), &ns)),
                    None => text.push_str(&star_reexport(&ns)),
                }
                replacements.push((decl.span.start, decl.span.end, text));
            }

            other => live.visit_statement(other),
        }
    }

    replacements.extend(live.replacements);
    let body = apply_replacements(source, replacements);

    if !has_esm {
        return body;
    }

    let mut out = String::from("\"use strict\";\n");
    if has_exports {
        out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    }
    if needs_interop {
        out.push_str(INTEROP_DEFAULT_HELPER);
        out.push('\n');
    }
    for line in header {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(body.trim_start());
    out
}

/// Rewrites references to imported bindings into member accesses on the
/// namespace var that holds the required module.
struct LiveBindingRewriter<'s> {
    scoping: &'s Scoping,
    bindings: &'s HashMap<SymbolId, String>,
    replacements: Vec<(u32, u32, String)>,
}

impl<'s> LiveBindingRewriter<'s> {
    fn target_of(&self, ident: &IdentifierReference) -> Option<&'s String> {
        let reference = ident.reference_id.get()?;
        let symbol = self.scoping.get_reference(reference).symbol_id()?;
        self.bindings.get(&symbol)
    }
}

impl<'a, 's> Visit<'a> for LiveBindingRewriter<'s> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(target) = self.target_of(ident) {
            self.replacements
                .push((ident.span.start, ident.span.end, target.clone()));
        }
    }

    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        // `add(1, 2)` must not pick up the namespace as `this`.
        if let Expression::Identifier(ident) = &expr.callee {
            if let Some(target) = self.target_of(ident) {
                self.replacements.push((
                    ident.span.start,
                    ident.span.end,
                    format!("(0, {})", target),
                ));
                for arg in &expr.arguments {
                    self.visit_argument(arg);
                }
                return;
            }
        }
        oxc_ast_visit::walk::walk_call_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(target) = self.target_of(ident) {
                    self.replacements.push((
                        prop.span.start,
                        prop.span.end,
                        format!("{}: {}", ident.name, target),
                    ));
                    return;
                }
            }
        }
        oxc_ast_visit::walk::walk_object_property(self, prop);
    }
}

/// Hands out namespace var names that do not collide with any identifier
/// already present in the module text.
struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    fn new(source: &str) -> Self {
        let taken = IDENT_RE
            .find_iter(source)
            .map(|m| m.as_str().to_string())
            .collect();
        Self { taken }
    }

    fn fresh(&mut self, hint: &str) -> String {
        let base = binding_base(hint);
        let mut candidate = format!("_{}", base);
        let mut n = 1;
        while self.taken.contains(&candidate) {
            n += 1;
            candidate = format!("_{}{}", base, n);
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// `"./lib/add-one.js"` -> `add_one`
fn binding_base(specifier: &str) -> String {
    let file = specifier
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    let stem = file.split('.').next().unwrap_or("");
    let cleaned = NON_IDENT_CHAR_RE.replace_all(stem, "_").to_string();
    if cleaned.is_empty() {
        "module".to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("m{}", cleaned)
    } else {
        cleaned
    }
}

fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_binding_names(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, names),
    }
}

pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn is_identifier_name(name: &str) -> bool {
    IDENT_RE
        .find(name)
        .map_or(false, |m| m.start() == 0 && m.end() == name.len())
}

fn member(object: &str, property: &str) -> String {
    if is_identifier_name(property) {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, js_string(property))
    }
}

fn define_export(name: &str, value: &str) -> String {
    format!(
        "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {}; }} }});",
        js_string(name),
        value
    )
}

fn star_reexport(ns: &str) -> String {
    format!(
        "\nObject.keys({ns}).forEach(function (key) {{\n  if (key === \"default\" || key === \"__esModule\" || Object.prototype.hasOwnProperty.call(exports, key)) return;\n  Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return {ns}[key]; }} }});\n}});",
        ns = ns
    )
}

fn apply_replacements(source: &str, mut replacements: Vec<(u32, u32, String)>) -> String {
    replacements.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    let mut result = source.to_string();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }
    result
}
