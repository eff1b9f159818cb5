//! Dependency Graph Builder
//!
//! Walks the import graph from the entry and produces the [`ModuleTable`].
//!
//! ## Invariants
//!
//! 1. **Claim before work**: an identity is added to the visited set when it
//!    is first discovered, before its own imports are looked at. A→B→A stops
//!    at the second A; A→A stops immediately.
//! 2. **One transform per identity**: only the owner of the visited set hands
//!    out work, so no module is read, parsed or transformed twice, however
//!    many modules import it.
//! 3. **All or nothing**: the first failure aborts the build. There is no
//!    partially built table to emit.
//!
//! The walk uses an explicit stack rather than recursion, so termination does
//! not depend on call-stack depth.

use oxc_allocator::Allocator;
use oxc_span::SourceType;
use oxc_transformer::TransformOptions;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::config::BundleOptions;
use crate::error::{BundleError, Result};
use crate::imports::{extract_imports, ImportRecord};
use crate::interop::rewrite_to_commonjs;
use crate::resolve::Resolver;
use crate::source::SourceProvider;
use crate::table::{ModuleId, ModuleRecord, ModuleTable};
use crate::transform::{self, source_type_for, transform_options};

/// Result of one build: the entry identity and every module reachable from it.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    pub entry: ModuleId,
    pub table: ModuleTable,
}

pub struct GraphBuilder<'s> {
    source: &'s dyn SourceProvider,
    resolver: Resolver<'s>,
    target: String,
    parallel: bool,
}

impl<'s> GraphBuilder<'s> {
    pub fn new(source: &'s dyn SourceProvider, options: &BundleOptions) -> Self {
        Self {
            source,
            resolver: Resolver::new(source),
            target: options.target.clone(),
            parallel: options.parallel,
        }
    }

    pub fn build(&self, entry: &str) -> Result<ModuleGraph> {
        let entry = self.resolver.resolve_entry(entry)?;
        let table = if self.parallel {
            self.build_waves(&entry)?
        } else {
            self.build_depth_first(&entry)?
        };
        info!(entry = %entry, modules = table.len(), "module graph built");
        Ok(ModuleGraph { entry, table })
    }

    /// Depth-first, pre-order. Dependencies are pushed in reverse so the
    /// first import of a module is processed first.
    fn build_depth_first(&self, entry: &ModuleId) -> Result<ModuleTable> {
        let options = transform_options(&self.target)?;
        let mut table = ModuleTable::new();
        let mut visited: HashSet<ModuleId> = HashSet::new();
        let mut stack = vec![entry.clone()];
        visited.insert(entry.clone());

        while let Some(id) = stack.pop() {
            let (record, imports) = process_module(self.source, &self.resolver, &id, &options)?;
            for import in imports.iter().rev() {
                if visited.insert(import.id.clone()) {
                    stack.push(import.id.clone());
                }
            }
            table.insert(record);
        }

        Ok(table)
    }

    /// Breadth-first waves. Every module of a wave is processed in parallel;
    /// newly discovered identities are claimed between waves on this thread
    /// only.
    fn build_waves(&self, entry: &ModuleId) -> Result<ModuleTable> {
        // Fail on a bad target before any worker starts.
        transform_options(&self.target)?;

        let mut table = ModuleTable::new();
        let mut visited: HashSet<ModuleId> = HashSet::new();
        let mut frontier = vec![entry.clone()];
        visited.insert(entry.clone());

        while !frontier.is_empty() {
            debug!(size = frontier.len(), "processing wave");
            let results: Vec<Result<(ModuleRecord, Vec<ImportRecord>)>> = frontier
                .par_iter()
                .map(|id| {
                    let options = transform_options(&self.target)?;
                    process_module(self.source, &self.resolver, id, &options)
                })
                .collect();

            let mut next = Vec::new();
            for result in results {
                let (record, imports) = result?;
                for import in imports {
                    if visited.insert(import.id.clone()) {
                        next.push(import.id);
                    }
                }
                table.insert(record);
            }
            frontier = next;
        }

        Ok(table)
    }
}

/// Builds the graph for `options.entry` from `source`.
pub fn build_graph(source: &dyn SourceProvider, options: &BundleOptions) -> Result<ModuleGraph> {
    options.validate()?;
    GraphBuilder::new(source, options).build(&options.entry)
}

/// read → downlevel → parse → extract → rewrite for a single module.
fn process_module(
    source: &dyn SourceProvider,
    resolver: &Resolver,
    id: &ModuleId,
    options: &TransformOptions,
) -> Result<(ModuleRecord, Vec<ImportRecord>)> {
    let text = source.read(id).map_err(|e| BundleError::Io {
        path: id.to_string(),
        source: e,
    })?;

    let downleveled = transform::downlevel(&text, id, options)?;

    let allocator = Allocator::default();
    let source_type = if source_type_for(id).is_module() {
        SourceType::mjs()
    } else {
        SourceType::cjs()
    };
    let program = transform::parse(&allocator, &downleveled, source_type, id)?;

    let imports = extract_imports(&program, id, resolver)?;
    let code = rewrite_to_commonjs(&program);

    let deps: BTreeMap<String, ModuleId> = imports
        .iter()
        .map(|i| (i.specifier.clone(), i.id.clone()))
        .collect();

    debug!(module = %id, deps = deps.len(), "module processed");
    Ok((ModuleRecord::new(id.clone(), deps, code), imports))
}
