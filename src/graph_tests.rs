//! Graph Builder Tests
//!
//! Build invariants checked against in-memory projects:
//! - one record and one read per identity, cycles included
//! - every dependency target has a record
//! - sequential and parallel builds produce the same table
//! - each failure kind aborts with the module it belongs to

#[cfg(test)]
mod tests {
    use crate::config::BundleOptions;
    use crate::error::BundleError;
    use crate::graph::build_graph;
    use crate::source::{MemorySource, SourceProvider};
    use crate::table::ModuleId;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;

    fn add_minus_project() -> MemorySource {
        MemorySource::new()
            .with_file(
                "src/index.js",
                r#"import add from "./add.js";
import { minus } from "./minus.js";

const sum = add(1, 2);
const division = minus(2, 1);
console.log(sum);
console.log(division);
"#,
            )
            .with_file("src/add.js", "export default (a, b) => a + b;\n")
            .with_file("src/minus.js", "export const minus = (a, b) => a - b;\n")
    }

    fn options() -> BundleOptions {
        BundleOptions::new(".", "./src/index.js")
    }

    fn id(path: &str) -> ModuleId {
        ModuleId::new(path).unwrap()
    }

    /// Counts reads per module so tests can check one transform per identity.
    struct CountingSource {
        inner: MemorySource,
        reads: Mutex<HashMap<String, usize>>,
    }

    impl CountingSource {
        fn new(inner: MemorySource) -> Self {
            Self {
                inner,
                reads: Mutex::new(HashMap::new()),
            }
        }

        fn reads(&self, path: &str) -> usize {
            *self.reads.lock().unwrap().get(path).unwrap_or(&0)
        }
    }

    impl SourceProvider for CountingSource {
        fn is_file(&self, id: &ModuleId) -> bool {
            self.inner.is_file(id)
        }

        fn read(&self, id: &ModuleId) -> io::Result<String> {
            *self
                .reads
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_insert(0) += 1;
            self.inner.read(id)
        }
    }

    fn diamond() -> MemorySource {
        MemorySource::new()
            .with_file(
                "src/index.js",
                "import { b } from './b.js';\nimport { c } from './c.js';\nconsole.log(b + c);\n",
            )
            .with_file(
                "src/b.js",
                "import { shared } from './shared.js';\nexport const b = shared + 1;\n",
            )
            .with_file(
                "src/c.js",
                "import { shared } from './lib/../shared.js';\nexport const c = shared + 2;\n",
            )
            .with_file("src/shared.js", "export const shared = 10;\n")
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TABLE SHAPE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_add_minus_table() {
        let graph = build_graph(&add_minus_project(), &options()).unwrap();
        assert_eq!(graph.entry.as_str(), "./src/index.js");

        let ids: Vec<&str> = graph.table.ids().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["./src/add.js", "./src/index.js", "./src/minus.js"]);

        let index = graph.table.get_str("./src/index.js").unwrap();
        assert_eq!(index.deps.len(), 2);
        assert_eq!(index.deps["./add.js"], id("src/add.js"));
        assert_eq!(index.deps["./minus.js"], id("src/minus.js"));
        assert!(index.code.contains("require(\"./add.js\")"));
        assert!(!index.code.contains("import "));

        let add = graph.table.get_str("./src/add.js").unwrap();
        assert!(add.deps.is_empty());
        assert!(add.code.contains("exports.default ="));

        let minus = graph.table.get_str("./src/minus.js").unwrap();
        assert!(minus.code.contains("\"minus\""));
    }

    #[test]
    fn test_diamond_reads_shared_module_once() {
        let source = CountingSource::new(diamond());
        let graph = build_graph(&source, &options()).unwrap();

        assert_eq!(graph.table.len(), 4);
        for path in ["./src/index.js", "./src/b.js", "./src/c.js", "./src/shared.js"] {
            assert_eq!(source.reads(path), 1, "{} read more than once", path);
        }
        let c = graph.table.get_str("./src/c.js").unwrap();
        assert_eq!(c.deps["./lib/../shared.js"], id("src/shared.js"));
    }

    #[test]
    fn test_parallel_diamond_reads_shared_module_once() {
        let source = CountingSource::new(diamond());
        let mut opts = options();
        opts.parallel = true;
        let graph = build_graph(&source, &opts).unwrap();
        assert_eq!(graph.table.len(), 4);
        assert_eq!(source.reads("./src/shared.js"), 1);
    }

    #[test]
    fn test_two_module_cycle_terminates() {
        let source = MemorySource::new()
            .with_file("a.js", "import { b } from './b.js';\nexport const a = 1;\n")
            .with_file("b.js", "import { a } from './a.js';\nexport const b = 2;\n");
        let graph = build_graph(&source, &BundleOptions::new(".", "a.js")).unwrap();
        assert_eq!(graph.table.len(), 2);
        assert_eq!(graph.table.get_str("./b.js").unwrap().deps["./a.js"], id("a.js"));
    }

    #[test]
    fn test_self_import_terminates() {
        let source = MemorySource::new()
            .with_file("a.js", "import * as self from './a.js';\nexport const x = 1;\n");
        let graph = build_graph(&source, &BundleOptions::new(".", "./a.js")).unwrap();
        assert_eq!(graph.table.len(), 1);
        assert_eq!(graph.table.get_str("./a.js").unwrap().deps["./a.js"], id("a.js"));
    }

    #[test]
    fn test_every_dependency_has_a_record() {
        let graph = build_graph(&diamond(), &options()).unwrap();
        assert!(graph.table.dangling_deps().is_empty());
    }

    #[test]
    fn test_builds_are_deterministic() {
        let first = build_graph(&diamond(), &options()).unwrap();
        let second = build_graph(&diamond(), &options()).unwrap();
        assert_eq!(first.table, second.table);

        let mut opts = options();
        opts.parallel = true;
        let parallel = build_graph(&diamond(), &opts).unwrap();
        assert_eq!(first.table, parallel.table);
    }

    #[test]
    fn test_import_free_entry_is_single_record() {
        let source = MemorySource::new().with_file("src/index.js", "console.log('alone');\n");
        let graph = build_graph(&source, &options()).unwrap();
        assert_eq!(graph.table.len(), 1);
        let record = graph.table.get_str("./src/index.js").unwrap();
        assert!(record.deps.is_empty());
        assert!(record.code.contains("console.log(\"alone\")"));
    }

    #[test]
    fn test_commonjs_entry_with_top_level_return() {
        let source = MemorySource::new()
            .with_file(
                "src/index.cjs",
                "const util = require('./util.cjs');\nif (!util.ready) return;\nconsole.log('ready');\n",
            )
            .with_file("src/util.cjs", "exports.ready = true;\n");
        let graph = build_graph(&source, &BundleOptions::new(".", "./src/index.cjs")).unwrap();
        assert_eq!(graph.table.len(), 2);
        let entry = graph.table.get_str("./src/index.cjs").unwrap();
        assert_eq!(entry.deps["./util.cjs"], id("src/util.cjs"));
        assert!(entry.code.contains("return;"));
    }

    #[test]
    fn test_local_require_binding_is_not_followed() {
        let source = MemorySource::new().with_file(
            "src/index.js",
            "function make(require) { return require('x'); }\nconsole.log(make((n) => n));\n",
        );
        let graph = build_graph(&source, &options()).unwrap();
        assert!(graph.table.get_str("./src/index.js").unwrap().deps.is_empty());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FAILURES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_missing_file_is_resolution_error() {
        let source = MemorySource::new()
            .with_file("src/index.js", "import x from './missing.js';\nconsole.log(x);\n");
        let err = build_graph(&source, &options()).unwrap_err();
        match err {
            BundleError::Resolution {
                specifier,
                importer,
                ..
            } => {
                assert_eq!(specifier, "./missing.js");
                assert_eq!(importer, "./src/index.js");
            }
            other => panic!("expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_entry_is_resolution_error() {
        let err = build_graph(&MemorySource::new(), &options()).unwrap_err();
        assert!(matches!(err, BundleError::Resolution { ref specifier, .. } if specifier == "./src/index.js"));
    }

    #[test]
    fn test_syntax_error_names_module() {
        let source = MemorySource::new()
            .with_file("src/index.js", "import './broken.js';\n")
            .with_file("src/broken.js", "export const = ;\n");
        let err = build_graph(&source, &options()).unwrap_err();
        assert_eq!(err.module(), Some("./src/broken.js"));
        assert_eq!(err.code(), crate::error::ERR_SYNTAX);
    }

    #[test]
    fn test_dynamic_import_is_rejected() {
        let source = MemorySource::new()
            .with_file("src/index.js", "const m = import('./lazy.js');\n")
            .with_file("src/lazy.js", "export const x = 1;\n");
        let err = build_graph(&source, &options()).unwrap_err();
        assert!(matches!(err, BundleError::UnsupportedImport { ref path, .. } if path == "./src/index.js"));
    }

    #[test]
    fn test_read_failure_is_io_error() {
        struct Unreadable;
        impl SourceProvider for Unreadable {
            fn is_file(&self, _: &ModuleId) -> bool {
                true
            }
            fn read(&self, _: &ModuleId) -> io::Result<String> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            }
        }
        let err = build_graph(&Unreadable, &options()).unwrap_err();
        assert!(matches!(err, BundleError::Io { ref path, .. } if path == "./src/index.js"));
    }

    #[test]
    fn test_typescript_and_extensionless_imports() {
        let source = MemorySource::new()
            .with_file(
                "src/index.ts",
                "import { twice } from './math';\nconst n: number = twice(2);\nconsole.log(n);\n",
            )
            .with_file(
                "src/math/index.ts",
                "export function twice(x: number): number { return x * 2; }\n",
            );
        let graph = build_graph(&source, &BundleOptions::new(".", "./src/index.ts")).unwrap();
        let entry = graph.table.get_str("./src/index.ts").unwrap();
        assert_eq!(entry.deps["./math"], id("src/math/index.ts"));
        let math = graph.table.get_str("./src/math/index.ts").unwrap();
        assert!(!math.code.contains(": number"));
    }

    #[test]
    fn test_unknown_target_fails_before_reading() {
        let source = CountingSource::new(add_minus_project());
        let mut opts = options();
        opts.target = "es1999".to_string();
        let err = build_graph(&source, &opts).unwrap_err();
        assert!(matches!(err, BundleError::Config(_)));
        assert_eq!(source.reads("./src/index.js"), 0);
    }
}
