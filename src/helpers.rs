//! Transformer helper prelude.
//!
//! Lowering newer syntax (object spread, async functions, class fields,
//! private members) makes the transformer call helpers on a `babelHelpers`
//! global. The artifact must run without that global, so the emitter
//! prepends the definitions the table actually references, plus whatever
//! those helpers call in turn.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::{BundleError, Result};
use crate::table::ModuleTable;

pub const HELPERS_GLOBAL: &str = "babelHelpers";

lazy_static! {
    static ref HELPER_REF_RE: Regex =
        Regex::new(r"\bbabelHelpers\.([A-Za-z_$][A-Za-z0-9_$]*)").unwrap();
}

struct Helper {
    name: &'static str,
    requires: &'static [&'static str],
    source: &'static str,
}

/// Ordered so that emitting in table order is deterministic.
const HELPERS: &[Helper] = &[
    Helper {
        name: "toPrimitive",
        requires: &[],
        source: r#"function _toPrimitive(t, r) {
    if ("object" != typeof t || !t) return t;
    var e = t[Symbol.toPrimitive];
    if (void 0 !== e) {
      var i = e.call(t, r || "default");
      if ("object" != typeof i) return i;
      throw new TypeError("@@toPrimitive must return a primitive value.");
    }
    return ("string" === r ? String : Number)(t);
  }"#,
    },
    Helper {
        name: "toPropertyKey",
        requires: &["toPrimitive"],
        source: r#"function _toPropertyKey(t) {
    var i = _toPrimitive(t, "string");
    return "symbol" == typeof i ? i : i + "";
  }"#,
    },
    Helper {
        name: "defineProperty",
        requires: &["toPropertyKey"],
        source: r#"function _defineProperty(e, r, t) {
    r = _toPropertyKey(r);
    if (r in e) {
      Object.defineProperty(e, r, { value: t, enumerable: true, configurable: true, writable: true });
    } else {
      e[r] = t;
    }
    return e;
  }"#,
    },
    Helper {
        name: "ownKeys",
        requires: &[],
        source: r#"function _ownKeys(e, r) {
    var t = Object.keys(e);
    if (Object.getOwnPropertySymbols) {
      var o = Object.getOwnPropertySymbols(e);
      if (r) o = o.filter(function (k) { return Object.getOwnPropertyDescriptor(e, k).enumerable; });
      t.push.apply(t, o);
    }
    return t;
  }"#,
    },
    Helper {
        name: "objectSpread2",
        requires: &["ownKeys", "defineProperty"],
        source: r#"function _objectSpread2(e) {
    for (var r = 1; r < arguments.length; r++) {
      var t = null != arguments[r] ? arguments[r] : {};
      if (r % 2) {
        _ownKeys(Object(t), true).forEach(function (k) { _defineProperty(e, k, t[k]); });
      } else if (Object.getOwnPropertyDescriptors) {
        Object.defineProperties(e, Object.getOwnPropertyDescriptors(t));
      } else {
        _ownKeys(Object(t)).forEach(function (k) {
          Object.defineProperty(e, k, Object.getOwnPropertyDescriptor(t, k));
        });
      }
    }
    return e;
  }"#,
    },
    Helper {
        name: "extends",
        requires: &[],
        source: r#"function _extends() {
    _extends = Object.assign ? Object.assign.bind() : function (n) {
      for (var e = 1; e < arguments.length; e++) {
        var t = arguments[e];
        for (var r in t) if ({}.hasOwnProperty.call(t, r)) n[r] = t[r];
      }
      return n;
    };
    return _extends.apply(null, arguments);
  }"#,
    },
    Helper {
        name: "objectWithoutPropertiesLoose",
        requires: &[],
        source: r#"function _objectWithoutPropertiesLoose(r, e) {
    if (null == r) return {};
    var t = {};
    for (var n in r) {
      if ({}.hasOwnProperty.call(r, n)) {
        if (e.indexOf(n) !== -1) continue;
        t[n] = r[n];
      }
    }
    return t;
  }"#,
    },
    Helper {
        name: "objectWithoutProperties",
        requires: &["objectWithoutPropertiesLoose"],
        source: r#"function _objectWithoutProperties(e, t) {
    if (null == e) return {};
    var o, r, i = _objectWithoutPropertiesLoose(e, t);
    if (Object.getOwnPropertySymbols) {
      var n = Object.getOwnPropertySymbols(e);
      for (r = 0; r < n.length; r++) {
        o = n[r];
        if (t.indexOf(o) !== -1) continue;
        if ({}.propertyIsEnumerable.call(e, o)) i[o] = e[o];
      }
    }
    return i;
  }"#,
    },
    Helper {
        name: "objectDestructuringEmpty",
        requires: &[],
        source: r#"function _objectDestructuringEmpty(t) {
    if (null == t) throw new TypeError("Cannot destructure " + t);
  }"#,
    },
    Helper {
        name: "asyncGeneratorStep",
        requires: &[],
        source: r#"function _asyncGeneratorStep(n, t, e, r, o, a, c) {
    try {
      var i = n[a](c), u = i.value;
    } catch (err) {
      e(err);
      return;
    }
    if (i.done) t(u); else Promise.resolve(u).then(r, o);
  }"#,
    },
    Helper {
        name: "asyncToGenerator",
        requires: &["asyncGeneratorStep"],
        source: r#"function _asyncToGenerator(n) {
    return function () {
      var t = this, e = arguments;
      return new Promise(function (r, o) {
        var a = n.apply(t, e);
        function _next(v) { _asyncGeneratorStep(a, r, o, _next, _throw, "next", v); }
        function _throw(v) { _asyncGeneratorStep(a, r, o, _next, _throw, "throw", v); }
        _next(void 0);
      });
    };
  }"#,
    },
    Helper {
        name: "checkPrivateRedeclaration",
        requires: &[],
        source: r#"function _checkPrivateRedeclaration(e, t) {
    if (t.has(e)) throw new TypeError("Cannot initialize the same private elements twice on an object");
  }"#,
    },
    Helper {
        name: "classPrivateFieldInitSpec",
        requires: &["checkPrivateRedeclaration"],
        source: r#"function _classPrivateFieldInitSpec(e, t, a) {
    _checkPrivateRedeclaration(e, t);
    t.set(e, a);
  }"#,
    },
    Helper {
        name: "classPrivateMethodInitSpec",
        requires: &["checkPrivateRedeclaration"],
        source: r#"function _classPrivateMethodInitSpec(e, a) {
    _checkPrivateRedeclaration(e, a);
    a.add(e);
  }"#,
    },
    Helper {
        name: "assertClassBrand",
        requires: &[],
        source: r#"function _assertClassBrand(e, t, n) {
    if ("function" == typeof e ? e === t : e.has(t)) return arguments.length < 3 ? t : n;
    throw new TypeError("Private element is not present on this object");
  }"#,
    },
    Helper {
        name: "classPrivateFieldGet2",
        requires: &["assertClassBrand"],
        source: r#"function _classPrivateFieldGet2(s, a) {
    return s.get(_assertClassBrand(s, a));
  }"#,
    },
    Helper {
        name: "classPrivateFieldSet2",
        requires: &["assertClassBrand"],
        source: r#"function _classPrivateFieldSet2(s, a, r) {
    s.set(_assertClassBrand(s, a), r);
    return r;
  }"#,
    },
];

fn lookup(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().find(|h| h.name == name)
}

/// Helper names referenced by `code`, in first-seen order.
pub fn referenced_helpers(code: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    HELPER_REF_RE
        .captures_iter(code)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Definitions of every helper used by `table`, or `None` when no module
/// needs one. Fails on a helper this crate has no definition for.
pub fn helper_prelude(table: &ModuleTable) -> Result<Option<String>> {
    let mut needed: BTreeSet<&'static str> = BTreeSet::new();
    let mut pending: Vec<&'static Helper> = Vec::new();

    for record in table.records() {
        for name in referenced_helpers(&record.code) {
            let helper = lookup(&name).ok_or_else(|| BundleError::Emission {
                module: record.id.to_string(),
                reason: format!("no definition for transform helper {}.{}", HELPERS_GLOBAL, name),
            })?;
            pending.push(helper);
        }
    }

    while let Some(helper) = pending.pop() {
        if needed.insert(helper.name) {
            pending.extend(helper.requires.iter().filter_map(|r| lookup(r)));
        }
    }

    if needed.is_empty() {
        return Ok(None);
    }

    let used: Vec<&Helper> = HELPERS.iter().filter(|h| needed.contains(h.name)).collect();
    let mut out = format!("var {} = (function () {{\n", HELPERS_GLOBAL);
    for helper in &used {
        out.push_str("  ");
        out.push_str(helper.source);
        out.push('\n');
    }
    let members: Vec<String> = used
        .iter()
        .map(|h| format!("{}: _{}", h.name, h.name))
        .collect();
    out.push_str(&format!("  return {{ {} }};\n}})();\n", members.join(", ")));
    Ok(Some(out))
}
