//! Standalone pack emission.
//!
//! The output is a UMD wrapper around a CommonJS pack: a module table keyed by
//! numeric id, each entry holding the module function and its dependency map,
//! plus the prelude that loads it. Module functions take
//! `(require, module, exports)`; a `require` whose specifier is missing from
//! the dependency map falls back to an outer `require`, if any, and otherwise
//! throws `MODULE_NOT_FOUND`.

use std::collections::BTreeMap;

use serde_json::Value;

use super::graph::{ModuleGraph, ModuleKey};
use crate::error::BundleError;
use crate::syntax::is_identifier;

const PRELUDE: &str = r#"(function(){function r(e,n,t){function o(i,f){if(!n[i]){if(!e[i]){var c="function"==typeof require&&require;if(!f&&c)return c(i,!0);if(u)return u(i,!0);var a=new Error("Cannot find module '"+i+"'");throw a.code="MODULE_NOT_FOUND",a}var p=n[i]={exports:{}};e[i][0].call(p.exports,function(r){var n=e[i][1][r];return o(n||r)},p,p.exports,r,e,n,t)}return n[i].exports}for(var u="function"==typeof require&&require,i=0;i<t.length;i++)o(t[i]);return o}return r})()"#;

fn umd_head(standalone_name: &str) -> String {
    format!(
        r#"(function(f){{if(typeof exports==="object"&&typeof module!=="undefined"){{module.exports=f()}}else if(typeof define==="function"&&define.amd){{define([],f)}}else{{var g;if(typeof window!=="undefined"){{g=window}}else if(typeof global!=="undefined"){{g=global}}else if(typeof self!=="undefined"){{g=self}}else{{g=this}}g.{standalone_name} = f()}}}})(function(){{var define,module,exports;return "#
    )
}

/// Module ids, assigned from 1 in key order.
pub fn module_ids(graph: &ModuleGraph) -> BTreeMap<ModuleKey, usize> {
    graph
        .modules()
        .enumerate()
        .map(|(index, record)| (record.key.clone(), index + 1))
        .collect()
}

/// Renders the pack as a sequence of chunks, calling `emit` for each in order.
pub fn emit_chunks(
    graph: &ModuleGraph,
    standalone_name: &str,
    mut emit: impl FnMut(String) -> Result<(), BundleError>,
) -> Result<(), BundleError> {
    if !is_identifier(standalone_name) {
        return Err(BundleError::InvalidStandaloneName(
            standalone_name.to_string(),
        ));
    }
    let ids = module_ids(graph);
    let entry_id = ids
        .get(graph.entry())
        .copied()
        .ok_or_else(|| BundleError::Worker("entry module missing from graph".to_string()))?;

    emit(format!("{}{PRELUDE}({{", umd_head(standalone_name)))?;
    for (index, record) in graph.modules().enumerate() {
        let deps: serde_json::Map<String, Value> = record
            .deps
            .iter()
            .filter_map(|(specifier, key)| {
                ids.get(key)
                    .map(|id| (specifier.clone(), Value::from(*id)))
            })
            .collect();
        let separator = if index == 0 { "" } else { "," };
        emit(format!(
            "{separator}{}:[function(require,module,exports){{\n{}\n}},{}]",
            index + 1,
            record.source,
            Value::Object(deps)
        ))?;
    }
    emit(format!("}},{{}},[{entry_id}])({entry_id})\n}});\n"))
}
