//! The dependency graph reachable from the entry module.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, warn};
use serde_json::Value;

use super::loader::{normalize, read_module, resolve, Resolution};
use super::BundleRequest;
use crate::error::BundleError;
use crate::syntax::ParsedScript;
use crate::transform::TransformPipeline;

/// Identity of a bundled module. Sorting keys gives the module id order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleKey {
    /// The shared stand-in for ignored modules and empty built-ins.
    Empty,
    File(PathBuf),
}

impl ModuleKey {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ModuleKey::Empty => None,
            ModuleKey::File(path) => Some(path),
        }
    }
}

/// A transformed module and the modules its `require` calls point at.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub key: ModuleKey,
    /// CommonJS source after transforms and global injection.
    pub source: String,
    /// Specifier to target. Excluded specifiers are absent.
    pub deps: BTreeMap<String, ModuleKey>,
}

#[derive(Debug, Clone)]
pub struct ModuleGraph {
    entry: ModuleKey,
    modules: BTreeMap<ModuleKey, ModuleRecord>,
    unused_exclusions: Vec<String>,
}

impl ModuleGraph {
    /// Loads, transforms and links every module reachable from the entry.
    pub fn build(request: &BundleRequest, pipeline: &TransformPipeline) -> Result<Self, BundleError> {
        let entry = ModuleKey::File(normalize(&request.entry));
        let mut modules = BTreeMap::new();
        let mut used_exclusions = BTreeSet::new();
        let mut queue = VecDeque::from([entry.clone()]);

        while let Some(key) = queue.pop_front() {
            if modules.contains_key(&key) {
                continue;
            }
            let record = match &key {
                ModuleKey::Empty => ModuleRecord {
                    key: key.clone(),
                    source: String::new(),
                    deps: BTreeMap::new(),
                },
                ModuleKey::File(path) => {
                    let record = load_record(path, request, pipeline, &mut used_exclusions)?;
                    queue.extend(record.deps.values().cloned());
                    record
                }
            };
            modules.insert(key, record);
        }

        let unused_exclusions: Vec<String> = request
            .exclude_paths
            .iter()
            .filter(|path| !used_exclusions.contains(path.as_str()))
            .cloned()
            .collect();
        for path in &unused_exclusions {
            warn!("Excluded path `{path}` is not referenced by any bundled module");
        }

        Ok(Self {
            entry,
            modules,
            unused_exclusions,
        })
    }

    pub fn entry(&self) -> &ModuleKey {
        &self.entry
    }

    /// Modules in id order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, key: &ModuleKey) -> Option<&ModuleRecord> {
        self.modules.get(key)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.modules
            .contains_key(&ModuleKey::File(normalize(path)))
    }

    /// Excluded specifiers that no bundled module requires.
    pub fn unused_exclusions(&self) -> &[String] {
        &self.unused_exclusions
    }
}

fn load_record(
    path: &Path,
    request: &BundleRequest,
    pipeline: &TransformPipeline,
    used_exclusions: &mut BTreeSet<String>,
) -> Result<ModuleRecord, BundleError> {
    debug!("Bundling {}", path.display());
    let raw = read_module(path)?;
    let code = pipeline.apply(path, &raw)?;
    let script = ParsedScript::parse(path, &code).map_err(|source| BundleError::Scan {
        module: path.to_path_buf(),
        source,
    })?;
    let calls = script.require_calls();
    let code = inject_globals(&script, &request.global_injections).unwrap_or(code);

    let mut deps = BTreeMap::new();
    for call in calls {
        let specifier = call.specifier;
        if deps.contains_key(&specifier) {
            continue;
        }
        if request.exclude_paths.contains(&specifier) {
            used_exclusions.insert(specifier);
            continue;
        }
        let target = if request.ignore_modules.contains(&specifier) {
            ModuleKey::Empty
        } else {
            match resolve(&specifier, path)? {
                Resolution::File(file) => ModuleKey::File(file),
                Resolution::Empty => ModuleKey::Empty,
            }
        };
        deps.insert(specifier, target);
    }

    Ok(ModuleRecord {
        key: ModuleKey::File(path.to_path_buf()),
        source: code,
        deps,
    })
}

/// Binds each injected global the module references as a free identifier.
/// Returns `None` when the module reads none of them.
fn inject_globals(script: &ParsedScript, globals: &BTreeMap<String, Value>) -> Option<String> {
    let injected: Vec<_> = globals
        .iter()
        .filter(|(name, _)| script.references_free(name))
        .collect();
    if injected.is_empty() {
        return None;
    }
    Some(format!(
        "(function ({}){{\n{}\n}}).call(this,{})",
        injected.iter().map(|(name, _)| name).join(","),
        script.text(),
        injected.iter().map(|(_, value)| value).join(",")
    ))
}
