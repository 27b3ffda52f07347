//! Module resolution and loading from the project tree.
//!
//! Follows node's lookup rules: relative specifiers are tried as a file
//! (exact, `.js`, `.json`) and then as a directory (`package.json`, `index`);
//! bare specifiers are looked up in `node_modules` directories from the
//! referrer upward. A package's string `browser` field wins over `main`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::BundleError;

/// Node built-ins that resolve to an empty module in browser builds.
const EMPTY_BUILTINS: &[&str] = &[
    "fs",
    "path",
    "child_process",
    "module",
    "net",
    "tls",
    "dgram",
    "cluster",
    "readline",
    "repl",
];

/// Where a specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// Bundled as an empty module.
    Empty,
}

#[derive(Deserialize)]
struct PackageJson {
    browser: Option<serde_json::Value>,
    main: Option<String>,
}

/// Resolves `specifier` as required from the module at `referrer`.
pub fn resolve(specifier: &str, referrer: &Path) -> Result<Resolution, BundleError> {
    let unresolved = || BundleError::Unresolved {
        specifier: specifier.to_string(),
        referrer: referrer.to_path_buf(),
    };
    let dir = referrer.parent().unwrap_or_else(|| Path::new(""));

    if is_path_specifier(specifier) {
        let base = normalize(&dir.join(specifier));
        return load_path(&base)?
            .map(Resolution::File)
            .ok_or_else(unresolved);
    }

    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    if EMPTY_BUILTINS.contains(&bare) {
        return Ok(Resolution::Empty);
    }

    for ancestor in dir.ancestors() {
        if ancestor.file_name().is_some_and(|name| name == "node_modules") {
            continue;
        }
        let candidate = ancestor.join("node_modules").join(specifier);
        if let Some(path) = load_path(&candidate)? {
            return Ok(Resolution::File(normalize(&path)));
        }
    }
    Err(unresolved())
}

/// Reads a module source.
pub fn read_module(path: &Path) -> Result<String, BundleError> {
    fs::read_to_string(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

fn load_path(base: &Path) -> Result<Option<PathBuf>, BundleError> {
    if let Some(file) = load_as_file(base) {
        return Ok(Some(file));
    }
    load_as_directory(base)
}

fn load_as_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    ["js", "json"].iter().find_map(|ext| {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        candidate.is_file().then_some(candidate)
    })
}

fn load_as_directory(dir: &Path) -> Result<Option<PathBuf>, BundleError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let manifest_path = dir.join("package.json");
    if manifest_path.is_file() {
        let text = read_module(&manifest_path)?;
        let manifest: PackageJson =
            serde_json::from_str(&text).map_err(|err| BundleError::PackageJson {
                path: manifest_path.clone(),
                message: err.to_string(),
            })?;
        let browser = match manifest.browser {
            Some(serde_json::Value::String(browser)) => Some(browser),
            _ => None,
        };
        if let Some(main) = browser.or(manifest.main) {
            let target = normalize(&dir.join(main));
            if let Some(file) = load_as_file(&target) {
                return Ok(Some(file));
            }
            let index = target.join("index");
            if let Some(file) = load_as_file(&index) {
                return Ok(Some(file));
            }
        }
    }
    Ok(load_as_file(&dir.join("index")))
}

/// Lexically removes `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_relative_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/app.js", "");
        write(root, "src/core/main.js", "");
        write(root, "src/data.json", "{}");
        write(root, "src/util/index.js", "");

        let referrer = root.join("src/app.js");
        assert_eq!(
            resolve("./core/main", &referrer).unwrap(),
            Resolution::File(root.join("src/core/main.js"))
        );
        assert_eq!(
            resolve("./data.json", &referrer).unwrap(),
            Resolution::File(root.join("src/data.json"))
        );
        assert_eq!(
            resolve("./util", &referrer).unwrap(),
            Resolution::File(root.join("src/util/index.js"))
        );
        assert_eq!(
            resolve("../app", &root.join("src/core/main.js")).unwrap(),
            Resolution::File(root.join("src/app.js"))
        );
    }

    #[test]
    fn test_node_modules_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/core/a.js", "");
        write(root, "node_modules/lib/package.json", r#"{"main": "dist/lib.js"}"#);
        write(root, "node_modules/lib/dist/lib.js", "");
        write(
            root,
            "node_modules/web/package.json",
            r#"{"main": "node.js", "browser": "browser.js"}"#,
        );
        write(root, "node_modules/web/browser.js", "");
        write(root, "node_modules/web/node.js", "");

        let referrer = root.join("src/core/a.js");
        assert_eq!(
            resolve("lib", &referrer).unwrap(),
            Resolution::File(root.join("node_modules/lib/dist/lib.js"))
        );
        assert_eq!(
            resolve("web", &referrer).unwrap(),
            Resolution::File(root.join("node_modules/web/browser.js"))
        );
    }

    #[test]
    fn test_builtins_are_empty() {
        let referrer = Path::new("/nowhere/src/a.js");
        assert_eq!(resolve("fs", referrer).unwrap(), Resolution::Empty);
        assert_eq!(resolve("node:path", referrer).unwrap(), Resolution::Empty);
    }

    #[test]
    fn test_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let referrer = dir.path().join("a.js");
        let err = resolve("./missing", &referrer).unwrap_err();
        assert!(
            matches!(err, BundleError::Unresolved { specifier, .. } if specifier == "./missing")
        );
        assert!(matches!(
            resolve("left-pad", &referrer),
            Err(BundleError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/p/src/core/../../docs/./a.json")),
            Path::new("/p/docs/a.json")
        );
    }
}
