//! Library layout and per-project settings.
//!
//! [`LibraryLayout`] captures everything about the bundled library that the
//! variant rules refer to: names, the entry module, the output directory and the
//! source paths that some variants leave out. [`BundleSettings`] adds the
//! project root and the version read from `package.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BuildError;
use crate::syntax::is_identifier;
use crate::variant::VariantPolicy;

/// Static description of the library being bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    /// Library name, used for output filenames and the banner.
    pub name: String,
    /// Entry module, relative to the project root.
    pub entry: PathBuf,
    /// Output directory, relative to the project root.
    pub out_dir: PathBuf,
    /// Global name the standalone bundle exports.
    pub standalone_name: String,
    /// Marker global injected into development builds.
    pub dev_marker: String,
    /// Specifiers removed from minified builds.
    pub minified_exclusions: Vec<String>,
    /// Development-only translations, removed from every non-dev build.
    pub dev_translations: String,
    /// Modules bundled as empty stubs in minified builds.
    pub minified_ignores: Vec<String>,
    /// Transform plugins applied to every module.
    pub base_plugins: Vec<String>,
    /// Transform environment selected by the test build.
    pub test_env: String,
}

impl LibraryLayout {
    /// The p5.js source layout.
    pub fn p5() -> Self {
        Self {
            name: "p5".to_string(),
            entry: PathBuf::from("src").join("app.js"),
            out_dir: PathBuf::from("lib"),
            standalone_name: "p5".to_string(),
            dev_marker: "P5_DEV_BUILD".to_string(),
            // These must match the specifiers used in the source exactly,
            // they are not relative to the project root.
            minified_exclusions: vec![
                "../../docs/reference/data.json".to_string(),
                "../../../docs/parameterData.json".to_string(),
                "../../translations".to_string(),
                "./browser_errors".to_string(),
            ],
            dev_translations: "../../translations/dev".to_string(),
            minified_ignores: vec![
                "i18next".to_string(),
                "i18next-browser-languagedetector".to_string(),
            ],
            base_plugins: vec!["static-fs".to_string()],
            test_env: "test".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::Config("library name is empty".to_string()));
        }
        if !is_identifier(&self.standalone_name) {
            return Err(BuildError::Config(format!(
                "standalone name `{}` is not a valid identifier",
                self.standalone_name
            )));
        }
        if !is_identifier(&self.dev_marker) {
            return Err(BuildError::Config(format!(
                "dev marker `{}` is not a valid identifier",
                self.dev_marker
            )));
        }
        Ok(())
    }
}

impl Default for LibraryLayout {
    fn default() -> Self {
        Self::p5()
    }
}

/// Settings for one project checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSettings {
    pub root: PathBuf,
    pub layout: LibraryLayout,
    pub version: String,
    pub variant_policy: VariantPolicy,
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

impl BundleSettings {
    pub fn new(root: impl Into<PathBuf>, layout: LibraryLayout, version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            layout,
            version: version.into(),
            variant_policy: VariantPolicy::default(),
        }
    }

    /// Builds settings for the project at `root`, reading the version from
    /// `<root>/package.json`.
    pub fn from_project(root: impl Into<PathBuf>, layout: LibraryLayout) -> Result<Self, BuildError> {
        let root = root.into();
        let version = read_package_version(&root)?;
        Ok(Self::new(root, layout, version))
    }

    pub fn with_variant_policy(mut self, policy: VariantPolicy) -> Self {
        self.variant_policy = policy;
        self
    }

    pub fn entry_path(&self) -> PathBuf {
        self.root.join(&self.layout.entry)
    }
}

/// Reads the `version` field of `<root>/package.json`.
pub fn read_package_version(root: &Path) -> Result<String, BuildError> {
    let path = root.join("package.json");
    let text = fs::read_to_string(&path).map_err(|err| BuildError::Manifest {
        path: path.clone(),
        message: err.to_string(),
    })?;
    let manifest: PackageManifest =
        serde_json::from_str(&text).map_err(|err| BuildError::Manifest {
            path: path.clone(),
            message: err.to_string(),
        })?;
    manifest.version.ok_or_else(|| BuildError::Manifest {
        path,
        message: "missing `version` field".to_string(),
    })
}
