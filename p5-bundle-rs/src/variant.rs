//! Build variants and the configuration each one resolves to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;
use serde_json::Value;

use crate::error::VariantError;
use crate::settings::LibraryLayout;
use crate::transform::TransformOptions;

/// One of the four distributable builds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BuildVariant {
    #[default]
    Standard,
    Minified,
    Test,
    Dev,
}

impl BuildVariant {
    pub const ALL: [BuildVariant; 4] = [
        BuildVariant::Standard,
        BuildVariant::Minified,
        BuildVariant::Test,
        BuildVariant::Dev,
    ];

    /// The task parameter selecting this variant (`None` for the standard build).
    pub fn param(self) -> Option<&'static str> {
        match self {
            BuildVariant::Standard => None,
            BuildVariant::Minified => Some("min"),
            BuildVariant::Test => Some("test"),
            BuildVariant::Dev => Some("dev"),
        }
    }

    pub fn is_minified(self) -> bool {
        self == BuildVariant::Minified
    }

    pub fn output_filename(self, lib: &str) -> String {
        match self {
            BuildVariant::Minified => format!("{lib}.pre-min.js"),
            BuildVariant::Test => format!("{lib}-test.js"),
            BuildVariant::Standard | BuildVariant::Dev => format!("{lib}.js"),
        }
    }
}

impl FromStr for BuildVariant {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(BuildVariant::Minified),
            "test" => Ok(BuildVariant::Test),
            "dev" => Ok(BuildVariant::Dev),
            other => Err(VariantError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildVariant::Standard => "standard",
            BuildVariant::Minified => "min",
            BuildVariant::Test => "test",
            BuildVariant::Dev => "dev",
        };
        f.write_str(name)
    }
}

/// How an unrecognized task parameter is treated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum VariantPolicy {
    /// Unknown parameters are a configuration error.
    #[default]
    Strict,
    /// Unknown parameters fall back to the standard build.
    Lenient,
}

impl VariantPolicy {
    /// Maps the task parameter to a variant. An absent or blank parameter
    /// selects the standard build.
    pub fn resolve(self, param: Option<&str>) -> Result<BuildVariant, VariantError> {
        let param = match param.map(str::trim) {
            None | Some("") => return Ok(BuildVariant::Standard),
            Some(param) => param,
        };
        match (param.parse::<BuildVariant>(), self) {
            (Ok(variant), _) => Ok(variant),
            (Err(err), VariantPolicy::Strict) => Err(err),
            (Err(_), VariantPolicy::Lenient) => {
                warn!("Unknown build variant `{param}`, building the standard bundle");
                Ok(BuildVariant::Standard)
            }
        }
    }
}

/// Everything downstream stages need to know about one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub variant: BuildVariant,
    pub output_filename: String,
    /// Output path relative to the project root, e.g. `lib/p5.js`.
    pub output_path: PathBuf,
    /// Globals bound inside modules that reference them.
    pub global_injections: BTreeMap<String, Value>,
    pub exclude_paths: Vec<String>,
    pub ignore_modules: Vec<String>,
    pub transform_options: TransformOptions,
}

impl BuildConfig {
    pub fn resolve(variant: BuildVariant, layout: &LibraryLayout) -> Self {
        let output_filename = variant.output_filename(&layout.name);
        let output_path = layout.out_dir.join(&output_filename);

        let mut global_injections = BTreeMap::new();
        if variant == BuildVariant::Dev {
            global_injections.insert(layout.dev_marker.clone(), Value::Bool(true));
        }

        let mut exclude_paths = Vec::new();
        let mut ignore_modules = Vec::new();
        if variant.is_minified() {
            exclude_paths.extend(layout.minified_exclusions.iter().cloned());
            ignore_modules.extend(layout.minified_ignores.iter().cloned());
        }
        if variant != BuildVariant::Dev {
            exclude_paths.push(layout.dev_translations.clone());
        }

        let transform_options = TransformOptions {
            plugins: layout.base_plugins.clone(),
            env_name: (variant == BuildVariant::Test).then(|| layout.test_env.clone()),
        };

        Self {
            variant,
            output_filename,
            output_path,
            global_injections,
            exclude_paths,
            ignore_modules,
            transform_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::Path;

    #[rstest]
    #[case(None, BuildVariant::Standard)]
    #[case(Some(""), BuildVariant::Standard)]
    #[case(Some("min"), BuildVariant::Minified)]
    #[case(Some("test"), BuildVariant::Test)]
    #[case(Some("dev"), BuildVariant::Dev)]
    fn test_resolve_known_params(#[case] param: Option<&str>, #[case] expected: BuildVariant) {
        assert_eq!(VariantPolicy::Strict.resolve(param).unwrap(), expected);
        assert_eq!(VariantPolicy::Lenient.resolve(param).unwrap(), expected);
    }

    #[test]
    fn test_unknown_param() {
        assert_eq!(
            VariantPolicy::Strict.resolve(Some("mni")),
            Err(VariantError::Unknown("mni".to_string()))
        );
        assert_eq!(
            VariantPolicy::Lenient.resolve(Some("mni")),
            Ok(BuildVariant::Standard)
        );
    }

    #[rstest]
    #[case(BuildVariant::Standard, "lib/p5.js")]
    #[case(BuildVariant::Minified, "lib/p5.pre-min.js")]
    #[case(BuildVariant::Test, "lib/p5-test.js")]
    #[case(BuildVariant::Dev, "lib/p5.js")]
    fn test_output_path(#[case] variant: BuildVariant, #[case] expected: &str) {
        let layout = LibraryLayout::p5();
        let first = BuildConfig::resolve(variant, &layout);
        let second = BuildConfig::resolve(variant, &layout);
        assert_eq!(first.output_path, Path::new(expected));
        assert_eq!(first, second);
    }

    #[test]
    fn test_only_dev_injects_globals() {
        let layout = LibraryLayout::p5();
        for variant in BuildVariant::ALL {
            let config = BuildConfig::resolve(variant, &layout);
            if variant == BuildVariant::Dev {
                assert_eq!(config.global_injections.len(), 1);
                assert_eq!(
                    config.global_injections.get("P5_DEV_BUILD"),
                    Some(&Value::Bool(true))
                );
            } else {
                assert!(config.global_injections.is_empty());
            }
        }
    }

    #[test]
    fn test_exclusions_per_variant() {
        let layout = LibraryLayout::p5();
        let dev_translations = "../../translations/dev".to_string();

        let standard = BuildConfig::resolve(BuildVariant::Standard, &layout);
        assert_eq!(standard.exclude_paths, vec![dev_translations.clone()]);
        assert!(standard.ignore_modules.is_empty());

        let min = BuildConfig::resolve(BuildVariant::Minified, &layout);
        for path in [
            "../../docs/reference/data.json",
            "../../../docs/parameterData.json",
            "../../translations",
            "./browser_errors",
        ] {
            assert!(min.exclude_paths.contains(&path.to_string()));
        }
        assert!(min.exclude_paths.contains(&dev_translations));
        assert_eq!(
            min.ignore_modules,
            vec!["i18next", "i18next-browser-languagedetector"]
        );

        let dev = BuildConfig::resolve(BuildVariant::Dev, &layout);
        assert!(dev.exclude_paths.is_empty());
        assert!(dev.ignore_modules.is_empty());
    }

    #[test]
    fn test_only_test_variant_sets_env() {
        let layout = LibraryLayout::p5();
        for variant in BuildVariant::ALL {
            let options = BuildConfig::resolve(variant, &layout).transform_options;
            assert_eq!(options.plugins, vec!["static-fs"]);
            let expected = (variant == BuildVariant::Test).then(|| "test".to_string());
            assert_eq!(options.env_name, expected);
        }
    }
}
