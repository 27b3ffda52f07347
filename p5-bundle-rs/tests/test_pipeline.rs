use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use p5_bundle_rs::error::{BuildError, BundleError, FormatError, TransformError};
use p5_bundle_rs::format::{CodeFormatter, FormatOptions};
use p5_bundle_rs::transform::{SourceTransform, StaticFs, TransformContext, TransformRegistry};
use p5_bundle_rs::{
    BuildPipeline, BuildVariant, BundleRequest, BundleSettings, CompletionSignal, GraphBundler,
    LibraryLayout, VariantPolicy,
};
use tempfile::TempDir;

const FORMATTED_MARKER: &str = "\n// formatted\n";
const BANNER: &str = "/*! p5.js v1.4.0 October 17, 2026 */\n";

/// Appends a marker instead of running prettier.
struct FakeFormatter;

impl CodeFormatter for FakeFormatter {
    fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError> {
        assert_eq!(*options, FormatOptions::bundle());
        Ok(format!("{code}{FORMATTED_MARKER}"))
    }
}

/// Records the environment each module is transformed with, then inlines files.
#[derive(Default)]
struct RecordingStaticFs {
    envs: Mutex<Vec<Option<String>>>,
}

impl SourceTransform for RecordingStaticFs {
    fn name(&self) -> &str {
        "static-fs"
    }

    fn transform(&self, source: String, cx: &TransformContext<'_>) -> Result<String, TransformError> {
        self.envs
            .lock()
            .unwrap()
            .push(cx.env_name.map(str::to_string));
        StaticFs.transform(source, cx)
    }
}

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mini-p5")
}

/// A scratch copy of the fixture project, so builds can write `lib/`.
fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("p5");
    dircpy::copy_dir(fixture_dir(), &root).unwrap();
    (dir, root)
}

fn pipeline(root: &Path) -> BuildPipeline {
    let settings = BundleSettings::from_project(root, LibraryLayout::p5()).unwrap();
    BuildPipeline::new(settings)
        .with_formatter(Arc::new(FakeFormatter))
        .with_build_date(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap())
}

const MARKERS: [&str; 6] = [
    "REFERENCE_DATA_MARKER",
    "PARAMETER_DATA_MARKER",
    "TRANSLATIONS_MARKER",
    "BROWSER_ERRORS_MARKER",
    "I18NEXT_MARKER",
    "LANGUAGE_DETECTOR_MARKER",
];

#[rustfmt::skip]
mod test_variants {
    use crate::*;
    use futures::executor::block_on;

    #[rstest]
    #[case(None, "lib/p5.js")]
    #[case(Some("min"), "lib/p5.pre-min.js")]
    #[case(Some("test"), "lib/p5-test.js")]
    #[case(Some("dev"), "lib/p5.js")]
    fn test_output_location(#[case] param: Option<&str>, #[case] expected: &str) {
        let (_dir, root) = project();
        let artifact = block_on(pipeline(&root).run(param)).unwrap();

        assert_eq!(artifact.path, root.join(expected));
        assert_eq!(artifact.created_message(), format!(">> Bundle {expected} created."));
        let written = fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(written, artifact.content);
        assert!(written.starts_with(BANNER));
        assert!(written.contains("g.p5 = f()"));
        assert!(!written.contains("function(require,module,exports)"));
        assert!(written.contains("function(_dereq_,module,exports)"));
    }

    #[test]
    fn test_standard_build() {
        let (_dir, root) = project();
        let code = block_on(pipeline(&root).run(None)).unwrap().content;

        assert!(code.ends_with(FORMATTED_MARKER));
        for marker in MARKERS {
            assert!(code.contains(marker), "missing {marker}");
        }
        // Development translations stay out, their require is left unbundled.
        assert!(!code.contains("DEV_TRANSLATIONS_MARKER"));
        assert!(code.contains("_dereq_('../../translations/dev')"));
        assert!(!code.contains("(function (P5_DEV_BUILD)"));
        assert!(code.contains("gl_Position = vec4(aPosition, 1.0);"));
    }

    #[test]
    fn test_minified_build() {
        let (_dir, root) = project();
        let code = block_on(pipeline(&root).run(Some("min"))).unwrap().content;

        assert!(!code.contains(FORMATTED_MARKER));
        for marker in MARKERS {
            assert!(!code.contains(marker), "unexpected {marker}");
        }
        assert!(!code.contains("DEV_TRANSLATIONS_MARKER"));
        assert!(code.contains("_dereq_('./browser_errors')"));
        assert!(code.contains("\"i18next\":1"));
        assert!(!code.contains("(function (P5_DEV_BUILD)"));
    }

    #[test]
    fn test_dev_build() {
        let (_dir, root) = project();
        let code = block_on(pipeline(&root).run(Some("dev"))).unwrap().content;

        assert!(code.ends_with(FORMATTED_MARKER));
        assert!(code.contains("(function (P5_DEV_BUILD){"));
        assert!(code.contains("}).call(this,true)"));
        assert!(code.contains("DEV_TRANSLATIONS_MARKER"));
        for marker in MARKERS {
            assert!(code.contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn test_test_build_sets_env() {
        let (_dir, root) = project();
        let recorder = Arc::new(RecordingStaticFs::default());
        let mut registry = TransformRegistry::with_builtins();
        registry.register(recorder.clone());

        let artifact = block_on(
            pipeline(&root)
                .with_bundler(Arc::new(GraphBundler::new(registry)))
                .run(Some("test")),
        )
        .unwrap();

        assert!(artifact.content.ends_with(FORMATTED_MARKER));
        assert!(artifact.content.contains("gl_Position"));
        let envs = recorder.envs.lock().unwrap();
        assert!(!envs.is_empty());
        assert!(envs.iter().all(|env| env.as_deref() == Some("test")));
    }

    #[test]
    fn test_builds_are_deterministic() {
        let (_dir, root) = project();
        let pipeline = pipeline(&root);
        let first = block_on(pipeline.run(None)).unwrap().content;
        let second = block_on(pipeline.run(None)).unwrap().content;
        assert_eq!(first, second);
    }

    #[test]
    fn test_marker() {} // Help IDE detect test module
}

#[rustfmt::skip]
mod test_graph {
    use crate::*;

    fn request(root: &Path, variant: BuildVariant) -> BundleRequest {
        let layout = LibraryLayout::p5();
        let config = p5_bundle_rs::BuildConfig::resolve(variant, &layout);
        BundleRequest::new(root.join(&layout.entry), "p5", &config)
    }

    #[rstest]
    fn test_no_unused_exclusions(
        #[values(BuildVariant::Standard, BuildVariant::Minified, BuildVariant::Test, BuildVariant::Dev)]
        variant: BuildVariant,
    ) {
        let root = fixture_dir();
        let graph = GraphBundler::default().graph(&request(&root, variant)).unwrap();
        assert!(graph.unused_exclusions().is_empty(), "{:?}", graph.unused_exclusions());
    }

    #[test]
    fn test_minified_graph_membership() {
        let root = fixture_dir();
        let graph = GraphBundler::default()
            .graph(&request(&root, BuildVariant::Minified))
            .unwrap();
        assert!(graph.contains_file(&root.join("src/core/main.js")));
        assert!(!graph.contains_file(&root.join("src/core/friendly_errors/browser_errors.js")));
        assert!(!graph.contains_file(&root.join("docs/reference/data.json")));
        assert!(!graph.contains_file(&root.join("translations/index.js")));
        assert!(!graph.contains_file(&root.join("node_modules/i18next/dist/cjs/i18next.js")));
    }

    #[test]
    fn test_unused_exclusion_is_reported() {
        let root = fixture_dir();
        let mut request = request(&root, BuildVariant::Standard);
        request.exclude_paths.push("./never-required".to_string());
        let graph = GraphBundler::default().graph(&request).unwrap();
        assert_eq!(graph.unused_exclusions(), ["./never-required"]);
    }

    #[test]
    fn test_marker() {} // Help IDE detect test module
}

#[rustfmt::skip]
mod test_failures {
    use crate::*;
    use futures::executor::block_on;

    #[test]
    fn test_unknown_variant() {
        let (_dir, root) = project();
        let err = block_on(pipeline(&root).run(Some("mni"))).unwrap_err();
        assert!(matches!(err, BuildError::Variant(_)));
        assert!(!root.join("lib").exists());
    }

    #[test]
    fn test_lenient_unknown_variant() {
        let (_dir, root) = project();
        let settings = BundleSettings::from_project(&root, LibraryLayout::p5())
            .unwrap()
            .with_variant_policy(VariantPolicy::Lenient);
        let artifact = block_on(
            BuildPipeline::new(settings)
                .with_formatter(Arc::new(FakeFormatter))
                .run(Some("mni")),
        )
        .unwrap();
        assert_eq!(artifact.path, root.join("lib/p5.js"));
    }

    #[test]
    fn test_unresolved_module_writes_nothing() {
        let (_dir, root) = project();
        let help = root.join("src/core/help.js");
        let mut source = fs::read_to_string(&help).unwrap();
        source.push_str("\nrequire('./missing');\n");
        fs::write(&help, source).unwrap();

        let err = block_on(pipeline(&root).run(None)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Bundle(BundleError::Unresolved { ref specifier, .. }) if specifier == "./missing"
        ));
        assert!(!root.join("lib").join("p5.js").exists());
    }

    #[test]
    fn test_completion_signal_reports_failure() {
        let (_dir, root) = project();
        let (signal, receiver) = CompletionSignal::new();
        block_on(pipeline(&root).run_task(Some("bogus"), signal));
        let outcome = block_on(receiver).unwrap();
        assert!(matches!(outcome, Err(BuildError::Variant(_))));
    }

    #[test]
    fn test_completion_signal_reports_success() {
        let (_dir, root) = project();
        let (signal, receiver) = CompletionSignal::new();
        block_on(pipeline(&root).run_task(Some("min"), signal));
        let artifact = block_on(receiver).unwrap().unwrap();
        assert!(artifact.path.ends_with("lib/p5.pre-min.js"));
    }

    #[test]
    fn test_marker() {} // Help IDE detect test module
}
