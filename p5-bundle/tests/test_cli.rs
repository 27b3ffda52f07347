// Allow deprecated APIs (assert_cmd::cargo_bin is deprecated but still works)
#![allow(deprecated)]

use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("p5-bundle-rs")
        .join("tests")
        .join("fixtures")
        .join("mini-p5")
}

fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("p5");
    dircpy::copy_dir(fixture_dir(), &root).unwrap();
    (dir, root)
}

fn p5_bundle() -> Command {
    Command::cargo_bin("p5-bundle").unwrap()
}

#[rustfmt::skip]
mod test_args {
    use crate::*;

    #[test]
    fn test_help() {
        p5_bundle()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--formatter"))
            .stdout(predicate::str::contains("--lenient-variant"));
    }

    #[test]
    fn test_unknown_variant() {
        let (_dir, root) = project();
        p5_bundle()
            .arg("mni")
            .arg("--root").arg(&root)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown build variant `mni`"));
        assert!(!root.join("lib").exists());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        p5_bundle()
            .arg("--root").arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("package.json"));
    }

    #[test]
    fn test_invalid_name() {
        let (_dir, root) = project();
        p5_bundle()
            .args(["min", "--name", "not-an-identifier"])
            .arg("--root").arg(&root)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid identifier"));
    }

    #[test]
    fn test_marker() {} // Help IDE detect test module
}

#[rustfmt::skip]
mod test_build {
    use crate::*;

    #[test]
    fn test_min_build_skips_formatter() {
        let (_dir, root) = project();
        // A formatter that cannot run proves minified builds never invoke it.
        p5_bundle()
            .args(["min", "--formatter", "p5-bundle-missing-formatter"])
            .arg("--root").arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains(">> Bundle lib/p5.pre-min.js created."));

        let code = fs::read_to_string(root.join("lib").join("p5.pre-min.js")).unwrap();
        assert!(code.starts_with("/*! p5.js v1.4.0 "));
        assert!(code.contains("function(_dereq_,module,exports)"));
    }

    #[test]
    fn test_version_override() {
        let (_dir, root) = project();
        p5_bundle()
            .args(["min", "--version-override", "9.9.9"])
            .arg("--root").arg(&root)
            .assert()
            .success();
        let code = fs::read_to_string(root.join("lib").join("p5.pre-min.js")).unwrap();
        assert!(code.starts_with("/*! p5.js v9.9.9 "));
    }

    #[cfg(unix)]
    #[rstest]
    #[case(None, "lib/p5.js")]
    #[case(Some("test"), "lib/p5-test.js")]
    #[case(Some("dev"), "lib/p5.js")]
    fn test_formatted_builds(#[case] variant: Option<&str>, #[case] expected: &str) {
        let (_dir, root) = project();
        let mut cmd = p5_bundle();
        cmd.args(variant);
        // `sh -c cat` echoes stdin and ignores the prettier flags.
        cmd.args(["--formatter", "sh -c cat"])
            .arg("--root").arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!(">> Bundle {expected} created.")));
        assert!(root.join(expected).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_formatter_failure_writes_nothing() {
        let (_dir, root) = project();
        p5_bundle()
            .args(["--formatter", "sh -c false"])
            .arg("--root").arg(&root)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Bundle build failed"));
        assert!(!root.join("lib").join("p5.js").exists());
    }

    #[test]
    fn test_lenient_variant() {
        let (_dir, root) = project();
        p5_bundle()
            .args(["mni", "--lenient-variant", "--formatter", "p5-bundle-missing-formatter"])
            .arg("--root").arg(&root)
            .assert()
            .failure();
        // The fallback is the standard build, which does run the formatter.
        assert!(!root.join("lib").join("p5.pre-min.js").exists());
    }

    #[test]
    fn test_marker() {} // Help IDE detect test module
}
