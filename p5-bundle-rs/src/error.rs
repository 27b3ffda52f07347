//! Error types for the bundling pipeline.
//!
//! Every failure is fatal to the current invocation: the pipeline never retries
//! and never writes an artifact after an error has been observed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using BuildError.
pub type BuildResult<T> = Result<T, BuildError>;

/// Top-level error surfaced to the host task runner.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Variant(#[from] VariantError),

    /// Invalid or incomplete library settings.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The project manifest could not be read or parsed.
    #[error("Failed to read package manifest {path:?}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Errors raised while turning the task parameter into a build variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    #[error("Unknown build variant `{0}` (expected one of: min, test, dev)")]
    Unknown(String),
}

/// Errors produced by the bundling service. These travel through the bundle
/// stream, so they must be `Send`.
#[derive(Debug, Error)]
pub enum BundleError {
    /// A module is referenced but is neither bundled, excluded nor ignored.
    #[error("Cannot find module '{specifier}' from {referrer:?}")]
    Unresolved { specifier: String, referrer: PathBuf },

    #[error("Failed to read module {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid package.json {path:?}: {message}")]
    PackageJson { path: PathBuf, message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Failed to parse module {module:?}: {source}")]
    Scan {
        module: PathBuf,
        #[source]
        source: ScanError,
    },

    /// The standalone export name cannot be used as a global identifier.
    #[error("Invalid standalone export name: `{0}`")]
    InvalidStandaloneName(String),

    /// The bundling worker stopped without finishing the stream.
    #[error("Bundler worker failed: {0}")]
    Worker(String),
}

/// Errors raised by source-transform plugins.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unknown transform plugin `{0}`")]
    UnknownPlugin(String),

    #[error("Transform plugin `{plugin}` failed on {module:?}: {message}")]
    Plugin {
        plugin: String,
        module: PathBuf,
        message: String,
    },

    #[error("Parse error in {module:?}: {message}")]
    Parse { module: PathBuf, message: String },

    #[error("Unsupported syntax in {module:?}: {message}")]
    Unsupported { module: PathBuf, message: String },

    #[error("Invalid JSON module {module:?}: {message}")]
    Json { module: PathBuf, message: String },
}

/// Errors raised while parsing JavaScript sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("{0}")]
    Syntax(String),

    #[error("Source text starts with a byte order mark")]
    ByteOrderMark,
}

/// Errors raised by the identifier-rewrite stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("`{0}` is not a valid JavaScript identifier")]
    InvalidIdentifier(String),

    /// Renaming would make the identifier at `offset` refer to another binding.
    #[error("Cannot rename `{from}` to `{to}`: the identifier at byte {offset} would change binding")]
    Collision {
        from: String,
        to: String,
        offset: usize,
    },

    #[error("Failed to parse bundle: {0}")]
    Scan(#[from] ScanError),
}

/// Errors raised by the code formatter.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to launch formatter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Formatter `{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Formatter I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Formatter produced invalid UTF-8 output")]
    InvalidUtf8,

    #[error("Empty formatter command")]
    EmptyCommand,
}

/// The artifact could not be persisted.
#[derive(Debug, Error)]
#[error("Failed to write {path:?}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
