#![doc = include_str!("../README.md")]

pub mod banner;
pub mod bundler;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod postprocess;
pub mod rewrite;
pub mod syntax;
pub mod settings;
pub mod transform;
pub mod variant;
pub mod writer;

#[macro_use]
extern crate lazy_static;

pub use bundler::{BundleRequest, BundleService, BundleStream, GraphBundler};
pub use error::{BuildError, BuildResult};
pub use format::{CodeFormatter, FormatOptions, PrettierFormatter};
pub use pipeline::BuildPipeline;
pub use rewrite::{BundleRewrite, Derequire};
pub use serde_json;
pub use settings::{BundleSettings, LibraryLayout};
pub use variant::{BuildConfig, BuildVariant, VariantPolicy};
pub use writer::{Artifact, CompletionSignal};
