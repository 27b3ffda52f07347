//! Bundle assembly.
//!
//! The pipeline talks to bundlers through [`BundleService`]: it hands over a
//! [`BundleRequest`] and consumes the [`BundleStream`] of text chunks that
//! comes back. [`GraphBundler`] is the built-in service. It builds the module
//! graph on a worker thread and streams a standalone CommonJS pack:
//!
//! 1. Modules are loaded from disk with node-style resolution (`loader`)
//! 2. Each module passes through the transform pipeline and has its
//!    `require` calls linked, honoring exclusions and ignores (`graph`)
//! 3. The UMD wrapper, prelude and module table are emitted in id order (`emit`)

mod emit;
mod graph;
mod loader;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::debug;
use serde_json::Value;

use crate::error::BundleError;
use crate::transform::{TransformOptions, TransformRegistry};
use crate::variant::BuildConfig;

pub use emit::module_ids;
pub use graph::{ModuleGraph, ModuleKey, ModuleRecord};
pub use loader::{resolve, Resolution};

/// Ordered, finite text chunks of one bundle. The first error ends the build.
pub type BundleStream = BoxStream<'static, Result<String, BundleError>>;

/// Everything a bundling service needs to produce one standalone bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRequest {
    pub entry: PathBuf,
    /// Global the standalone bundle exports.
    pub standalone_name: String,
    pub global_injections: BTreeMap<String, Value>,
    /// Specifiers left out of the graph.
    pub exclude_paths: Vec<String>,
    /// Specifiers bundled as an empty module.
    pub ignore_modules: Vec<String>,
    pub transform_options: TransformOptions,
}

impl BundleRequest {
    pub fn new(entry: impl Into<PathBuf>, standalone_name: impl Into<String>, config: &BuildConfig) -> Self {
        Self {
            entry: entry.into(),
            standalone_name: standalone_name.into(),
            global_injections: config.global_injections.clone(),
            exclude_paths: config.exclude_paths.clone(),
            ignore_modules: config.ignore_modules.clone(),
            transform_options: config.transform_options.clone(),
        }
    }
}

/// A bundler producing a standalone bundle as a stream.
pub trait BundleService: Send + Sync {
    fn bundle(&self, request: BundleRequest) -> BundleStream;
}

/// Builds the bundle request for `config` and starts bundling.
pub fn assemble(
    service: &dyn BundleService,
    entry: &Path,
    standalone_name: &str,
    config: &BuildConfig,
) -> BundleStream {
    debug!(
        "Assembling {} from {} ({} exclusions, {} ignores, {} globals)",
        config.output_filename,
        entry.display(),
        config.exclude_paths.len(),
        config.ignore_modules.len(),
        config.global_injections.len()
    );
    service.bundle(BundleRequest::new(entry, standalone_name, config))
}

/// The built-in CommonJS pack bundler.
#[derive(Debug, Clone)]
pub struct GraphBundler {
    registry: TransformRegistry,
}

impl Default for GraphBundler {
    fn default() -> Self {
        Self::new(TransformRegistry::with_builtins())
    }
}

impl GraphBundler {
    pub fn new(registry: TransformRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    /// Builds the module graph for `request` without emitting it.
    pub fn graph(&self, request: &BundleRequest) -> Result<ModuleGraph, BundleError> {
        let pipeline = self.registry.pipeline(&request.transform_options)?;
        ModuleGraph::build(request, &pipeline)
    }

    fn run(
        &self,
        request: &BundleRequest,
        sender: &mpsc::UnboundedSender<Result<String, BundleError>>,
    ) -> Result<(), BundleError> {
        let graph = self.graph(request)?;
        debug!("Module graph has {} modules", graph.len());
        emit::emit_chunks(&graph, &request.standalone_name, |chunk| {
            sender
                .unbounded_send(Ok(chunk))
                .map_err(|err| BundleError::Worker(err.to_string()))
        })
    }
}

impl BundleService for GraphBundler {
    fn bundle(&self, request: BundleRequest) -> BundleStream {
        let (sender, receiver) = mpsc::unbounded();
        let bundler = self.clone();
        thread::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| bundler.run(&request, &sender)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "bundler worker panicked".to_string());
                    Some(BundleError::Worker(message))
                }
            };
            if let Some(err) = failure {
                // The receiver may already be gone; nothing else to report to.
                sender.unbounded_send(Err(err)).ok();
            }
        });
        receiver.boxed()
    }
}
