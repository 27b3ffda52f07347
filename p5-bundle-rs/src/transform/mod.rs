//! Source transforms applied to every bundled module.
//!
//! A module's source passes through the configured plugins in order, then
//! through the ES module interop stage that turns `import`/`export` into
//! CommonJS. JSON modules skip the plugins and become `module.exports = ...`.
//!
//! Plugins are looked up by name in a [`TransformRegistry`]. The registry ships
//! the `static-fs` plugin; hosts can register more.

mod esm;
mod static_fs;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::TransformError;

pub use esm::to_commonjs;
pub use static_fs::StaticFs;

/// Transform settings of one build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformOptions {
    /// Plugin names, applied in order.
    pub plugins: Vec<String>,
    /// Environment name handed to every plugin.
    pub env_name: Option<String>,
}

/// What a plugin knows about the module it is transforming.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub path: &'a Path,
    pub env_name: Option<&'a str>,
}

/// A source-to-source transform plugin.
pub trait SourceTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, source: String, cx: &TransformContext<'_>) -> Result<String, TransformError>;
}

/// Plugins available to a build, by name.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    plugins: HashMap<String, Arc<dyn SourceTransform>>,
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("TransformRegistry")
            .field("plugins", &names)
            .finish()
    }
}

impl TransformRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StaticFs));
        registry
    }

    /// Adds `plugin`, replacing any plugin registered under the same name.
    pub fn register(&mut self, plugin: Arc<dyn SourceTransform>) -> &mut Self {
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceTransform>> {
        self.plugins.get(name).cloned()
    }

    /// Resolves the plugin names of `options` into a runnable pipeline.
    pub fn pipeline(&self, options: &TransformOptions) -> Result<TransformPipeline, TransformError> {
        let plugins = options
            .plugins
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| TransformError::UnknownPlugin(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransformPipeline {
            plugins,
            env_name: options.env_name.clone(),
        })
    }
}

/// The resolved transform chain of one build.
#[derive(Clone)]
pub struct TransformPipeline {
    plugins: Vec<Arc<dyn SourceTransform>>,
    env_name: Option<String>,
}

impl TransformPipeline {
    pub fn env_name(&self) -> Option<&str> {
        self.env_name.as_deref()
    }

    /// Turns the raw source of the module at `path` into CommonJS.
    pub fn apply(&self, path: &Path, source: &str) -> Result<String, TransformError> {
        let source = strip_bom(source);
        if is_json(path) {
            return json_module(path, source);
        }

        let cx = TransformContext {
            path,
            env_name: self.env_name.as_deref(),
        };
        let mut code = source.to_string();
        for plugin in &self.plugins {
            code = plugin.transform(code, &cx)?;
        }
        to_commonjs(path, &code)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Strips a leading UTF-8 byte order mark.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{FEFF}').unwrap_or(text)
}

/// Wraps JSON text as a CommonJS module exporting the parsed value.
pub fn json_module(path: &Path, source: &str) -> Result<String, TransformError> {
    let value: serde_json::Value =
        serde_json::from_str(source).map_err(|err| TransformError::Json {
            module: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok(format!("module.exports = {value};\n"))
}
