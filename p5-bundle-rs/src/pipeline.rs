//! The build pipeline: variant resolution, assembly, post-processing, write.

use std::sync::Arc;

use chrono::NaiveDate;
use log::info;

use crate::banner::{render_banner, today};
use crate::bundler::{assemble, BundleService, GraphBundler};
use crate::error::BuildResult;
use crate::format::{CodeFormatter, PrettierFormatter};
use crate::postprocess::PostProcessor;
use crate::rewrite::{BundleRewrite, Derequire};
use crate::settings::BundleSettings;
use crate::variant::BuildConfig;
use crate::writer::{write_artifact, Artifact, CompletionSignal};

/// Builds one library variant per call.
///
/// Every call is a full rebuild that shares no state with earlier calls, so a
/// pipeline can build several variants concurrently.
#[derive(Clone)]
pub struct BuildPipeline {
    settings: BundleSettings,
    bundler: Arc<dyn BundleService>,
    formatter: Arc<dyn CodeFormatter>,
    rewrite: Arc<dyn BundleRewrite>,
    build_date: Option<NaiveDate>,
}

impl BuildPipeline {
    /// A pipeline using the built-in bundler, derequire and prettier.
    pub fn new(settings: BundleSettings) -> Self {
        Self {
            settings,
            bundler: Arc::new(GraphBundler::default()),
            formatter: Arc::new(PrettierFormatter::default()),
            rewrite: Arc::new(Derequire::default()),
            build_date: None,
        }
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn BundleService>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn CodeFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_rewrite(mut self, rewrite: Arc<dyn BundleRewrite>) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Pins the banner date instead of using today's.
    pub fn with_build_date(mut self, date: NaiveDate) -> Self {
        self.build_date = Some(date);
        self
    }

    pub fn settings(&self) -> &BundleSettings {
        &self.settings
    }

    /// Maps the task parameter to the configuration of the variant it selects.
    pub fn resolve(&self, param: Option<&str>) -> BuildResult<BuildConfig> {
        let variant = self.settings.variant_policy.resolve(param)?;
        Ok(BuildConfig::resolve(variant, &self.settings.layout))
    }

    pub fn banner(&self) -> String {
        render_banner(
            &self.settings.layout.name,
            &self.settings.version,
            self.build_date.unwrap_or_else(today),
        )
    }

    /// Builds and writes the bundle described by `config`.
    pub async fn build(&self, config: &BuildConfig) -> BuildResult<Artifact> {
        let layout = &self.settings.layout;
        layout.validate()?;
        info!("Building {} ({} variant)", config.output_filename, config.variant);

        let banner = self.banner();
        let stream = assemble(
            self.bundler.as_ref(),
            &self.settings.entry_path(),
            &layout.standalone_name,
            config,
        );
        let code = PostProcessor::new(self.rewrite.clone(), self.formatter.clone())
            .process(&banner, stream, config.variant.is_minified())
            .await?;
        Ok(write_artifact(&self.settings.root, &config.output_path, code)?)
    }

    /// Resolves `param` and builds that variant.
    pub async fn run(&self, param: Option<&str>) -> BuildResult<Artifact> {
        let config = self.resolve(param)?;
        self.build(&config).await
    }

    /// Runs the build and reports the outcome through `signal`.
    pub async fn run_task(&self, param: Option<&str>, signal: CompletionSignal) {
        signal.fire(self.run(param).await);
    }
}
