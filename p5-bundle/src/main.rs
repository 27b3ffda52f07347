use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::debug;
use p5_bundle_rs::{
    BuildPipeline, BundleSettings, LibraryLayout, PrettierFormatter, VariantPolicy,
};

/// p5-bundle: builds one variant of the p5.js library bundle
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Build variant. One of min, test, dev. Omit for the standard build
    pub variant: Option<String>,

    /// Project root containing package.json
    #[clap(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Entry module, relative to the project root
    #[clap(short, long)]
    pub entry: Option<PathBuf>,

    /// Output directory, relative to the project root
    #[clap(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Global name the standalone bundle exports
    #[clap(short, long)]
    pub name: Option<String>,

    /// Version written to the banner instead of the package.json one
    #[clap(long)]
    pub version_override: Option<String>,

    /// Formatter command, the source is piped through its stdin
    #[clap(short, long, default_value = "prettier")]
    pub formatter: String,

    /// Fall back to the standard build on an unknown variant
    #[clap(long)]
    pub lenient_variant: bool,
}

impl Args {
    fn layout(&self) -> anyhow::Result<LibraryLayout> {
        let mut layout = LibraryLayout::p5();
        if let Some(entry) = &self.entry {
            layout.entry = entry.clone();
        }
        if let Some(out_dir) = &self.out_dir {
            layout.out_dir = out_dir.clone();
        }
        if let Some(name) = &self.name {
            layout.standalone_name = name.clone();
        }
        layout.validate()?;
        Ok(layout)
    }

    fn settings(&self) -> anyhow::Result<BundleSettings> {
        let layout = self.layout()?;
        let settings = match &self.version_override {
            Some(version) => BundleSettings::new(&self.root, layout, version.as_str()),
            None => BundleSettings::from_project(&self.root, layout).with_context(|| {
                format!("Failed to read project settings in {}", self.root.display())
            })?,
        };
        let policy = if self.lenient_variant {
            VariantPolicy::Lenient
        } else {
            VariantPolicy::Strict
        };
        Ok(settings.with_variant_policy(policy))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = Args::parse();
    debug!("{args:?}");

    if args.formatter.trim().is_empty() {
        bail!("Formatter command is empty");
    }
    let pipeline = BuildPipeline::new(args.settings()?)
        .with_formatter(Arc::new(PrettierFormatter::new(&args.formatter)));

    let artifact = pipeline
        .run(args.variant.as_deref())
        .await
        .context("Bundle build failed")?;
    println!("{}", artifact.created_message());
    Ok(())
}
