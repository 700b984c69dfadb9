//! Build command handler

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::*;
use slipway_builder::{
    BuildConfig, BuildCoordinator, DateTimeTagger, Dispatcher, EnvTemplateTagger, ShaTagger,
    Strategy, Tagger,
};
use slipway_core::BuildResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, select_artifacts};

/// How images are tagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TagPolicy {
    /// `image:latest`
    Sha,
    /// `image:<build time>`
    DateTime,
    /// Rendered from `--template`
    EnvTemplate,
}

/// Arguments of `slipway build`
#[derive(Args)]
pub struct BuildArgs {
    /// Only build these images (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    images: Vec<String>,

    /// Tagging policy
    #[arg(long, value_enum, default_value_t = TagPolicy::Sha)]
    tag_policy: TagPolicy,

    /// Tag template for the env-template policy, e.g. `{{.IMAGE_NAME}}:{{.VERSION}}`
    #[arg(long, env = "SLIPWAY_TAG_TEMPLATE")]
    template: Option<String>,

    /// strftime format for the date-time policy
    #[arg(long)]
    date_format: Option<String>,

    /// Render date-time tags in UTC
    #[arg(long)]
    utc: bool,

    /// Build strategy (`parallel` or `sequential`), overrides SLIPWAY_BUILD_STRATEGY
    #[arg(long)]
    strategy: Option<String>,

    /// Maximum concurrent builds in parallel mode
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Push built images
    #[arg(long)]
    push: bool,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,
}

impl BuildArgs {
    fn tagger(&self) -> Result<Box<dyn Tagger>> {
        let tagger: Box<dyn Tagger> = match self.tag_policy {
            TagPolicy::Sha => Box::new(ShaTagger),
            TagPolicy::DateTime => Box::new(DateTimeTagger::new(self.date_format.clone(), self.utc)),
            TagPolicy::EnvTemplate => {
                let template = self
                    .template
                    .as_deref()
                    .context("--template is required with the env-template tag policy")?;
                Box::new(EnvTemplateTagger::new(template)?)
            }
        };
        Ok(tagger)
    }

    /// Applies the flags on top of the environment configuration
    fn build_config(&self) -> Result<BuildConfig> {
        let mut config = BuildConfig::from_env()?;

        if let Some(name) = &self.strategy {
            config.strategy = Strategy::parse(name, self.max_concurrency)?;
        } else if let Some(max) = self.max_concurrency {
            if let Strategy::Parallel { max_concurrency } = &mut config.strategy {
                *max_concurrency = Some(max);
            }
        }

        if self.push {
            config.push_images = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Handle `slipway build`
///
/// # Arguments
/// * `args` - Build flags
/// * `config` - The CLI configuration
/// * `cancel` - Cancelled on Ctrl-C
pub async fn handle_build_command(
    args: BuildArgs,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let artifacts = select_artifacts(config.load_artifacts()?, &args.images)?;
    let tagger = args.tagger()?;
    let build_config = args.build_config()?;

    info!(
        "Building {} artifact(s), strategy {:?}",
        artifacts.len(),
        build_config.strategy
    );

    let dispatcher = Dispatcher::from_config(&build_config)?;
    let coordinator = BuildCoordinator::new(Arc::new(dispatcher), config.sink(), cancel);

    let results = coordinator
        .build_all(&artifacts, tagger.as_ref(), &build_config.strategy)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }

    Ok(())
}

fn print_results(results: &[BuildResult]) {
    println!("{}", "✓ Build complete".green().bold());
    for result in results {
        println!("  {} -> {}", result.image_name.bold(), result.tag.cyan());
    }
}
