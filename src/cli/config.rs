//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{
    config::{InpaintConfig, OutputFormat},
    types::NormalizedRegion,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to an `InpaintConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: `--config` file first, then flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<InpaintConfig> {
        let mut config = match &cli.config {
            Some(path) => InpaintConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
            None => InpaintConfig::default(),
        };

        if let Some(model) = &cli.model {
            config.model_spec.path.clone_from(model);
        }
        if let Some(backend) = cli.backend {
            config.backend_type = backend;
        }
        if let Some(provider) = cli.provider {
            config.execution_provider = provider;
        }
        if let Some(policy) = cli.resize_policy {
            config.resize_policy = policy;
        }
        if let Some(threshold) = cli.mask_threshold {
            config.mask_threshold = threshold;
        }
        if let Some(threads) = cli.threads {
            config.intra_threads = threads;
            config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        }
        if let Some(format) = cli.format {
            config.output_format = Self::convert_output_format(format);
        }
        config.debug = cli.verbose > 0;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Convert CLI output format to library output format
    pub(crate) fn convert_output_format(format: CliOutputFormat) -> OutputFormat {
        format.into()
    }
}

/// Parse `x,y,width,height` fractions into a validated region
pub(crate) fn parse_region(value: &str) -> std::result::Result<NormalizedRegion, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in region '{value}': {e}"))?;

    let [x, y, width, height] = parts[..] else {
        return Err(format!(
            "region must have four values x,y,width,height, got {}",
            parts.len()
        ));
    };

    NormalizedRegion::new(x, y, width, height).map_err(|e| e.to_string())
}
