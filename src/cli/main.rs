//! Object removal CLI tool
//!
//! Reads a source image and a mask, drives the `removeObject` boundary and
//! writes the composited result.

use super::config::{parse_region, CliConfigBuilder};
use crate::{
    api::{MethodCall, MethodCallHandler, MethodResponse, ObjectRemover, ObjectRemoverPlugin},
    config::{BackendType, ExecutionProvider, OutputFormat, ResizePolicy},
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::NormalizedRegion,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Masked object removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-objremove")]
pub struct Cli {
    /// Source image (use "-" for stdin)
    #[arg(short, long, value_name = "IMAGE", required_unless_present = "show_providers")]
    pub image: Option<String>,

    /// Mask image; white marks the object to remove
    #[arg(short = 'k', long, value_name = "MASK", required_unless_present = "show_providers")]
    pub mask: Option<PathBuf>,

    /// Path to a LaMa `.onnx` file or a directory containing `model.onnx`
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<PathBuf>,

    /// Output file. Use "-" for stdout [default: <IMAGE>_removed.<ext>]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Output format [default: from the output extension, else png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Inference backend (onnx, tract)
    #[arg(long)]
    pub backend: Option<BackendType>,

    /// ONNX Runtime execution provider (auto, cpu, cuda, coreml)
    #[arg(short = 'p', long)]
    pub provider: Option<ExecutionProvider>,

    /// Region to replace as fractions "x,y,width,height" [default: 0,0,1,1]
    #[arg(short, long, value_parser = parse_region)]
    pub region: Option<NormalizedRegion>,

    /// How the model output is scaled back (per-axis, aspect-fit)
    #[arg(long)]
    pub resize_policy: Option<ResizePolicy>,

    /// Mask luma above this value is removed
    #[arg(long)]
    pub mask_threshold: Option<u8>,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the boundary response as JSON (without image bytes)
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show backend and execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Tiff,
    Webp,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Tiff => Self::Tiff,
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, TracingFormat::Console)
        .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let (image_arg, mask_path) = match (&cli.image, &cli.mask) {
        (Some(image), Some(mask)) => (image.clone(), mask.clone()),
        _ => anyhow::bail!("Both --image and --mask are required"),
    };

    let _session = spans::session(
        &config.model_spec.display_name(),
        &format!("{:?}", config.backend_type),
    )
    .entered();

    info!(
        "Backend: {:?}, Provider: {}, Model: {}",
        config.backend_type,
        config.execution_provider,
        config.model_spec.path.display()
    );

    let source_bytes = if image_arg == "-" {
        ImageIOService::read_from_reader(tokio::io::stdin())
            .await
            .context("Failed to read source image from stdin")?
    } else {
        ImageIOService::read_image_bytes(&image_arg)
            .with_context(|| format!("Failed to read source image '{image_arg}'"))?
    };
    let mask_bytes = ImageIOService::read_image_bytes(&mask_path)
        .with_context(|| format!("Failed to read mask '{}'", mask_path.display()))?;

    let remover = ObjectRemover::new(config).context("Invalid configuration")?;
    let plugin = ObjectRemoverPlugin::new(remover);

    let mut call = MethodCall::remove_object(source_bytes, mask_bytes);
    if let Some(region) = cli.region {
        call = call.with_region(region);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; abandoning the request");
            ctrl_c.cancel();
        }
    });

    let request_span = spans::request(Path::new(&image_arg), &mask_path);
    let response = {
        let _entered = request_span.enter();
        plugin.handle(call, cancel.clone()).await
    };

    if cancel.is_cancelled() {
        anyhow::bail!("Cancelled");
    }

    let MethodResponse::Completed(mut response) = response else {
        anyhow::bail!("removeObject is not implemented by the plugin");
    };

    let image_bytes = response.image_bytes.take();
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&MethodResponse::Completed(response.clone()))
                .context("Failed to serialize response")?
        );
    }

    let Some(png_bytes) = image_bytes.filter(|_| response.is_success()) else {
        anyhow::bail!("{}", response.message);
    };

    let format = resolve_output_format(&cli);
    let output_bytes = if format == OutputFormat::Png {
        png_bytes
    } else {
        let image = image::load_from_memory(&png_bytes).context("Failed to re-read result")?;
        OutputFormatHandler::encode(&image, format).context("Failed to encode result")?
    };

    match cli.output.as_deref() {
        Some("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output_bytes).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        },
        output => {
            let output_path = output.map_or_else(
                || generate_output_path(Path::new(&image_arg), format),
                PathBuf::from,
            );
            ImageIOService::write_image_bytes(&output_path, &output_bytes)
                .with_context(|| format!("Failed to write '{}'", output_path.display()))?;
            info!("✅ Saved {}", output_path.display());
        },
    }

    Ok(())
}

fn resolve_output_format(cli: &Cli) -> OutputFormat {
    if let Some(format) = cli.format {
        return format.into();
    }
    cli.output
        .as_deref()
        .and_then(|output| Path::new(output).extension())
        .and_then(|ext| ext.to_str())
        .and_then(OutputFormatHandler::from_extension)
        .unwrap_or_default()
}

/// `<stem>_removed.<ext>` next to the input (current directory for stdin)
fn generate_output_path(input_path: &Path, format: OutputFormat) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .unwrap_or("output");
    let file_name = format!("{stem}_removed.{}", OutputFormatHandler::get_extension(format));
    input_path
        .parent()
        .map_or_else(|| PathBuf::from(&file_name), |parent| parent.join(&file_name))
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\n🔧 onnx (default):");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "✅ Available" } else { "❌ Not Available" };
            println!("  • {name}: {status} - {description}");
        }
    }

    #[cfg(feature = "tract")]
    {
        println!("\n🔧 tract:");
        for (name, available, description) in crate::backends::TractBackend::list_providers() {
            let status = if available { "✅ Available" } else { "❌ Not Available" };
            println!("  • {name}: {status} - {description}");
        }
    }

    println!("\n💡 Usage Examples:");
    println!("  --backend onnx --provider auto     # Best ONNX provider (default)");
    println!("  --backend onnx --provider coreml   # Apple CoreML (macOS)");
    println!("  --backend tract                    # Pure Rust, CPU only");
}
