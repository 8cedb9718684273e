//! IMG.LY Object Removal CLI Tool
//!
//! Command-line interface for removing masked objects from images with a LaMa
//! inpainting model on ONNX Runtime or Tract.

#[cfg(feature = "cli")]
use imgly_objremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
