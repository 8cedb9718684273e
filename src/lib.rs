#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Object Removal Library
//!
//! Masked object removal with a LaMa inpainting model on ONNX Runtime or Tract.
//!
//! A request carries a source image, a mask whose white pixels mark the object,
//! and an optional normalized region. The model repaints the masked pixels at
//! its fixed input resolution; the result is scaled back to the source size
//! and only the region is pasted onto the original, so every pixel outside it
//! stays exactly as it was.
//!
//! ## Features
//!
//! - **Two Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Lazy Model Loading**: the model is loaded once, on first use, and shared
//! - **Cancellation**: abandoned requests never deliver a response
//! - **Message Boundary**: `removeObject` calls with `{status, message, imageBytes}` responses
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_objremove::{InpaintConfig, ModelSpec, NormalizedRegion, ObjectRemover};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(photo: Vec<u8>, mask: Vec<u8>) -> anyhow::Result<()> {
//! let config = InpaintConfig::builder()
//!     .model_spec(ModelSpec::from_path("models/lama_fp32.onnx"))
//!     .build()?;
//! let remover = ObjectRemover::new(config)?;
//!
//! let result = remover
//!     .remove_object(Some(&photo), Some(&mask), NormalizedRegion::FULL, &CancellationToken::new())
//!     .await?;
//! result.save_png("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Message Boundary
//!
//! ```rust,no_run
//! use imgly_objremove::{
//!     InpaintConfig, MethodCall, MethodResponse, ObjectRemover, ObjectRemoverPlugin,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(photo: Vec<u8>, mask: Vec<u8>) -> anyhow::Result<()> {
//! let plugin = Arc::new(ObjectRemoverPlugin::new(ObjectRemover::new(InpaintConfig::default())?));
//! let reply = plugin.dispatch(MethodCall::remove_object(photo, mask), CancellationToken::new());
//!
//! if let Ok(MethodResponse::Completed(response)) = reply.await {
//!     println!("{}: {}", response.status, response.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and tracing subscriber setup
//! - `webp-support` (default): Lossless WebP output
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! imgly-objremove = { version = "0.1", default-features = false, features = ["onnx"] }
//! ```

pub mod api;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

// Public API exports
pub use api::{
    ArgumentValue, MethodCall, MethodCallHandler, MethodResponse, ObjectRemover,
    ObjectRemoverPlugin, RemoveObjectResponse, REGION_ARGUMENT, REMOVE_OBJECT_METHOD,
};
pub use backends::*;
pub use compositor::Compositor;
pub use config::{
    BackendType, ExecutionProvider, InpaintConfig, InpaintConfigBuilder, OutputFormat,
    ResizeFilter, ResizePolicy,
};
pub use error::{ErrorKind, InpaintError, Result};
pub use inference::{InferenceBackend, InpaintingTensors};
pub use models::{ModelInfo, ModelManager, ModelSpec, OutputScaling};
pub use processor::{InpaintingInvoker, InvocationOutput};
pub use services::{
    ImageIOService, OutputFormatHandler, RequestDecoder, DEFAULT_IMAGE_ARGUMENT,
    MASKED_IMAGE_ARGUMENT,
};
pub use session::{BackendFactory, DefaultBackendFactory, ModelHandle};
pub use types::{
    Image, InpaintingOutput, InpaintingRequest, InpaintingResult, NormalizedRegion, PixelRegion,
    ProcessingMetadata, ProcessingTimings,
};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Remove the masked object from an encoded image
///
/// One-shot helper: builds an [`ObjectRemover`] for `config`, so the model is
/// loaded for this call only. Keep an `ObjectRemover` around to reuse it.
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_objremove::{remove_object_from_bytes, InpaintConfig, OutputFormat};
///
/// # async fn example(photo: Vec<u8>, mask: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_object_from_bytes(&photo, &mask, &InpaintConfig::default()).await?;
/// let png = result.to_bytes(OutputFormat::Png)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_object_from_bytes(
    source_bytes: &[u8],
    mask_bytes: &[u8],
    config: &InpaintConfig,
) -> Result<InpaintingOutput> {
    let remover = ObjectRemover::new(config.clone())?;
    remover
        .remove_object(
            Some(source_bytes),
            Some(mask_bytes),
            NormalizedRegion::FULL,
            &CancellationToken::new(),
        )
        .await
}

/// Remove the masked object, reading both images from async streams
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_objremove::{remove_object_from_reader, InpaintConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let source = File::open("photo.jpg").await?;
/// let mask = File::open("mask.png").await?;
/// let result = remove_object_from_reader(source, mask, &InpaintConfig::default()).await?;
/// result.save_png("output.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_object_from_reader<S, M>(
    source: S,
    mask: M,
    config: &InpaintConfig,
) -> Result<InpaintingOutput>
where
    S: AsyncRead + Unpin,
    M: AsyncRead + Unpin,
{
    let source_bytes = ImageIOService::read_from_reader(source).await?;
    let mask_bytes = ImageIOService::read_from_reader(mask).await?;
    remove_object_from_bytes(&source_bytes, &mask_bytes, config).await
}
