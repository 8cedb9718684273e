//! Configuration types for object removal operations

use crate::error::{InpaintError, Result};
use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::str::FromStr for BackendType {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown backend '{other}' (expected onnx or tract)"
            ))),
        }
    }
}

/// Output image format options (all lossless)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG, the wire format of the `removeObject` response
    #[default]
    Png,
    /// TIFF
    Tiff,
    /// Lossless WebP
    WebP,
}

/// How the model output is scaled back to the source size
///
/// `PerAxis` reproduces the established behavior: a uniform `min` scale is
/// computed but the image is stretched with the independent X/Y factors, so the
/// result always matches the target exactly. `AspectFit` applies the uniform
/// scale, which leaves one axis short for non-square sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizePolicy {
    #[default]
    PerAxis,
    AspectFit,
}

impl std::str::FromStr for ResizePolicy {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "per-axis" | "peraxis" => Ok(Self::PerAxis),
            "aspect-fit" | "aspectfit" => Ok(Self::AspectFit),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown resize policy '{other}' (expected per-axis or aspect-fit)"
            ))),
        }
    }
}

/// Resampling filter used for every resize in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => Self::Nearest,
            ResizeFilter::Triangle => Self::Triangle,
            ResizeFilter::CatmullRom => Self::CatmullRom,
            ResizeFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Configuration for object removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintConfig {
    /// Inference backend
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Output format of encoded results
    pub output_format: OutputFormat,

    /// Model-output resize policy
    pub resize_policy: ResizePolicy,

    /// Resampling filter
    pub resize_filter: ResizeFilter,

    /// Mask luma strictly above this value marks a pixel for removal
    pub mask_threshold: u8,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Model location and metadata
    pub model_spec: ModelSpec,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            output_format: OutputFormat::default(),
            resize_policy: ResizePolicy::default(),
            resize_filter: ResizeFilter::default(),
            mask_threshold: 0, // Any non-black mask pixel is removed
            debug: false,
            intra_threads: 0, // Auto-detect optimal intra-op threads
            inter_threads: 0, // Auto-detect optimal inter-op threads
            model_spec: ModelSpec::default(),
        }
    }
}

impl InpaintConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use imgly_objremove::{InpaintConfig, ExecutionProvider, ResizePolicy};
    ///
    /// let config = InpaintConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .resize_policy(ResizePolicy::PerAxis)
    ///     .build()
    ///     .unwrap();
    /// ```
    #[must_use]
    pub fn builder() -> InpaintConfigBuilder {
        InpaintConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or field values
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            InpaintError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Mask threshold of 255 (no pixel could ever be selected)
    /// - Invalid model specification
    pub fn validate(&self) -> Result<()> {
        if self.mask_threshold == u8::MAX {
            return Err(InpaintError::config_value_error(
                "mask threshold",
                self.mask_threshold,
                "0-254",
                Some(0),
            ));
        }

        self.model_spec.validate()
    }
}

/// Builder for `InpaintConfig`
#[derive(Debug, Default)]
pub struct InpaintConfigBuilder {
    config: InpaintConfig,
}

impl InpaintConfigBuilder {
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.config.resize_policy = policy;
        self
    }

    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.resize_filter = filter;
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: u8) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (inter = threads/2, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn build(self) -> Result<InpaintConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
