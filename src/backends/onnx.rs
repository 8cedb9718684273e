//! ONNX Runtime backend implementation for inpainting models
//!
//! Runs LaMa-style models through ONNX Runtime with support for multiple
//! execution providers (CPU, CUDA, CoreML). Inputs are passed positionally:
//! image first, mask second.

use crate::config::{ExecutionProvider, InpaintConfig};
use crate::error::{InpaintError, Result};
use crate::inference::{validate_output_shape, InferenceBackend, InpaintingTensors};
use crate::models::{ModelInfo, ModelManager, DEFAULT_INPUT_RESOLUTION};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

/// ONNX Runtime backend for running inpainting models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// Returns `(name, available, description)` tuples.
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let mut providers = Vec::new();

        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);
        log::debug!(
            "  - CPU cores: {cores}",
            cores = std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        providers.push((
            "CPU".to_string(),
            true,
            "Always available, uses CPU for inference".to_string(),
        ));

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        if cuda_available {
            log::info!("✅ CUDA execution provider is available");
        } else {
            log::debug!("❌ CUDA execution provider is not available");
        }
        providers.push((
            "CUDA".to_string(),
            cuda_available,
            "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
        ));

        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);
        if coreml_available {
            log::info!("✅ CoreML execution provider is available");
        } else {
            #[cfg(target_os = "macos")]
            log::warn!("❌ CoreML execution provider is not available on this Mac");
            #[cfg(not(target_os = "macos"))]
            log::debug!("  - Expected: CoreML is only available on macOS");
        }
        providers.push((
            "CoreML".to_string(),
            coreml_available,
            "Apple Silicon GPU acceleration (macOS only)".to_string(),
        ));

        providers
    }

    /// Create a new ONNX backend with specific model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Create a new ONNX backend without a model; `initialize` fails until one is set
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Set the model manager for this backend
    pub fn set_model_manager(&mut self, model_manager: ModelManager) {
        self.model_manager = Some(model_manager);
    }

    fn map_ort<E: std::fmt::Display>(stage: &str) -> impl FnOnce(E) -> InpaintError + '_ {
        move |e| InpaintError::model(format!("Failed to {stage}: {e}"))
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &InpaintConfig) -> Result<std::time::Duration> {
        let model_load_start = std::time::Instant::now();

        let model_manager = self.model_manager.as_ref().ok_or_else(|| {
            InpaintError::model("No model manager available for ONNX backend")
        })?;

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        let mut session_builder = Session::builder()
            .map_err(Self::map_ort("create session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(Self::map_ort("set optimization level"))?;

        session_builder = match config.execution_provider {
            ExecutionProvider::Auto => {
                // Auto-detect: try CUDA > CoreML > CPU with availability checking
                let mut providers = Vec::new();

                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda_provider.build());
                }

                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml_provider.with_subgraphs(true).build());
                }

                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                    session_builder
                } else {
                    log::info!(
                        "✅ Hardware acceleration enabled with {count} provider(s)",
                        count = providers.len()
                    );
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(Self::map_ort("set auto execution providers"))?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                session_builder
            },
            ExecutionProvider::Cuda => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("Using CUDA execution provider");
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(Self::map_ort("set CUDA execution provider"))?
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    session_builder
                        .with_execution_providers([coreml_provider.with_subgraphs(true).build()])
                        .map_err(Self::map_ort("set CoreML execution provider"))?
                } else {
                    log::error!("🚫 CoreML execution provider requested but not available!");
                    log::error!("  - Falling back to CPU (will be much slower)");
                    session_builder
                }
            },
        };

        let available = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(Self::map_ort("enable parallel execution"))?
            .with_intra_threads(intra_threads)
            .map_err(Self::map_ort("set intra threads"))?
            .with_inter_threads(inter_threads)
            .map_err(Self::map_ort("set inter threads"))?
            .commit_from_memory(&model_data)
            .map_err(Self::map_ort("create session from model data"))?;

        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("Session configuration:");
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!(
            "  - Model: {} ({}x{} input)",
            model_info.name,
            model_info.input_resolution(),
            model_info.input_resolution()
        );
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::debug!("  - Model size: {size_mb:.2} MB");

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &InpaintConfig) -> Result<Option<std::time::Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &InpaintingTensors) -> Result<Array4<f32>> {
        use std::time::Instant;

        if !self.initialized {
            return Err(InpaintError::inference("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InpaintError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!(
            "🚀 Starting inference with image {:?} and mask {:?}",
            input.image.dim(),
            input.mask.dim()
        );

        let image_value = Value::from_array(input.image.clone()).map_err(|e| {
            InpaintError::inference(format!("Failed to convert image tensor: {e}"))
        })?;
        let mask_value = Value::from_array(input.mask.clone()).map_err(|e| {
            InpaintError::inference(format!("Failed to convert mask tensor: {e}"))
        })?;

        // Positional inputs: exported LaMa graphs disagree on tensor names
        let core_inference_start = Instant::now();
        let outputs = session
            .run(ort::inputs![image_value, mask_value])
            .map_err(|e| InpaintError::inference(format!("ONNX inference failed: {e}")))?;
        let core_inference_time = core_inference_start.elapsed();
        log::debug!(
            "  ⚡ Core inference: {:.2}ms",
            core_inference_time.as_secs_f64() * 1000.0
        );

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let Some(first_key) = keys.first() else {
                return Err(InpaintError::inference("No output tensors found"));
            };
            outputs
                .get(first_key)
                .ok_or_else(|| InpaintError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    InpaintError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        if output_shape.len() != 4 {
            return Err(InpaintError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_data = output_tensor.view().to_owned();
        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(3),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.into_raw_vec_and_offset().0,
        )
        .map_err(|e| InpaintError::inference(format!("Failed to reshape output tensor: {e}")))?;

        validate_output_shape(&output_array)?;

        log::info!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(output_array)
    }

    fn input_resolution(&self) -> u32 {
        self.model_manager
            .as_ref()
            .and_then(|manager| manager.get_info().ok())
            .map_or(DEFAULT_INPUT_RESOLUTION, |info| info.input_resolution())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| InpaintError::internal("Model manager not initialized"))?;
        model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
