//! Tract backend implementation for inpainting models
//!
//! Pure Rust inference with no external runtime. Input facts are pinned to the
//! model's fixed resolution before optimization so graphs exported with
//! dynamic spatial axes still compile to a runnable plan.

use crate::config::InpaintConfig;
use crate::error::{InpaintError, Result};
use crate::inference::{validate_output_shape, InferenceBackend, InpaintingTensors};
use crate::models::{ModelInfo, ModelManager, DEFAULT_INPUT_RESOLUTION};
use log;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running inpainting models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Tract only runs on the CPU
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 Tract Backend System Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Create a Tract backend with a pre-configured model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Set the model manager for this backend
    pub fn set_model_manager(&mut self, model_manager: ModelManager) {
        self.model_manager = Some(model_manager);
    }

    /// Load and initialize the model using Tract
    fn load_model(&mut self, _config: &InpaintConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(InpaintError::model(
                "No model manager available for Tract backend",
            ));
        };

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;
        let resolution = model_info.input_resolution() as usize;

        log::info!("🚀 Initializing Tract Backend");
        log::info!("🧠 Model: {} ({resolution}x{resolution})", model_info.name);
        log::info!("📦 Backend: Tract (Pure Rust)");
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("📏 Model size: {size_mb:.2} MB");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| InpaintError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, resolution, resolution]).into())
            .map_err(|e| InpaintError::model(format!("Failed to pin image input shape: {e}")))?
            .with_input_fact(1, f32::fact([1, 1, resolution, resolution]).into())
            .map_err(|e| InpaintError::model(format!("Failed to pin mask input shape: {e}")))?
            .into_optimized()
            .map_err(|e| InpaintError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| InpaintError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &InpaintConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &InpaintingTensors) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| InpaintError::inference("Tract model not initialized"))?;

        log::debug!("🔮 Running Tract inference");
        log::debug!("  - Image tensor: {:?}", input.image.shape());
        log::debug!("  - Mask tensor: {:?}", input.mask.shape());

        let inference_start = Instant::now();

        let image_tensor = Tensor::from(input.image.clone().into_dyn());
        let mask_tensor = Tensor::from(input.mask.clone().into_dyn());

        let outputs = model
            .run(tvec![image_tensor.into(), mask_tensor.into()])
            .map_err(|e| InpaintError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| InpaintError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            InpaintError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_array = output_data
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| {
                InpaintError::inference(format!("Expected 4D output tensor: {e}"))
            })?;

        validate_output_shape(&output_array)?;

        log::debug!(
            "✅ Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        log::debug!("  - Output tensor: {:?}", output_array.shape());

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
