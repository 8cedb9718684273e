//! Inference backend abstraction

use crate::{config::InpaintConfig, error::Result, models::ModelInfo};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Packed model inputs for one request
#[derive(Debug, Clone)]
pub struct InpaintingTensors {
    /// RGB image in [0, 1], NCHW `[1, 3, R, R]`
    pub image: Array4<f32>,
    /// Binary mask, NCHW `[1, 1, R, R]`, 1.0 marks pixels to fill
    pub mask: Array4<f32>,
}

/// Trait for inference backends
///
/// Backends are driven from a blocking worker thread and must therefore be `Send`.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &InpaintConfig) -> Result<Option<Duration>>;

    /// Run the model on a packed image/mask pair
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Tensor conversion or shape errors
    /// - Model inference failures
    fn infer(&mut self, input: &InpaintingTensors) -> Result<Array4<f32>>;

    /// Fixed square input resolution of the model
    fn input_resolution(&self) -> u32;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Validate a backend output tensor `[1, 3, H, W]`
///
/// # Errors
/// - Wrong batch or channel count, or empty spatial dimensions
pub fn validate_output_shape(output: &Array4<f32>) -> Result<()> {
    let (batch, channels, height, width) = output.dim();
    if batch != 1 || channels != 3 || height == 0 || width == 0 {
        return Err(crate::error::InpaintError::inference(format!(
            "Expected output tensor of shape [1, 3, H, W], got {:?}",
            output.shape()
        )));
    }
    Ok(())
}
