//! Test utilities and mock backends for testing inference functionality
//!
//! This module provides a mock implementation of the `InferenceBackend` trait
//! so the pipeline can be exercised without model files or ONNX Runtime.

use crate::{
    config::InpaintConfig,
    error::{InpaintError, Result},
    inference::{InferenceBackend, InpaintingTensors},
    models::{ModelInfo, OutputScaling},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mock inpainting backend
///
/// Echoes the input image and paints every masked pixel with a fixed fill color,
/// which makes "pixels under the mask changed" observable in tests.
#[derive(Debug, Clone)]
pub struct MockInpaintingBackend {
    /// Whether the backend has been initialized
    initialized: bool,
    /// Simulated model information
    model_info: ModelInfo,
    /// Color written into masked pixels, in [0, 1]
    fill: [f32; 3],
    /// Emit values in [0, 255] instead of [0, 1]
    byte_output: bool,
    /// Simulated inference latency
    delay: Option<Duration>,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    /// Whether to simulate initialization failure
    should_fail_init: bool,
    /// Whether to simulate inference failure
    should_fail_inference: bool,
}

impl MockInpaintingBackend {
    /// Create a new mock backend with the given square resolution
    #[must_use]
    pub fn new(resolution: u32) -> Self {
        let resolution = resolution as usize;
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-lama".to_string(),
                size_bytes: 1024 * 1024,
                image_shape: (1, 3, resolution, resolution),
                mask_shape: (1, 1, resolution, resolution),
                output_scaling: OutputScaling::Auto,
            },
            fill: [0.0, 1.0, 0.0],
            byte_output: false,
            delay: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init(resolution: u32) -> Self {
        let mut backend = Self::new(resolution);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference(resolution: u32) -> Self {
        let mut backend = Self::new(resolution);
        backend.should_fail_inference = true;
        backend
    }

    #[must_use]
    pub fn with_fill(mut self, fill: [f32; 3]) -> Self {
        self.fill = fill;
        self
    }

    #[must_use]
    pub fn with_byte_output(mut self) -> Self {
        self.byte_output = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    /// Record a method call for testing verification
    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }
}

impl InferenceBackend for MockInpaintingBackend {
    fn initialize(&mut self, _config: &InpaintConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(InpaintError::model(
                "Mock backend initialization failed",
            ));
        }

        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(150)))
    }

    fn infer(&mut self, input: &InpaintingTensors) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(InpaintError::inference("Mock backend not initialized"));
        }

        if self.should_fail_inference {
            return Err(InpaintError::inference("Mock backend inference failed"));
        }

        if input.image.dim() != self.model_info.image_shape
            || input.mask.dim() != self.model_info.mask_shape
        {
            return Err(InpaintError::inference(format!(
                "Mock backend expected image {:?} and mask {:?}, got {:?} and {:?}",
                self.model_info.image_shape,
                self.model_info.mask_shape,
                input.image.shape(),
                input.mask.shape()
            )));
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut output = input.image.clone();
        let (_, _, height, width) = output.dim();
        for y in 0..height {
            for x in 0..width {
                if input.mask[[0, 0, y, x]] > 0.5 {
                    for (channel, value) in self.fill.iter().enumerate() {
                        output[[0, channel, y, x]] = *value;
                    }
                }
            }
        }

        if self.byte_output {
            output.mapv_inplace(|v| v * 255.0);
        }

        Ok(output)
    }

    fn input_resolution(&self) -> u32 {
        self.model_info.image_shape.3 as u32
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensors(resolution: usize) -> InpaintingTensors {
        let mut mask = Array4::zeros((1, 1, resolution, resolution));
        mask[[0, 0, 0, 0]] = 1.0;
        InpaintingTensors {
            image: Array4::from_elem((1, 3, resolution, resolution), 0.25),
            mask,
        }
    }

    #[test]
    fn test_mock_fills_masked_pixels_only() {
        let mut backend = MockInpaintingBackend::new(8);
        backend.initialize(&InpaintConfig::default()).unwrap();

        let output = backend.infer(&tensors(8)).unwrap();
        assert_eq!(output[[0, 0, 0, 0]], 0.0);
        assert_eq!(output[[0, 1, 0, 0]], 1.0);
        assert_eq!(output[[0, 0, 1, 1]], 0.25);
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_mock_rejects_wrong_shape() {
        let mut backend = MockInpaintingBackend::new(8);
        backend.initialize(&InpaintConfig::default()).unwrap();
        assert!(backend.infer(&tensors(16)).is_err());
    }

    #[test]
    fn test_mock_failure_switches() {
        let mut backend = MockInpaintingBackend::new_failing_init(8);
        assert!(backend.initialize(&InpaintConfig::default()).is_err());
        assert!(!backend.is_initialized());

        let mut backend = MockInpaintingBackend::new_failing_inference(8);
        backend.initialize(&InpaintConfig::default()).unwrap();
        assert!(backend.infer(&tensors(8)).is_err());
    }

    #[test]
    fn test_uninitialized_mock_refuses_inference() {
        let mut backend = MockInpaintingBackend::new(8);
        assert!(backend.infer(&tensors(8)).is_err());
    }

    #[test]
    fn test_shared_history_between_clones() {
        let backend = MockInpaintingBackend::new(8);
        let mut boxed: Box<dyn InferenceBackend> = Box::new(backend.clone());
        boxed.initialize(&InpaintConfig::default()).unwrap();
        assert_eq!(backend.get_call_history(), vec!["initialize"]);
    }
}
