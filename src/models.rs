//! Model specification and loading
//!
//! A model is an ONNX file taking `image [1,3,R,R]` and `mask [1,1,R,R]` and
//! producing `[1,3,R,R]`. It can be given either as the file itself or as a
//! directory containing `model.onnx` and an optional `config.json` sidecar that
//! overrides the name, resolution and output scaling of the spec.

use crate::error::{InpaintError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default LaMa input resolution
pub const DEFAULT_INPUT_RESOLUTION: u32 = 512;

const MODEL_FILE_NAME: &str = "model.onnx";
const SIDECAR_FILE_NAME: &str = "config.json";

/// Value range of the model's output tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputScaling {
    /// Decide per tensor: values above 1.5 mean the model emits [0, 255]
    #[default]
    Auto,
    /// Values in [0, 1]
    Unit,
    /// Values in [0, 255]
    Byte,
}

/// Model location and the metadata needed to drive it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Path to an `.onnx` file or a model directory
    pub path: PathBuf,
    /// Display name (defaults to the file stem)
    pub name: Option<String>,
    /// Fixed square input resolution of the network
    pub input_resolution: u32,
    /// Output value range
    pub output_scaling: OutputScaling,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lama_fp32.onnx"),
            name: None,
            input_resolution: DEFAULT_INPUT_RESOLUTION,
            output_scaling: OutputScaling::Auto,
        }
    }
}

impl ModelSpec {
    /// Spec for a model file with default metadata
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned())
        })
    }

    /// Check the metadata values
    ///
    /// # Errors
    /// - Resolution of zero or not a multiple of 8
    pub fn validate(&self) -> Result<()> {
        if self.input_resolution == 0 || self.input_resolution % 8 != 0 {
            return Err(InpaintError::config_value_error(
                "model input resolution",
                self.input_resolution,
                "positive multiple of 8",
                Some(DEFAULT_INPUT_RESOLUTION),
            ));
        }
        Ok(())
    }
}

/// Optional `config.json` next to a model directory's `model.onnx`
#[derive(Debug, Clone, Default, Deserialize)]
struct SidecarConfig {
    name: Option<String>,
    input_resolution: Option<u32>,
    output_scaling: Option<OutputScaling>,
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub image_shape: (usize, usize, usize, usize), // NCHW format
    pub mask_shape: (usize, usize, usize, usize),
    pub output_scaling: OutputScaling,
}

impl ModelInfo {
    /// Square input resolution
    #[must_use]
    pub fn input_resolution(&self) -> u32 {
        self.image_shape.3 as u32
    }
}

/// Resolves a `ModelSpec` to a model file and its metadata
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    spec: ModelSpec,
}

impl ModelManager {
    /// Resolve a spec, applying any sidecar overrides
    ///
    /// # Errors
    /// - Model file or directory does not exist
    /// - Sidecar present but unreadable or invalid
    /// - Resolved metadata fails validation
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let mut spec = spec.clone();

        let model_path = if spec.path.is_dir() {
            let sidecar_path = spec.path.join(SIDECAR_FILE_NAME);
            if sidecar_path.is_file() {
                let sidecar = Self::load_sidecar(&sidecar_path)?;
                if sidecar.name.is_some() {
                    spec.name = sidecar.name;
                }
                if let Some(resolution) = sidecar.input_resolution {
                    spec.input_resolution = resolution;
                }
                if let Some(scaling) = sidecar.output_scaling {
                    spec.output_scaling = scaling;
                }
            }
            if spec.name.is_none() {
                spec.name = spec
                    .path
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned());
            }
            spec.path.join(MODEL_FILE_NAME)
        } else {
            spec.path.clone()
        };

        if !model_path.is_file() {
            return Err(InpaintError::model_error_with_context(
                "locate",
                &model_path,
                "file not found",
                &["pass the path to a LaMa .onnx file", "or a directory containing model.onnx"],
            ));
        }

        spec.validate()?;

        Ok(Self { model_path, spec })
    }

    fn load_sidecar(path: &Path) -> Result<SidecarConfig> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            InpaintError::model_error_with_context(
                "parse sidecar for",
                path,
                &e.to_string(),
                &[],
            )
        })
    }

    /// Load model data as bytes
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path).map_err(|e| {
            InpaintError::model_error_with_context("read", &self.model_path, &e.to_string(), &[])
        })
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)?.len() as usize;
        let resolution = self.spec.input_resolution as usize;
        Ok(ModelInfo {
            name: self.spec.display_name(),
            size_bytes,
            image_shape: (1, 3, resolution, resolution),
            mask_shape: (1, 1, resolution, resolution),
            output_scaling: self.spec.output_scaling,
        })
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_model_spec_default() {
        let spec = ModelSpec::default();
        assert_eq!(spec.input_resolution, 512);
        assert_eq!(spec.output_scaling, OutputScaling::Auto);
        assert_eq!(spec.display_name(), "lama_fp32");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_model_spec_validation() {
        let mut spec = ModelSpec::from_path("lama.onnx");
        spec.input_resolution = 0;
        assert!(spec.validate().is_err());
        spec.input_resolution = 500;
        assert!(spec.validate().is_err());
        spec.input_resolution = 256;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_missing_model_file() {
        let spec = ModelSpec::from_path("/nonexistent/lama.onnx");
        let error = ModelManager::from_spec(&spec).unwrap_err();
        assert!(matches!(error, InpaintError::Model(_)));
        assert!(error.to_string().contains("/nonexistent/lama.onnx"));
    }

    #[test]
    fn test_model_file_resolution() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("big-lama.onnx");
        fs::write(&model_path, b"onnx-bytes").unwrap();

        let manager = ModelManager::from_spec(&ModelSpec::from_path(&model_path)).unwrap();
        let info = manager.get_info().unwrap();
        assert_eq!(info.name, "big-lama");
        assert_eq!(info.size_bytes, 10);
        assert_eq!(info.image_shape, (1, 3, 512, 512));
        assert_eq!(info.mask_shape, (1, 1, 512, 512));
        assert_eq!(manager.load_model().unwrap(), b"onnx-bytes");
    }

    #[test]
    fn test_model_directory_with_sidecar() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.onnx"), b"weights").unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{ "name": "lama-256", "input_resolution": 256, "output_scaling": "byte" }"#,
        )
        .unwrap();

        let manager = ModelManager::from_spec(&ModelSpec::from_path(dir.path())).unwrap();
        let info = manager.get_info().unwrap();
        assert_eq!(info.name, "lama-256");
        assert_eq!(info.input_resolution(), 256);
        assert_eq!(info.output_scaling, OutputScaling::Byte);
        assert!(manager.model_path().ends_with("model.onnx"));
    }

    #[test]
    fn test_model_directory_with_invalid_sidecar() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.onnx"), b"weights").unwrap();
        fs::write(dir.path().join("config.json"), "{ nope").unwrap();

        let error = ModelManager::from_spec(&ModelSpec::from_path(dir.path())).unwrap_err();
        assert!(error.to_string().contains("sidecar"));
    }

    #[test]
    fn test_model_directory_without_model_file() {
        let dir = TempDir::new().unwrap();
        let error = ModelManager::from_spec(&ModelSpec::from_path(dir.path())).unwrap_err();
        assert!(error.to_string().contains("model.onnx"));
    }
}
