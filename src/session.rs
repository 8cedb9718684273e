//! Process-scoped inpainting model handle
//!
//! The model is loaded at most once, on first use, and shared by every request.
//! A failed load is logged once and leaves the handle permanently unavailable;
//! requests then fail with `ModelUnavailable` without touching a backend.
//! Inference is serialized through a mutex because backends run with `&mut self`.

use crate::{
    config::{BackendType, InpaintConfig},
    error::{InpaintError, Result},
    inference::{InferenceBackend, InpaintingTensors},
    models::{ModelInfo, ModelManager},
};
use instant::{Duration, Instant};
use ndarray::Array4;
use std::sync::{Mutex, OnceLock};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled by cargo features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(InpaintError::invalid_config(format!(
                    "{other:?} backend not compiled in (enable the '{}' feature)",
                    format!("{other:?}").to_lowercase()
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// What the handle builds its backend from on first use
enum PendingBackend {
    Factory(Box<dyn BackendFactory>),
    Ready(Box<dyn InferenceBackend>),
}

struct LoadedModel {
    backend: Mutex<Box<dyn InferenceBackend>>,
    info: ModelInfo,
    load_time: Duration,
}

/// Lazily initialized, shareable model handle
pub struct ModelHandle {
    config: InpaintConfig,
    pending: Mutex<Option<PendingBackend>>,
    state: OnceLock<std::result::Result<LoadedModel, String>>,
}

impl ModelHandle {
    /// Handle that loads `config.model_spec` with the default backend factory
    #[must_use]
    pub fn new(config: InpaintConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Handle that loads through a custom backend factory
    #[must_use]
    pub fn with_factory(config: InpaintConfig, factory: Box<dyn BackendFactory>) -> Self {
        Self {
            config,
            pending: Mutex::new(Some(PendingBackend::Factory(factory))),
            state: OnceLock::new(),
        }
    }

    /// Handle around an already constructed backend
    ///
    /// The backend is still initialized lazily on first use.
    #[must_use]
    pub fn from_backend(backend: Box<dyn InferenceBackend>, config: InpaintConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(Some(PendingBackend::Ready(backend))),
            state: OnceLock::new(),
        }
    }

    /// Handle that is unavailable from the start
    #[must_use]
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        let state = OnceLock::new();
        let _ = state.set(Err(reason.into()));
        Self {
            config: InpaintConfig::default(),
            pending: Mutex::new(None),
            state,
        }
    }

    /// Configuration the handle was created with
    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        &self.config
    }

    /// Whether a load has been attempted, successful or not
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Whether the model loaded (triggers the load on first call)
    pub fn is_available(&self) -> bool {
        self.loaded().is_ok()
    }

    /// Reason the model is unavailable, if it is
    pub fn unavailability_reason(&self) -> Option<String> {
        self.loaded().err().map(|e| e.to_string())
    }

    /// Metadata of the loaded model
    ///
    /// # Errors
    /// - `ModelUnavailable` when loading failed
    pub fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.loaded()?.info.clone())
    }

    /// Time the one-time model load took
    ///
    /// # Errors
    /// - `ModelUnavailable` when loading failed
    pub fn model_load_time(&self) -> Result<Duration> {
        Ok(self.loaded()?.load_time)
    }

    /// Run the model on packed tensors
    ///
    /// # Errors
    /// - `ModelUnavailable` when loading failed; no backend is invoked
    /// - Backend inference errors
    pub fn infer(&self, tensors: &InpaintingTensors) -> Result<Array4<f32>> {
        let model = self.loaded()?;
        let mut backend = model
            .backend
            .lock()
            .map_err(|_| InpaintError::inference("Model backend lock poisoned by an earlier panic"))?;
        backend.infer(tensors)
    }

    fn loaded(&self) -> Result<&LoadedModel> {
        self.state
            .get_or_init(|| self.load())
            .as_ref()
            .map_err(|reason| InpaintError::model_unavailable(reason.clone()))
    }

    fn load(&self) -> std::result::Result<LoadedModel, String> {
        let pending = match self.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        let result = pending
            .ok_or_else(|| InpaintError::internal("No backend source left to initialize"))
            .and_then(|pending| self.build(pending));

        match result {
            Ok(model) => {
                log::info!(
                    "✅ Inpainting model '{}' ready ({}x{} input, loaded in {}ms)",
                    model.info.name,
                    model.info.input_resolution(),
                    model.info.input_resolution(),
                    model.load_time.as_millis()
                );
                Ok(model)
            },
            Err(e) => {
                log::error!("❌ Inpainting model failed to initialize: {e}");
                Err(e.to_string())
            },
        }
    }

    fn build(&self, pending: PendingBackend) -> Result<LoadedModel> {
        let start = Instant::now();

        let mut backend = match pending {
            PendingBackend::Ready(backend) => backend,
            PendingBackend::Factory(factory) => {
                let model_manager = ModelManager::from_spec(&self.config.model_spec)?;
                log::debug!(
                    "Loading {} from {} with {:?} backend",
                    self.config.model_spec.display_name(),
                    model_manager.model_path().display(),
                    self.config.backend_type
                );
                factory.create_backend(self.config.backend_type, model_manager)?
            },
        };

        let load_time = backend
            .initialize(&self.config)?
            .unwrap_or_else(|| start.elapsed());
        let info = backend.get_model_info()?;

        Ok(LoadedModel {
            backend: Mutex::new(backend),
            info,
            load_time,
        })
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.get() {
            None => "pending".to_string(),
            Some(Ok(model)) => format!("loaded({})", model.info.name),
            Some(Err(reason)) => format!("unavailable({reason})"),
        };
        f.debug_struct("ModelHandle")
            .field("backend_type", &self.config.backend_type)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockInpaintingBackend;
    use crate::error::ErrorKind;
    use crate::models::ModelSpec;
    use std::sync::Arc;

    fn tensors(resolution: usize) -> InpaintingTensors {
        InpaintingTensors {
            image: Array4::zeros((1, 3, resolution, resolution)),
            mask: Array4::zeros((1, 1, resolution, resolution)),
        }
    }

    #[test]
    fn test_lazy_initialization_happens_once() {
        let backend = MockInpaintingBackend::new(16);
        let handle = ModelHandle::from_backend(Box::new(backend.clone()), InpaintConfig::default());

        assert!(backend.get_call_history().is_empty());
        assert!(handle.is_available());
        assert!(handle.is_available());
        handle.infer(&tensors(16)).unwrap();
        handle.infer(&tensors(16)).unwrap();

        assert_eq!(
            backend.get_call_history(),
            vec!["initialize", "infer", "infer"]
        );
        assert_eq!(handle.model_info().unwrap().name, "mock-lama");
        assert_eq!(handle.model_load_time().unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn test_failed_initialization_is_permanent() {
        let backend = MockInpaintingBackend::new_failing_init(16);
        let handle = ModelHandle::from_backend(Box::new(backend.clone()), InpaintConfig::default());

        let error = handle.infer(&tensors(16)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
        assert!(!handle.is_available());
        assert!(handle
            .unavailability_reason()
            .unwrap()
            .contains("initialization failed"));

        // One init attempt, and inference never reached the backend
        assert_eq!(backend.get_call_history(), vec!["initialize"]);
    }

    #[test]
    fn test_unavailable_handle() {
        let handle = ModelHandle::unavailable("weights missing");
        assert!(!handle.is_available());
        let error = handle.infer(&tensors(8)).unwrap_err();
        assert!(matches!(error, InpaintError::ModelUnavailable(_)));
        assert!(error.to_string().contains("weights missing"));
        assert!(format!("{handle:?}").contains("unavailable"));
    }

    #[test]
    fn test_missing_model_file_makes_handle_unavailable() {
        let config = InpaintConfig::builder()
            .model_spec(ModelSpec::from_path("/nonexistent/lama.onnx"))
            .build()
            .unwrap();
        let handle = ModelHandle::new(config);
        assert!(!handle.is_available());
        assert!(handle.model_info().is_err());
    }

    #[test]
    fn test_concurrent_first_use_initializes_once() {
        let backend = MockInpaintingBackend::new(8);
        let handle = Arc::new(ModelHandle::from_backend(
            Box::new(backend.clone()),
            InpaintConfig::default(),
        ));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.infer(&tensors(8)).is_ok())
            })
            .collect();
        for thread in threads {
            assert!(thread.join().unwrap());
        }

        let history = backend.get_call_history();
        assert_eq!(history.iter().filter(|c| *c == "initialize").count(), 1);
        assert_eq!(history.iter().filter(|c| *c == "infer").count(), 4);
    }

    #[test]
    fn test_default_factory_backends() {
        let factory = DefaultBackendFactory;
        let backends = factory.available_backends();
        #[cfg(feature = "onnx")]
        assert!(backends.contains(&BackendType::Onnx));
        #[cfg(feature = "tract")]
        assert!(backends.contains(&BackendType::Tract));
        assert!(backends.len() <= 2);
    }
}
