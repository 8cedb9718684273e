//! Async object removal front end
//!
//! Decoding runs on the caller's task; inference and composition run on one
//! blocking worker. A cancelled request resolves to `Cancelled` and the
//! worker's eventual result is dropped.

use crate::{
    compositor::Compositor,
    config::InpaintConfig,
    error::{InpaintError, Result},
    processor::InpaintingInvoker,
    services::RequestDecoder,
    session::ModelHandle,
    types::{
        InpaintingOutput, InpaintingRequest, InpaintingResult, NormalizedRegion,
        ProcessingMetadata, ProcessingTimings,
    },
};
use instant::Instant;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info as trace_info, instrument};

/// Removes masked objects with a shared inpainting model
#[derive(Debug, Clone)]
pub struct ObjectRemover {
    handle: Arc<ModelHandle>,
    compositor: Compositor,
}

impl ObjectRemover {
    /// Create a remover whose model is loaded from `config` on first use
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn new(config: InpaintConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_model_handle(Arc::new(ModelHandle::new(config))))
    }

    /// Create a remover around an existing model handle
    #[must_use]
    pub fn with_model_handle(handle: Arc<ModelHandle>) -> Self {
        let compositor = Compositor::from_config(handle.config());
        Self { handle, compositor }
    }

    #[must_use]
    pub fn model_handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        self.handle.config()
    }

    /// Decode two encoded buffers and remove the masked object
    ///
    /// # Errors
    /// - `InvalidArguments` or `Decode` from the request buffers
    /// - Everything [`ObjectRemover::process_request`] returns
    #[instrument(skip_all, fields(region = ?region))]
    pub async fn remove_object(
        &self,
        source_bytes: Option<&[u8]>,
        mask_bytes: Option<&[u8]>,
        region: NormalizedRegion,
        cancel: &CancellationToken,
    ) -> InpaintingResult {
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let request = RequestDecoder::decode_request(source_bytes, mask_bytes, region)?;
        let image_decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut output = self.process_request(request, cancel).await?;
        output.metadata.timings.image_decode_ms = image_decode_ms;
        output.metadata.timings.total_ms = total_start.elapsed().as_millis() as u64;

        trace_info!(timings = %output.metadata.timings.summary(), "✅ Object removed");
        Ok(output)
    }

    /// Run inference and composition for a decoded request on a blocking worker
    ///
    /// # Errors
    /// - `Cancelled` when `cancel` fires before the worker finishes
    /// - `ModelUnavailable`, `Inference`, `Crop` or `Composition` from the pipeline
    pub async fn process_request(
        &self,
        request: InpaintingRequest,
        cancel: &CancellationToken,
    ) -> InpaintingResult {
        if cancel.is_cancelled() {
            return Err(InpaintError::Cancelled);
        }

        let remover = self.clone();
        let worker = tokio::task::spawn_blocking(move || remover.remove_object_blocking(&request));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                log::debug!("Request cancelled; dropping the worker's result");
                Err(InpaintError::Cancelled)
            },
            joined = worker => match joined {
                Ok(result) => result,
                Err(e) => Err(InpaintError::internal(format!("Inpainting worker failed: {e}"))),
            },
        }
    }

    /// Synchronous pipeline: invoke the model, then composite
    ///
    /// # Errors
    /// - `ModelUnavailable`, `Inference`, `Crop` or `Composition`
    pub fn remove_object_blocking(&self, request: &InpaintingRequest) -> InpaintingResult {
        let total_start = Instant::now();
        let model_was_loaded = self.handle.is_initialized();

        let invocation = InpaintingInvoker::new(&self.handle).invoke(request)?;

        let composition_start = Instant::now();
        let image = self
            .compositor
            .composite(&request.source, &invocation.image, &invocation.region)?;
        let composition_ms = composition_start.elapsed().as_millis() as u64;

        let model_load_ms = if model_was_loaded {
            0
        } else {
            self.handle
                .model_load_time()
                .map_or(0, |duration| duration.as_millis() as u64)
        };

        let metadata = ProcessingMetadata {
            timings: ProcessingTimings {
                model_load_ms,
                image_decode_ms: 0,
                preprocessing_ms: invocation.preprocessing_ms,
                inference_ms: invocation.inference_ms,
                composition_ms,
                total_ms: total_start.elapsed().as_millis() as u64,
            },
            model_name: invocation.model_name,
            source_dimensions: request.source.dimensions(),
            model_output_dimensions: invocation.image.dimensions(),
            region: Some(invocation.region),
        };

        Ok(InpaintingOutput::new(image, metadata))
    }
}
