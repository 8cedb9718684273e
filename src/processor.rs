//! Inpainting invocation
//!
//! Packs the whole source and mask into model tensors, runs the shared model
//! and decodes its output. The region only decides which part of the output
//! is kept later; the model always sees the full frame.

use crate::{
    error::Result,
    session::ModelHandle,
    types::{Image, InpaintingRequest, PixelRegion},
    utils::ImagePreprocessor,
};
use image::DynamicImage;
use instant::Instant;
use tracing::{info as trace_info, instrument, span, Level};

/// Model output for one request
#[derive(Debug, Clone)]
pub struct InvocationOutput {
    /// Decoded model output at the model's resolution
    pub image: Image,
    /// Edited region in the source's logical coordinates
    pub region: PixelRegion,
    /// Name of the model that produced the output
    pub model_name: String,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
}

/// Runs the inpainting model for a request
#[derive(Debug, Clone, Copy)]
pub struct InpaintingInvoker<'a> {
    handle: &'a ModelHandle,
}

impl<'a> InpaintingInvoker<'a> {
    #[must_use]
    pub fn new(handle: &'a ModelHandle) -> Self {
        Self { handle }
    }

    /// Invoke the model on a decoded request
    ///
    /// Runs synchronously; callers offload it to a blocking worker.
    ///
    /// # Errors
    /// - `ModelUnavailable` when the model failed to load; no inference is attempted
    /// - `InvalidArguments` for a region outside [0, 1]
    /// - `InferenceError` for tensor packing, runtime or output decoding failures
    #[instrument(
        skip_all,
        fields(
            source = %format!("{}x{}", request.source.dimensions().0, request.source.dimensions().1),
            mask = %format!("{}x{}", request.mask.dimensions().0, request.mask.dimensions().1)
        )
    )]
    pub fn invoke(&self, request: &InpaintingRequest) -> Result<InvocationOutput> {
        request.region.validate()?;
        let region = request.region.to_pixel_region(&request.source);

        let info = self.handle.model_info()?;
        let resolution = info.input_resolution();

        let preprocessing_start = Instant::now();
        let tensors = {
            let _span = span!(Level::DEBUG, "preprocessing", resolution = %resolution).entered();
            ImagePreprocessor::prepare(
                &request.source,
                &request.mask,
                resolution,
                self.handle.config(),
            )?
        };
        let preprocessing_ms = preprocessing_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output = {
            let _span = span!(Level::INFO, "inference", model = %info.name).entered();
            self.handle.infer(&tensors)?
        };
        let output_image = ImagePreprocessor::tensor_to_image(&output, info.output_scaling)?;
        let inference_ms = inference_start.elapsed().as_millis() as u64;

        trace_info!(
            model = %info.name,
            output = %format!("{}x{}", output_image.width(), output_image.height()),
            preprocessing_ms,
            inference_ms,
            "🔮 Inpainting model finished"
        );

        Ok(InvocationOutput {
            image: Image::new(DynamicImage::ImageRgb8(output_image)),
            region,
            model_name: info.name,
            preprocessing_ms,
            inference_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockInpaintingBackend;
    use crate::config::InpaintConfig;
    use crate::error::ErrorKind;
    use crate::types::NormalizedRegion;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn request(width: u32, height: u32) -> InpaintingRequest {
        let source = Image::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([200, 100, 50]),
        )));
        let mask = Image::new(DynamicImage::ImageLuma8(GrayImage::from_fn(
            width,
            height,
            |x, _| if x < width / 2 { Luma([255]) } else { Luma([0]) },
        )));
        InpaintingRequest::new(source, mask)
    }

    #[test]
    fn test_invoke_returns_model_resolution_output() {
        let backend = MockInpaintingBackend::new(32);
        let handle = ModelHandle::from_backend(Box::new(backend.clone()), InpaintConfig::default());

        let output = InpaintingInvoker::new(&handle).invoke(&request(64, 48)).unwrap();
        assert_eq!(output.image.dimensions(), (32, 32));
        assert_eq!(output.model_name, "mock-lama");
        assert_eq!(output.region.width, 64.0);
        assert_eq!(output.region.height, 48.0);

        let pixels = output.image.pixels().to_rgb8();
        assert_eq!(pixels.get_pixel(2, 2), &Rgb([0, 255, 0]));
        assert_eq!(pixels.get_pixel(30, 2), &Rgb([200, 100, 50]));
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_invoke_packs_full_frame_for_partial_region() {
        let backend = MockInpaintingBackend::new(16);
        let handle = ModelHandle::from_backend(Box::new(backend), InpaintConfig::default());
        let request = request(16, 16).with_region(NormalizedRegion::new(0.5, 0.5, 0.5, 0.5).unwrap());

        let output = InpaintingInvoker::new(&handle).invoke(&request).unwrap();
        assert_eq!(output.image.dimensions(), (16, 16));
        assert_eq!(output.region.x, 8.0);
        assert_eq!(output.region.width, 8.0);
    }

    #[test]
    fn test_byte_range_output_is_detected() {
        let backend = MockInpaintingBackend::new(8).with_byte_output();
        let handle = ModelHandle::from_backend(Box::new(backend), InpaintConfig::default());

        let output = InpaintingInvoker::new(&handle).invoke(&request(8, 8)).unwrap();
        let pixels = output.image.pixels().to_rgb8();
        assert_eq!(pixels.get_pixel(7, 7), &Rgb([200, 100, 50]));
        assert_eq!(pixels.get_pixel(0, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_unavailable_model_skips_inference() {
        let backend = MockInpaintingBackend::new_failing_init(8);
        let handle = ModelHandle::from_backend(Box::new(backend.clone()), InpaintConfig::default());

        let error = InpaintingInvoker::new(&handle).invoke(&request(8, 8)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
        assert!(!backend.get_call_history().contains(&"infer".to_string()));
    }

    #[test]
    fn test_inference_failure() {
        let backend = MockInpaintingBackend::new_failing_inference(8);
        let handle = ModelHandle::from_backend(Box::new(backend), InpaintConfig::default());

        let error = InpaintingInvoker::new(&handle).invoke(&request(8, 8)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InferenceError);
    }

    #[test]
    fn test_invalid_region_rejected() {
        let handle =
            ModelHandle::from_backend(Box::new(MockInpaintingBackend::new(8)), InpaintConfig::default());
        let mut request = request(8, 8);
        request.region = NormalizedRegion {
            x: 0.9,
            y: 0.0,
            width: 0.5,
            height: 1.0,
        };
        let error = InpaintingInvoker::new(&handle).invoke(&request).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArguments);
    }
}
