//! Core types for object removal operations

use crate::{
    config::OutputFormat,
    error::{InpaintError, Result},
    services::OutputFormatHandler,
};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// In-memory raster with a display scale factor
///
/// The logical size is the pixel size divided by `scale`. Decoded images always
/// carry a scale of 1.0; the factor only matters for callers that hand in images
/// rendered for high-density displays.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: DynamicImage,
    scale: f32,
}

impl Image {
    /// Wrap decoded pixels at scale 1.0
    #[must_use]
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels, scale: 1.0 }
    }

    /// Wrap pixels with an explicit display scale
    ///
    /// # Errors
    /// - Scale is not a finite positive number
    pub fn with_scale(pixels: DynamicImage, scale: f32) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(InpaintError::invalid_arguments(format!(
                "image scale must be a positive number, got {scale}"
            )));
        }
        Ok(Self { pixels, scale })
    }

    #[must_use]
    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Pixel buffer dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Logical (point) dimensions
    #[must_use]
    pub fn logical_size(&self) -> (f32, f32) {
        let (width, height) = self.pixels.dimensions();
        (width as f32 / self.scale, height as f32 / self.scale)
    }
}

/// Rectangle in fractional coordinates relative to an image's extent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRegion {
    /// The whole image
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Create a validated region
    ///
    /// # Errors
    /// - Any component outside [0, 1], non-finite, or extending past the image edge
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        let region = Self {
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    /// Check the [0,1] invariant
    ///
    /// # Errors
    /// - Any component outside [0, 1], non-finite, or extending past the image edge
    pub fn validate(&self) -> Result<()> {
        let components = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in components {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(InpaintError::invalid_arguments(format!(
                    "region {name} must lie in [0, 1], got {value}"
                )));
            }
        }
        // Small tolerance for values produced by float arithmetic on the host side
        if self.x + self.width > 1.0 + f32::EPSILON || self.y + self.height > 1.0 + f32::EPSILON
        {
            return Err(InpaintError::invalid_arguments(format!(
                "region ({}, {}, {}, {}) extends past the image edge",
                self.x, self.y, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Scale to the logical size of `image`
    #[must_use]
    pub fn to_pixel_region(&self, image: &Image) -> PixelRegion {
        let (width, height) = image.logical_size();
        PixelRegion {
            x: self.x * width,
            y: self.y * height,
            width: self.width * width,
            height: self.height * height,
        }
    }
}

impl Default for NormalizedRegion {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rectangle in absolute (logical) pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRegion {
    /// Multiply every component by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Integer rectangle `(x, y, width, height)` clipped to `bounds`
    ///
    /// Edges are rounded rather than sizes, so a region ending on the image
    /// edge still ends there. Negative edges clamp to zero.
    #[must_use]
    pub fn to_integer_rect(&self, bounds: (u32, u32)) -> (u32, u32, u32, u32) {
        let edge = |value: f32, limit: u32| (value.round().max(0.0) as u32).min(limit);
        let (left, right) = (edge(self.x, bounds.0), edge(self.x + self.width, bounds.0));
        let (top, bottom) = (edge(self.y, bounds.1), edge(self.y + self.height, bounds.1));
        (left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }
}

/// One source image paired with its mask and the region being edited
#[derive(Debug, Clone)]
pub struct InpaintingRequest {
    pub source: Image,
    pub mask: Image,
    pub region: NormalizedRegion,
}

impl InpaintingRequest {
    /// Full-frame request
    #[must_use]
    pub fn new(source: Image, mask: Image) -> Self {
        Self {
            source,
            mask,
            region: NormalizedRegion::FULL,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: NormalizedRegion) -> Self {
        self.region = region;
        self
    }
}

/// Successful outcome of a request
#[derive(Debug, Clone)]
pub struct InpaintingOutput {
    /// The composited image at the source's pixel dimensions
    pub image: DynamicImage,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl InpaintingOutput {
    #[must_use]
    pub fn new(image: DynamicImage, metadata: ProcessingMetadata) -> Self {
        Self { image, metadata }
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get the image as encoded bytes in the specified format
    ///
    /// # Errors
    /// - Encoder failures
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        OutputFormatHandler::encode(&self.image, format)
    }

    /// Save the result as PNG
    ///
    /// # Errors
    /// - File I/O or encoder failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save(path, OutputFormat::Png)
    }

    /// Save in the specified format
    ///
    /// # Errors
    /// - File I/O or encoder failures
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        let bytes = self.to_bytes(format)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Either a composited image or the reason there is none
pub type InpaintingResult = Result<InpaintingOutput>;

/// Detailed timing breakdown for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first request only)
    pub model_load_ms: u64,

    /// Decoding both input buffers
    pub image_decode_ms: u64,

    /// Tensor packaging of image and mask
    pub preprocessing_ms: u64,

    /// Model execution
    pub inference_ms: u64,

    /// Resize, crop and merge
    pub composition_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent inside the model
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Preprocess: {}ms | Inference: {}ms | Composite: {}ms",
            self.total_ms,
            self.image_decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.composition_ms
        )
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// Model used for inference
    pub model_name: String,

    /// Source image pixel dimensions
    pub source_dimensions: (u32, u32),

    /// Model output pixel dimensions
    pub model_output_dimensions: (u32, u32),

    /// Region that was replaced, in pixel coordinates
    pub region: Option<PixelRegion>,
}
