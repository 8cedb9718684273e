//! Recomposition of the model output onto the original image
//!
//! Three steps: scale the model output back to the source size, cut out the
//! edited region, and paint that patch over a copy of the original. Pixels
//! outside the region are never touched.

use crate::{
    config::{InpaintConfig, ResizeFilter, ResizePolicy},
    error::{InpaintError, Result},
    types::{Image, PixelRegion},
};
use image::{imageops, DynamicImage, GenericImageView, ImageBuffer, Pixel};
use tracing::{debug as trace_debug, instrument};

/// Resizes, crops and merges model output
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    policy: ResizePolicy,
    filter: ResizeFilter,
}

impl Compositor {
    #[must_use]
    pub fn new(policy: ResizePolicy, filter: ResizeFilter) -> Self {
        Self { policy, filter }
    }

    #[must_use]
    pub fn from_config(config: &InpaintConfig) -> Self {
        Self::new(config.resize_policy, config.resize_filter)
    }

    /// Run resize, crop and merge
    ///
    /// # Errors
    /// - `CropError` when the region does not fit the resized output
    /// - `CompositionError` when the canvas cannot be produced
    #[instrument(
        name = "composition",
        skip_all,
        fields(
            policy = ?self.policy,
            source = %format!("{}x{}", original.dimensions().0, original.dimensions().1),
            output = %format!("{}x{}", model_output.dimensions().0, model_output.dimensions().1)
        )
    )]
    pub fn composite(
        &self,
        original: &Image,
        model_output: &Image,
        region: &PixelRegion,
    ) -> Result<DynamicImage> {
        let resized = self.resize(model_output, original)?;
        let patch = self.crop(&resized, region)?;
        self.merge(original, &patch, region)
    }

    /// Scale the model output towards the original's pixel size
    ///
    /// The uniform factor `min(scaleX, scaleY)` is always computed, but only
    /// `AspectFit` applies it; `PerAxis` stretches each axis independently.
    /// The result carries the original's display scale.
    ///
    /// # Errors
    /// - `CompositionError` when either image is empty
    pub fn resize(&self, model_output: &Image, target: &Image) -> Result<Image> {
        let (target_width, target_height) = target.dimensions();
        let (output_width, output_height) = model_output.dimensions();

        if target_width == 0 || target_height == 0 || output_width == 0 || output_height == 0 {
            return Err(InpaintError::composition(format!(
                "Cannot resize {output_width}x{output_height} output to {target_width}x{target_height}"
            )));
        }

        let scale_x = target_width as f32 / output_width as f32;
        let scale_y = target_height as f32 / output_height as f32;
        let scale = scale_x.min(scale_y);

        let (width, height) = match self.policy {
            ResizePolicy::PerAxis => (
                Self::scaled_length(output_width, scale_x),
                Self::scaled_length(output_height, scale_y),
            ),
            ResizePolicy::AspectFit => (
                Self::scaled_length(output_width, scale),
                Self::scaled_length(output_height, scale),
            ),
        };

        trace_debug!(
            scale_x,
            scale_y,
            scale,
            width,
            height,
            "Resizing model output"
        );

        let pixels = if (width, height) == (output_width, output_height) {
            model_output.pixels().clone()
        } else {
            model_output
                .pixels()
                .resize_exact(width, height, self.filter.into())
        };

        Image::with_scale(pixels, target.scale())
    }

    /// Cut the region out of the resized output
    ///
    /// The region is in logical coordinates and converted with the image's
    /// pixels-per-point ratio. Its edges are rounded to whole pixels and
    /// clipped to the image.
    ///
    /// # Errors
    /// - `CropError` when nothing of the region lies inside the image
    pub fn crop(&self, resized: &Image, region: &PixelRegion) -> Result<Image> {
        let (pixel_width, pixel_height) = resized.dimensions();
        let (logical_width, _) = resized.logical_size();
        let to_pixel = pixel_width as f32 / logical_width;

        let scaled = region.scaled(to_pixel);
        let (x, y, width, height) = scaled.to_integer_rect((pixel_width, pixel_height));
        if width == 0 || height == 0 {
            return Err(InpaintError::crop(format!(
                "Region {scaled:?} does not overlap the {pixel_width}x{pixel_height} resized output"
            )));
        }

        let patch = resized.pixels().crop_imm(x, y, width, height);
        Image::with_scale(patch, resized.scale())
    }

    /// Paint the patch over a copy of the original
    ///
    /// The patch is drawn source-over at the region's pixel location, clipped
    /// to the canvas and rescaled first if its size differs from the placement
    /// rectangle. The canvas is RGBA8 for 8-bit sources and RGBA16 for deeper
    /// ones; float sources are quantized to 16 bits.
    ///
    /// # Errors
    /// - `CompositionError` for an empty canvas or placement rectangle
    pub fn merge(&self, original: &Image, patch: &Image, region: &PixelRegion) -> Result<DynamicImage> {
        let (canvas_width, canvas_height) = original.dimensions();
        if canvas_width == 0 || canvas_height == 0 {
            return Err(InpaintError::composition("Cannot allocate an empty canvas"));
        }

        let rect = region
            .scaled(original.scale())
            .to_integer_rect((canvas_width, canvas_height));
        let (x, y, width, height) = rect;
        if width == 0 || height == 0 {
            return Err(InpaintError::composition(format!(
                "Placement rectangle {width}x{height}+{x}+{y} is empty"
            )));
        }

        let merged = if Self::is_eight_bit(original.pixels()) {
            DynamicImage::ImageRgba8(self.paint(
                original.pixels().to_rgba8(),
                &patch.pixels().to_rgba8(),
                rect,
            ))
        } else {
            DynamicImage::ImageRgba16(self.paint(
                original.pixels().to_rgba16(),
                &patch.pixels().to_rgba16(),
                rect,
            ))
        };
        Ok(merged)
    }

    fn paint<P>(
        &self,
        mut canvas: ImageBuffer<P, Vec<P::Subpixel>>,
        patch: &ImageBuffer<P, Vec<P::Subpixel>>,
        (x, y, width, height): (u32, u32, u32, u32),
    ) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        if patch.dimensions() == (width, height) {
            imageops::overlay(&mut canvas, patch, i64::from(x), i64::from(y));
        } else {
            log::debug!(
                "Scaling {}x{} patch to {width}x{height} placement",
                patch.width(),
                patch.height()
            );
            let scaled = imageops::resize(patch, width, height, self.filter.into());
            imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
        }
        canvas
    }

    fn is_eight_bit(image: &DynamicImage) -> bool {
        matches!(
            image,
            DynamicImage::ImageLuma8(_)
                | DynamicImage::ImageLumaA8(_)
                | DynamicImage::ImageRgb8(_)
                | DynamicImage::ImageRgba8(_)
        )
    }

    fn scaled_length(length: u32, factor: f32) -> u32 {
        ((length as f32 * factor).round() as u32).max(1)
    }
}
