//! Tensor packaging for inpainting models
//!
//! Both inputs are stretched to the model's square resolution without padding:
//! the model sees the whole frame, and the compositor undoes the stretch later.

use crate::{
    config::{InpaintConfig, ResizeFilter},
    error::{InpaintError, Result},
    inference::{validate_output_shape, InpaintingTensors},
    models::OutputScaling,
    types::Image,
};
use image::{imageops, DynamicImage, GrayImage, RgbImage};
use ndarray::Array4;

/// Output values above this are taken to be in [0, 255]
const BYTE_RANGE_DETECTION_THRESHOLD: f32 = 1.5;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Pack source and mask into model input tensors
    ///
    /// # Errors
    /// - Zero resolution or empty input images
    pub fn prepare(
        source: &Image,
        mask: &Image,
        resolution: u32,
        config: &InpaintConfig,
    ) -> Result<InpaintingTensors> {
        let image = Self::image_to_tensor(source.pixels(), resolution, config.resize_filter)?;
        let mask = Self::mask_to_tensor(
            mask.pixels(),
            resolution,
            config.mask_threshold,
            config.resize_filter,
        )?;
        Ok(InpaintingTensors { image, mask })
    }

    /// RGB image to `[1, 3, R, R]` in [0, 1]
    ///
    /// # Errors
    /// - Zero resolution or empty image
    pub fn image_to_tensor(
        image: &DynamicImage,
        resolution: u32,
        filter: ResizeFilter,
    ) -> Result<Array4<f32>> {
        Self::check_dimensions(image, resolution, "source")?;

        let rgb = image.to_rgb8();
        let rgb = if rgb.dimensions() == (resolution, resolution) {
            rgb
        } else {
            imageops::resize(&rgb, resolution, resolution, filter.into())
        };

        let size = resolution as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match the resized image
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = f32::from(pixel[channel]) / 255.0;
            }
        }
        Ok(tensor)
    }

    /// Mask image to binary `[1, 1, R, R]`
    ///
    /// A pixel is marked for removal when its luma is strictly greater than
    /// `threshold`, so white selects and black keeps.
    ///
    /// # Errors
    /// - Zero resolution or empty mask
    pub fn mask_to_tensor(
        mask: &DynamicImage,
        resolution: u32,
        threshold: u8,
        filter: ResizeFilter,
    ) -> Result<Array4<f32>> {
        Self::check_dimensions(mask, resolution, "mask")?;

        let luma: GrayImage = mask.to_luma8();
        let luma = if luma.dimensions() == (resolution, resolution) {
            luma
        } else {
            imageops::resize(&luma, resolution, resolution, filter.into())
        };

        let size = resolution as usize;
        let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
        #[allow(clippy::indexing_slicing)]
        for (x, y, pixel) in luma.enumerate_pixels() {
            if pixel[0] > threshold {
                tensor[[0, 0, y as usize, x as usize]] = 1.0;
            }
        }
        Ok(tensor)
    }

    /// Model output `[1, 3, H, W]` to an RGB image of `W x H`
    ///
    /// # Errors
    /// - Output tensor with the wrong shape
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tensor_to_image(output: &Array4<f32>, scaling: OutputScaling) -> Result<RgbImage> {
        validate_output_shape(output)?;
        let (_, _, height, width) = output.dim();

        let factor = match Self::resolve_scaling(output, scaling) {
            OutputScaling::Byte => 1.0,
            OutputScaling::Unit | OutputScaling::Auto => 255.0,
        };
        log::debug!("Decoding {width}x{height} model output (scale factor {factor})");

        let width = u32::try_from(width)
            .map_err(|_| InpaintError::inference("Model output width exceeds u32"))?;
        let height = u32::try_from(height)
            .map_err(|_| InpaintError::inference("Model output height exceeds u32"))?;

        #[allow(clippy::indexing_slicing)]
        let image = RgbImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let channel = |c: usize| {
                let value = output[[0, c, y, x]] * factor;
                if value.is_nan() {
                    0
                } else {
                    value.round().clamp(0.0, 255.0) as u8
                }
            };
            image::Rgb([channel(0), channel(1), channel(2)])
        });
        Ok(image)
    }

    /// Resolve `Auto` against the actual tensor values
    #[must_use]
    pub fn resolve_scaling(output: &Array4<f32>, scaling: OutputScaling) -> OutputScaling {
        match scaling {
            OutputScaling::Auto => {
                let max = output.iter().copied().fold(f32::MIN, f32::max);
                if max > BYTE_RANGE_DETECTION_THRESHOLD {
                    OutputScaling::Byte
                } else {
                    OutputScaling::Unit
                }
            },
            explicit => explicit,
        }
    }

    fn check_dimensions(image: &DynamicImage, resolution: u32, what: &str) -> Result<()> {
        if resolution == 0 {
            return Err(InpaintError::inference("Model input resolution must be positive"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(InpaintError::inference(format!(
                "Cannot pack empty {what} image ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(())
    }
}
