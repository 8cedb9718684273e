//! Output format handling service
//!
//! Encodes composited images into the lossless output formats. PNG is the wire
//! format of the `removeObject` response.

use crate::{
    config::OutputFormat,
    error::{InpaintError, Result},
};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an image into the given format
    ///
    /// # Errors
    /// - Encoder failure, or WebP requested without the `webp-support` feature
    ///
    /// # Examples
    /// ```rust
    /// use imgly_objremove::{services::OutputFormatHandler, OutputFormat};
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
    /// let bytes = OutputFormatHandler::encode(&image, OutputFormat::Png)?;
    /// assert_eq!(&bytes[1..4], b"PNG");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
        let image_format = Self::image_format(format)?;

        // The WebP encoder only takes 8-bit buffers
        let narrowed;
        let color = image.color();
        let image = if format == OutputFormat::WebP
            && color.bytes_per_pixel() != color.channel_count()
        {
            narrowed = DynamicImage::ImageRgba8(image.to_rgba8());
            &narrowed
        } else {
            image
        };

        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), image_format)
            .map_err(|e| {
                InpaintError::composition(format!(
                    "Failed to encode {}x{} image as {}: {e}",
                    image.width(),
                    image.height(),
                    Self::get_extension(format)
                ))
            })?;

        log::debug!(
            "Encoded {}x{} image as {} ({} bytes)",
            image.width(),
            image.height(),
            Self::get_extension(format),
            buffer.len()
        );
        Ok(buffer)
    }

    fn image_format(format: OutputFormat) -> Result<ImageFormat> {
        match format {
            OutputFormat::Png => Ok(ImageFormat::Png),
            OutputFormat::Tiff => Ok(ImageFormat::Tiff),
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => Ok(ImageFormat::WebP),
            #[cfg(not(feature = "webp-support"))]
            OutputFormat::WebP => Err(InpaintError::composition(
                "WebP output requires the 'webp-support' feature",
            )),
        }
    }

    /// Get the appropriate file extension for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use imgly_objremove::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Tiff), "tiff");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Infer the output format from a file extension, if recognized
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<OutputFormat> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(5, 3, |x, y| {
            Rgba([(x * 40) as u8, (y * 80) as u8, 200, 255])
        }))
    }

    #[test]
    fn test_png_is_lossless() {
        let image = sample();
        let bytes = OutputFormatHandler::encode(&image, OutputFormat::Png).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (5, 3));
        assert_eq!(decoded.to_rgba8(), image.to_rgba8());
    }

    #[test]
    fn test_tiff_encoding() {
        let bytes = OutputFormatHandler::encode(&sample(), OutputFormat::Tiff).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (5, 3));
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_encoding() {
        let bytes = OutputFormatHandler::encode(&sample(), OutputFormat::WebP).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_narrows_sixteen_bit_images() {
        let deep = DynamicImage::ImageRgba16(sample().to_rgba16());
        let bytes = OutputFormatHandler::encode(&deep, OutputFormat::WebP).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), sample().to_rgba8());
    }

    #[test]
    fn test_png_keeps_sixteen_bit_depth() {
        let deep = DynamicImage::ImageRgba16(image::ImageBuffer::from_fn(4, 2, |x, y| {
            Rgba([x as u16 * 4001 + 7, y as u16 * 9001 + 3, 12_345, u16::MAX])
        }));
        let bytes = OutputFormatHandler::encode(&deep, OutputFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgba16(), deep.to_rgba16());
    }

    #[test]
    fn test_get_extension() {
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
        assert_eq!(
            OutputFormatHandler::get_extension(OutputFormat::WebP),
            "webp"
        );
        assert_eq!(
            OutputFormatHandler::get_extension(OutputFormat::Tiff),
            "tiff"
        );
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(
            OutputFormatHandler::from_extension("TIF"),
            Some(OutputFormat::Tiff)
        );
        assert_eq!(
            OutputFormatHandler::from_extension("png"),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormatHandler::from_extension("jpg"), None);
    }
}
