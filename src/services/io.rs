//! Image I/O operations service
//!
//! `RequestDecoder` turns the two raw byte buffers of a request into images;
//! `ImageIOService` covers the file and stream side used by the CLI.

use crate::{
    error::{InpaintError, Result},
    types::{Image, InpaintingRequest, NormalizedRegion},
};
use image::DynamicImage;
use std::path::Path;

/// Argument name of the source image bytes
pub const DEFAULT_IMAGE_ARGUMENT: &str = "defaultImage";

/// Argument name of the mask image bytes
pub const MASKED_IMAGE_ARGUMENT: &str = "maskedImage";

/// Decodes request buffers into images
pub struct RequestDecoder;

impl RequestDecoder {
    /// Decode the source and mask buffers
    ///
    /// Both images come back at scale 1.0. Nothing is validated beyond
    /// decodability; source and mask may differ in size.
    ///
    /// # Errors
    /// - `InvalidArguments` when a buffer is absent or empty
    /// - `Decode` naming the buffer that is not a supported image
    pub fn decode(
        source_bytes: Option<&[u8]>,
        mask_bytes: Option<&[u8]>,
    ) -> Result<(Image, Image)> {
        let source_bytes = Self::require(DEFAULT_IMAGE_ARGUMENT, source_bytes)?;
        let mask_bytes = Self::require(MASKED_IMAGE_ARGUMENT, mask_bytes)?;

        let source = Self::decode_one(DEFAULT_IMAGE_ARGUMENT, source_bytes)?;
        let mask = Self::decode_one(MASKED_IMAGE_ARGUMENT, mask_bytes)?;

        log::debug!(
            "Decoded request: source {}x{}, mask {}x{}",
            source.width(),
            source.height(),
            mask.width(),
            mask.height()
        );

        Ok((Image::new(source), Image::new(mask)))
    }

    /// Decode both buffers into a request for `region`
    ///
    /// # Errors
    /// - Same as [`RequestDecoder::decode`], plus an invalid region
    pub fn decode_request(
        source_bytes: Option<&[u8]>,
        mask_bytes: Option<&[u8]>,
        region: NormalizedRegion,
    ) -> Result<InpaintingRequest> {
        region.validate()?;
        let (source, mask) = Self::decode(source_bytes, mask_bytes)?;
        Ok(InpaintingRequest::new(source, mask).with_region(region))
    }

    fn require<'a>(name: &str, bytes: Option<&'a [u8]>) -> Result<&'a [u8]> {
        match bytes {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            Some(_) => Err(InpaintError::invalid_arguments(format!("{name} is empty"))),
            None => Err(InpaintError::invalid_arguments(format!("{name} is missing"))),
        }
    }

    fn decode_one(name: &'static str, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| InpaintError::decode(name, e))
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Read an encoded image file without decoding it
    ///
    /// # Errors
    /// - File missing or unreadable
    pub fn read_image_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(InpaintError::invalid_arguments(format!(
                "image file '{}' does not exist",
                path_ref.display()
            )));
        }

        let bytes = std::fs::read(path_ref)?;
        log::debug!("Read {} bytes from {}", bytes.len(), path_ref.display());
        Ok(bytes)
    }

    /// Read all bytes from an async reader
    ///
    /// # Errors
    /// - Stream read failure
    pub async fn read_from_reader<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
        Ok(buffer)
    }

    /// Write encoded bytes, creating the parent directory if needed
    ///
    /// # Errors
    /// - Directory creation or file write failure
    pub fn write_image_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path_ref, bytes)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path_ref.display());
        Ok(())
    }

    /// Check if a file path has a supported input image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{GenericImageView, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_decode_valid_pair() {
        let source = png_bytes(32, 24);
        let mask = png_bytes(16, 16);
        let (source, mask) = RequestDecoder::decode(Some(&source), Some(&mask)).unwrap();

        assert_eq!(source.dimensions(), (32, 24));
        assert_eq!(mask.dimensions(), (16, 16));
        assert_eq!(source.scale(), 1.0);
        assert_eq!(mask.pixels().dimensions(), (16, 16));
    }

    #[test]
    fn test_missing_or_empty_buffers() {
        let mask = png_bytes(4, 4);

        let error = RequestDecoder::decode(None, Some(&mask)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArguments);
        assert!(error.to_string().contains("defaultImage"));

        let error = RequestDecoder::decode(Some(&mask), Some(&[])).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArguments);
        assert!(error.to_string().contains("maskedImage"));
    }

    #[test]
    fn test_undecodable_buffers_name_the_input() {
        let valid = png_bytes(4, 4);
        let garbage = b"definitely not an image".to_vec();

        let error = RequestDecoder::decode(Some(&garbage), Some(&valid)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DecodeError);
        assert!(error.to_string().contains("defaultImage"));

        let error = RequestDecoder::decode(Some(&valid), Some(&garbage)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DecodeError);
        assert!(error.to_string().contains("maskedImage"));
    }

    #[test]
    fn test_decode_request_validates_region() {
        let bytes = png_bytes(8, 8);
        let bad_region = NormalizedRegion {
            x: 0.8,
            y: 0.0,
            width: 0.5,
            height: 0.5,
        };
        let error =
            RequestDecoder::decode_request(Some(&bytes), Some(&bytes), bad_region).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArguments);

        let request =
            RequestDecoder::decode_request(Some(&bytes), Some(&bytes), NormalizedRegion::FULL)
                .unwrap();
        assert_eq!(request.region, NormalizedRegion::FULL);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let bytes = png_bytes(3, 3);

        ImageIOService::write_image_bytes(&path, &bytes).unwrap();
        assert_eq!(ImageIOService::read_image_bytes(&path).unwrap(), bytes);
        assert!(ImageIOService::read_image_bytes(dir.path().join("missing.png")).is_err());
    }

    #[tokio::test]
    async fn test_read_from_reader() {
        let bytes = png_bytes(2, 2);
        let read = ImageIOService::read_from_reader(std::io::Cursor::new(bytes.clone()))
            .await
            .unwrap();
        assert_eq!(read, bytes);
    }

    #[test]
    fn test_supported_formats() {
        assert!(ImageIOService::is_supported_format("photo.JPG"));
        assert!(ImageIOService::is_supported_format("mask.png"));
        assert!(!ImageIOService::is_supported_format("notes.txt"));
        assert!(!ImageIOService::is_supported_format("no_extension"));
    }
}
