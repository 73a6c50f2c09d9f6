// src/services/image_processor.rs
use crate::errors::ReshapeError;
use bytes::Bytes;
use image::io::Reader;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Hard upper bound on what we accept at all.
const MAX_ACCEPTED_DIMENSION: u32 = 4096;

/// Inline image parts are base64 encoded, which adds about a third.
/// Keep the raw bytes under this so a request stays below ~20MB.
const MAX_INLINE_BYTES: usize = 14_000_000;

/// Blocking work; run it off the async workers.
pub struct ImageProcessor {
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Reads the dimensions from the image header without decoding pixels.
    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), ReshapeError> {
        let (width, height) = reader(data)?
            .into_dimensions()
            .map_err(|e| ReshapeError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        if width > MAX_ACCEPTED_DIMENSION || height > MAX_ACCEPTED_DIMENSION {
            return Err(ReshapeError::ImageProcessing(format!(
                "Image dimensions exceed {0}x{0}",
                MAX_ACCEPTED_DIMENSION
            )));
        }

        Ok((width, height))
    }

    /// Content sniffing; the declared multipart type is not trusted.
    pub fn detect_mime(&self, data: &[u8]) -> Result<&'static str, ReshapeError> {
        let format = reader(data)?
            .format()
            .ok_or_else(|| ReshapeError::ImageProcessing("Unrecognized image".to_string()))?;
        match format {
            ImageFormat::Png => Ok("image/png"),
            ImageFormat::Jpeg => Ok("image/jpeg"),
            ImageFormat::WebP => Ok("image/webp"),
            ImageFormat::Gif => Ok("image/gif"),
            other => Err(ReshapeError::ImageProcessing(format!(
                "Unsupported image format: {:?}",
                other
            ))),
        }
    }

    /// Validates an upload and shrinks it to the configured bound. Returns
    /// the bytes to keep and their mime type. Decodes the image once.
    pub fn prepare_upload(&self, data: &[u8]) -> Result<(Bytes, String), ReshapeError> {
        let mime = self.detect_mime(data)?;
        let (width, height) = self.validate_image(data)?;
        log::debug!("Upload is {}x{} {} ({} bytes)", width, height, mime, data.len());

        let img = load(data)?;
        let (img, bytes, mime) = match self.resize_if_needed(&img, self.max_dimension) {
            Some(resized) => {
                let png = encode(&resized, ImageFormat::Png)?;
                (resized, png, "image/png")
            }
            None => (img, data.to_vec(), mime),
        };
        let (bytes, mime) = match self.shrink_for_inline(&img, bytes.len())? {
            Some(jpeg) => (jpeg, "image/jpeg"),
            None => (bytes, mime),
        };
        Ok((Bytes::from(bytes), mime.to_string()))
    }

    /// Downscaled copy when either side exceeds `max_size`, `None` when the
    /// image already fits.
    pub fn resize_if_needed(&self, img: &DynamicImage, max_size: u32) -> Option<DynamicImage> {
        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return None;
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        Some(img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3))
    }

    /// JPEG re-encode when `encoded_len` bytes are too many to send inline.
    pub fn shrink_for_inline(
        &self,
        img: &DynamicImage,
        encoded_len: usize,
    ) -> Result<Option<Vec<u8>>, ReshapeError> {
        if encoded_len <= MAX_INLINE_BYTES {
            return Ok(None);
        }

        let (width, height) = img.dimensions();

        let scale_factor = ((MAX_INLINE_BYTES as f64 / encoded_len as f64).sqrt() * 0.9) as f32;
        let new_width = ((width as f32 * scale_factor) as u32).max(256);
        let new_height = ((height as f32 * scale_factor) as u32).max(256);

        // JPEG has no alpha channel.
        let resized = DynamicImage::ImageRgb8(
            img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
                .to_rgb8(),
        );
        encode(&resized, ImageFormat::Jpeg).map(Some)
    }
}

fn reader(data: &[u8]) -> Result<Reader<Cursor<&[u8]>>, ReshapeError> {
    Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ReshapeError::ImageProcessing(format!("Unrecognized image: {}", e)))
}

fn load(data: &[u8]) -> Result<DynamicImage, ReshapeError> {
    reader(data)?
        .decode()
        .map_err(|e| ReshapeError::ImageProcessing(format!("Invalid image format: {}", e)))
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ReshapeError> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), format)
        .map_err(|e| ReshapeError::ImageProcessing(format!("Failed to encode resized image: {}", e)))?;
    Ok(output)
}
