// src/services/conversion_engine.rs
//
// Conversion Engine
//
// Decodes source bytes and re-encodes them in a target format.
//
// CRITICAL RULES:
// - Pure from the resolver's perspective: bytes in, bytes out
// - No caching, no I/O; callers own every side effect
// - CPU/memory bound, so the resolver runs it on the blocking pool

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::domain::MimeFormat;
use crate::error::{ResolutionError, ResolveResult};

#[cfg_attr(test, mockall::automock)]
pub trait ConversionEngine: Send + Sync {
    /// Re-encode `bytes` as `target`
    fn convert(&self, bytes: &[u8], target: &MimeFormat) -> ResolveResult<Vec<u8>>;
}

/// Still-image conversion backed by the `image` crate
#[derive(Debug, Clone)]
pub struct ImageConversionEngine {
    jpeg_quality: u8,
}

impl ImageConversionEngine {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Targets this engine can encode
    pub fn supports(target: &MimeFormat) -> bool {
        Self::output_format(target).is_some()
    }

    fn output_format(target: &MimeFormat) -> Option<ImageFormat> {
        match target.as_str() {
            "image/jpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::WebP),
            "image/bmp" => Some(ImageFormat::Bmp),
            "image/tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

impl Default for ImageConversionEngine {
    fn default() -> Self {
        Self::new(90)
    }
}

impl ConversionEngine for ImageConversionEngine {
    fn convert(&self, bytes: &[u8], target: &MimeFormat) -> ResolveResult<Vec<u8>> {
        let output_format = Self::output_format(target).ok_or_else(|| {
            ResolutionError::ConversionFailed(format!("Unsupported target format: {}", target))
        })?;

        let decoded = image::load_from_memory(bytes).map_err(|e| {
            ResolutionError::ConversionFailed(format!("Failed to decode source: {}", e))
        })?;

        let mut encoded = Vec::new();
        let mut cursor = Cursor::new(&mut encoded);

        let result = match output_format {
            // JPEG carries no alpha channel
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality);
                DynamicImage::ImageRgb8(decoded.to_rgb8()).write_with_encoder(encoder)
            }
            other => DynamicImage::ImageRgba8(decoded.to_rgba8()).write_to(&mut cursor, other),
        };

        result.map_err(|e| {
            ResolutionError::ConversionFailed(format!("Failed to encode as {}: {}", target, e))
        })?;

        Ok(encoded)
    }
}
