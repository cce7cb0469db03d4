use crate::types::*;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat, RgbImage};
use std::io::Cursor;

#[derive(Debug, Clone, Copy)]
pub struct CompressionSettings {
    pub min_quality: u8,
    pub max_quality: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            min_quality: MIN_QUALITY,
            max_quality: MAX_QUALITY,
        }
    }
}

/// A JPEG produced by the quality search.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub quality: u8,
    /// False when even the lowest quality overshot the target.
    pub met_target: bool,
}

pub struct ImageProcessor {
    compression_settings: CompressionSettings,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            compression_settings: CompressionSettings::default(),
        }
    }

    pub fn with_settings(settings: CompressionSettings) -> Self {
        Self {
            compression_settings: settings,
        }
    }

    pub fn decode(&self, content: &[u8]) -> Result<DynamicImage, ConversionError> {
        Ok(image::load_from_memory(content)?)
    }

    /// Compress an image to JPEG, aiming for at most `target_kb` kilobytes.
    ///
    /// Alpha is discarded. The result may still exceed the target; check
    /// [`CompressedImage::met_target`].
    pub fn compress_to_target(
        &self,
        img: &DynamicImage,
        target_kb: u64,
    ) -> Result<CompressedImage, ConversionError> {
        let rgb = img.to_rgb8();
        let target_bytes = target_kb.saturating_mul(1024);

        let result = self.search_quality(target_bytes, |quality| self.encode_jpeg(&rgb, quality))?;

        log::info!(
            "JPEG {}x{} compressed to {} bytes at quality {} (target {} bytes{})",
            rgb.width(),
            rgb.height(),
            result.bytes.len(),
            result.quality,
            target_bytes,
            if result.met_target { "" } else { ", not reachable" }
        );
        Ok(result)
    }

    /// Binary search for the highest quality whose encoding fits `target_bytes`.
    ///
    /// Exactly one encode per probe. If no probe fits, the minimum quality is
    /// encoded once more and returned as is.
    pub fn search_quality<E, F>(&self, target_bytes: u64, mut encode: F) -> Result<CompressedImage, E>
    where
        F: FnMut(u8) -> Result<Vec<u8>, E>,
    {
        let mut low = self.compression_settings.min_quality as i32;
        let mut high = self.compression_settings.max_quality as i32;
        let mut best: Option<CompressedImage> = None;

        while low <= high {
            let mid = (low + high) / 2;
            let encoded = encode(mid as u8)?;

            if encoded.len() as u64 <= target_bytes {
                best = Some(CompressedImage {
                    bytes: encoded,
                    quality: mid as u8,
                    met_target: true,
                });
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }

        match best {
            Some(found) => Ok(found),
            None => {
                let quality = self.compression_settings.min_quality;
                Ok(CompressedImage {
                    bytes: encode(quality)?,
                    quality,
                    met_target: false,
                })
            }
        }
    }

    /// Encode as baseline JPEG with the given quality (1-100).
    pub fn encode_jpeg(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>, ConversionError> {
        let mut output = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
            encoder.encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)?;
        }
        Ok(output)
    }

    pub fn encode_png(&self, img: &DynamicImage) -> Result<Vec<u8>, ConversionError> {
        let mut output = Vec::new();
        img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
        Ok(output)
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ (x * y).wrapping_add(seed);
        image::Rgb([(v % 251) as u8, ((v >> 3) % 241) as u8, ((x + y + seed) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}
