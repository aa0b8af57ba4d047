//! Image decoding and ViT input preparation.
//!
//! 1. Decode bytes (PNG, JPEG, WebP, GIF) and convert to RGB8
//! 2. If the longer side exceeds `max_side`, Lanczos3 downscale keeping aspect
//! 3. Resize to 224x224 bilinear, rescale to [0, 1], normalize with mean = std = 0.5
//! 4. Lay out channel-first for the patch convolution

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use crate::error::ExtractionError;

pub const VIT_IMAGE_SIZE: u32 = 224;
pub const VIT_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const VIT_STD: [f32; 3] = [0.5, 0.5, 0.5];

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    if bytes.is_empty() { return Err(ExtractionError::EmptyInput); }
    image::load_from_memory(bytes).map_err(|e| ExtractionError::Decode(e.to_string()))
}

/// RGB copy of `img`, bounded so neither side exceeds `max_side`.
pub fn bound_size(img: &DynamicImage, max_side: u32) -> RgbImage {
    if img.width().max(img.height()) > max_side {
        img.resize(max_side, max_side, FilterType::Lanczos3).to_rgb8()
    } else {
        img.to_rgb8()
    }
}

/// Normalized `[3, size, size]` pixel values, channel-major.
pub fn pixel_values(rgb: &RgbImage, size: u32) -> Vec<f32> {
    let resized = imageops::resize(rgb, size, size, FilterType::Triangle);
    let plane = (size * size) as usize;
    let mut out = vec![0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (f32::from(pixel[c]) / 255.0 - VIT_MEAN[c]) / VIT_STD[c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn large_images_are_bounded_keeping_aspect() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1600, 400, Rgb([10, 20, 30])));
        let out = bound_size(&img, 800);
        assert_eq!((out.width(), out.height()), (800, 200));
        let small = DynamicImage::ImageRgb8(RgbImage::new(300, 500));
        assert_eq!(bound_size(&small, 800).dimensions(), (300, 500));
    }

    #[test]
    fn pixels_are_centered_channel_major() {
        let values = pixel_values(&RgbImage::from_pixel(32, 32, Rgb([255, 0, 255])), 4);
        assert_eq!(values.len(), 48);
        assert!(values[..16].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(values[16..32].iter().all(|v| (*v + 1.0).abs() < 1e-6));
        assert!(values[32..].iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(decode(b"not an image"), Err(ExtractionError::Decode(_))));
        assert!(matches!(decode(&[]), Err(ExtractionError::EmptyInput)));
    }
}
