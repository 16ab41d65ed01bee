//! Raster encoding helpers.

use crate::types::{CaptureError, RasterPayload};
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;

/// Map a 0.0-1.0 quality onto the encoder's 1-100 scale
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode an image as JPEG. Alpha is dropped.
pub fn encode_jpeg(image: &DynamicImage, quality: f32) -> Result<Vec<u8>, CaptureError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality))
        .encode_image(&rgb)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Encode an image as PNG
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Build a `data:` URL from raw bytes
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Parse a base64 `data:` URL into a raster payload
pub fn from_data_url(data_url: &str) -> Result<RasterPayload, CaptureError> {
    let (header, data) = data_url
        .split_once(',')
        .ok_or_else(|| CaptureError::InvalidCapture("malformed data URL".to_string()))?;

    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(CaptureError::InvalidCapture(format!(
            "unsupported data URL header: {}",
            header
        )));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CaptureError::InvalidCapture(format!("base64 decode failed: {}", e)))?;
    Ok(RasterPayload::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.95), 95);
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(2.0), 100);
    }

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([0, 0, 0, 0])));
        let bytes = encode_jpeg(&image, 0.95).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_data_url_parsing() {
        let url = to_data_url("image/png", &[1, 2, 3, 4]);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(from_data_url(&url).unwrap().bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_data_url_rejects_garbage() {
        assert!(from_data_url("not a url").is_err());
        assert!(from_data_url("data:image/png,plain").is_err());
    }
}
