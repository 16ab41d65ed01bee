//! Region cropping for region captures.

use crate::types::{CaptureError, RasterPayload, Rect};
use image::DynamicImage;
use tracing::debug;

/// Crops a rectangle out of a full-viewport raster at 1:1 pixel scale
pub struct RegionCropper;

impl RegionCropper {
    /// Decode the viewport raster and crop `rect` out of it
    pub fn crop_payload(payload: &RasterPayload, rect: Rect) -> Result<DynamicImage, CaptureError> {
        let viewport = payload
            .decode()
            .map_err(|e| CaptureError::InvalidCapture(e.to_string()))?;
        Self::crop(&viewport, rect)
    }

    /// Crop `rect` (viewport coordinates) out of `viewport`
    ///
    /// The rectangle is clipped to the raster; a rectangle lying entirely
    /// outside it is an error.
    pub fn crop(viewport: &DynamicImage, rect: Rect) -> Result<DynamicImage, CaptureError> {
        let left = rect.left.max(0) as u32;
        let top = rect.top.max(0) as u32;
        let right = (rect.left as i64 + rect.width as i64).min(viewport.width() as i64);
        let bottom = (rect.top as i64 + rect.height as i64).min(viewport.height() as i64);

        if right <= left as i64 || bottom <= top as i64 {
            return Err(CaptureError::InvalidCapture(format!(
                "region {:?} lies outside the {}x{} viewport",
                rect,
                viewport.width(),
                viewport.height()
            )));
        }

        let width = right as u32 - left;
        let height = bottom as u32 - top;
        if (width, height) != (rect.width, rect.height) {
            debug!(
                "Region {:?} clipped to {}x{} at ({}, {})",
                rect, width, height, left, top
            );
        }

        Ok(viewport.crop_imm(left, top, width, height))
    }
}
