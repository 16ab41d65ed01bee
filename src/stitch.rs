//! Segment stitching.
//!
//! Composites the ordered segments of a full-page run onto one white canvas.
//! Segment `i` is drawn at `vertical_offset - overlap * i`; the scroll driver
//! tags offsets so this lands each segment exactly at its scroll position.

use crate::types::{CaptureError, CapturedSegment};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, trace};

/// Composites captured segments into a single full-page raster
pub struct Stitcher {
    overlap_px: u32,
}

impl Stitcher {
    pub fn new(overlap_px: u32) -> Self {
        Self { overlap_px }
    }

    /// Where segment `index` lands on the canvas
    pub fn draw_position(&self, segment: &CapturedSegment, index: usize) -> i64 {
        segment.vertical_offset as i64 - self.overlap_px as i64 * index as i64
    }

    /// Stitch `segments` (in capture order) into a `page_width` x `total_height` image
    ///
    /// Consumes the segments. Any undecodable segment fails the whole stitch.
    pub fn stitch(
        &self,
        segments: Vec<CapturedSegment>,
        total_height: u32,
        page_width: u32,
    ) -> Result<DynamicImage, CaptureError> {
        if segments.is_empty() {
            return Err(CaptureError::EmptySegmentList);
        }

        let mut canvas = RgbaImage::from_pixel(page_width, total_height, Rgba([255, 255, 255, 255]));

        for (index, segment) in segments.iter().enumerate() {
            let decoded = segment
                .payload
                .decode()
                .map_err(|e| CaptureError::SegmentDecode {
                    index,
                    reason: e.to_string(),
                })?;

            let tile = normalize(decoded, page_width, segment.viewport_height);
            let y = self.draw_position(segment, index);
            trace!("Drawing segment {} ({}px tall) at y={}", index, tile.height(), y);

            // Flatten any transparency against the white canvas.
            imageops::overlay(&mut canvas, &tile, 0, y);
        }

        debug!(
            "Stitched {} segments into {}x{}",
            segments.len(),
            page_width,
            total_height
        );
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

/// Scale a segment whose raster width differs from the page width (HiDPI
/// captures) and keep at most one viewport of rows.
fn normalize(decoded: DynamicImage, page_width: u32, viewport_height: u32) -> RgbaImage {
    let mut tile = decoded.to_rgba8();

    if tile.width() != page_width && tile.width() > 0 {
        let scale = page_width as f64 / tile.width() as f64;
        let height = ((tile.height() as f64 * scale).round() as u32).max(1);
        tile = imageops::resize(&tile, page_width, height, FilterType::Triangle);
    }

    if tile.height() > viewport_height {
        tile = imageops::crop_imm(&tile, 0, 0, tile.width(), viewport_height).to_image();
    }

    tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_png;
    use crate::scroll::testing::row_color;
    use crate::types::RasterPayload;

    fn segment_at(page: &RgbaImage, scroll: u32, viewport: u32, index: u32) -> CapturedSegment {
        let view = imageops::crop_imm(page, 0, scroll, page.width(), viewport).to_image();
        CapturedSegment {
            payload: RasterPayload::new(encode_png(&DynamicImage::ImageRgba8(view)).unwrap()),
            vertical_offset: scroll + 50 * index,
            viewport_height: viewport,
        }
    }

    #[test]
    fn test_empty_segment_list() {
        let stitcher = Stitcher::new(50);
        assert!(matches!(
            stitcher.stitch(Vec::new(), 100, 100),
            Err(CaptureError::EmptySegmentList)
        ));
    }

    #[test]
    fn test_draw_position_subtracts_cumulative_overlap() {
        let stitcher = Stitcher::new(50);
        let segment = CapturedSegment {
            payload: RasterPayload::new(Vec::new()),
            vertical_offset: 1600,
            viewport_height: 1000,
        };
        assert_eq!(stitcher.draw_position(&segment, 2), 1500);
    }

    #[test]
    fn test_stitch_reproduces_page_without_gaps() {
        let page = RgbaImage::from_fn(6, 2500, |_, y| row_color(y));
        let segments = vec![
            segment_at(&page, 0, 1000, 0),
            segment_at(&page, 950, 1000, 1),
            segment_at(&page, 1500, 1000, 2),
        ];

        let stitched = Stitcher::new(50).stitch(segments, 2500, 6).unwrap().to_rgba8();
        assert_eq!(stitched.dimensions(), (6, 2500));
        for y in 0..2500 {
            assert_eq!(*stitched.get_pixel(3, y), row_color(y), "row {y}");
        }
    }

    #[test]
    fn test_transparent_regions_become_white() {
        let clear = RgbaImage::from_pixel(4, 10, Rgba([0, 0, 0, 0]));
        let segment = CapturedSegment {
            payload: RasterPayload::new(encode_png(&DynamicImage::ImageRgba8(clear)).unwrap()),
            vertical_offset: 0,
            viewport_height: 10,
        };

        let stitched = Stitcher::new(50).stitch(vec![segment], 10, 4).unwrap().to_rgba8();
        assert_eq!(*stitched.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_hidpi_segment_scaled_to_page_width() {
        let wide = RgbaImage::from_pixel(8, 20, Rgba([10, 20, 30, 255]));
        let segment = CapturedSegment {
            payload: RasterPayload::new(encode_png(&DynamicImage::ImageRgba8(wide)).unwrap()),
            vertical_offset: 0,
            viewport_height: 10,
        };

        let stitched = Stitcher::new(50).stitch(vec![segment], 10, 4).unwrap().to_rgba8();
        assert_eq!(stitched.dimensions(), (4, 10));
        assert_eq!(*stitched.get_pixel(3, 9), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_failure_names_segment() {
        let page = RgbaImage::from_fn(6, 2000, |_, y| row_color(y));
        let mut broken = segment_at(&page, 950, 1000, 1);
        broken.payload = RasterPayload::new(vec![9, 9, 9]);
        let segments = vec![segment_at(&page, 0, 1000, 0), broken];

        match Stitcher::new(50).stitch(segments, 2000, 6) {
            Err(CaptureError::SegmentDecode { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
