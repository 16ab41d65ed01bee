//! Single-page PDF encoding of a JPEG raster.

use crate::types::CaptureError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// A4 in millimetres (portrait)
const A4_MM: (f32, f32) = (210.0, 297.0);
const PT_PER_MM: f32 = 72.0 / 25.4;

/// Page size and image placement, in PDF points measured from the top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub image_x: f32,
    pub image_y: f32,
    pub image_width: f32,
    pub image_height: f32,
}

impl PageLayout {
    pub fn is_landscape(&self) -> bool {
        self.page_width > self.page_height
    }

    /// A4 page, landscape iff wider than tall, image scaled to fit and centered
    pub fn a4_fit(width: u32, height: u32) -> Self {
        let (page_w, page_h) = if width > height {
            (A4_MM.1, A4_MM.0)
        } else {
            A4_MM
        };

        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let ratio = (page_w / w).min(page_h / h);
        let (image_w, image_h) = (w * ratio, h * ratio);

        Self {
            page_width: page_w * PT_PER_MM,
            page_height: page_h * PT_PER_MM,
            image_x: (page_w - image_w) / 2.0 * PT_PER_MM,
            image_y: (page_h - image_h) / 2.0 * PT_PER_MM,
            image_width: image_w * PT_PER_MM,
            image_height: image_h * PT_PER_MM,
        }
    }

    /// Page sized to the document's pixel dimensions, image filling it
    pub fn exact(width: u32, height: u32, pixels_per_point: f32) -> Self {
        let scale = if pixels_per_point > 0.0 {
            pixels_per_point
        } else {
            1.0
        };
        let page_width = width.max(1) as f32 / scale;
        let page_height = height.max(1) as f32 / scale;

        Self {
            page_width,
            page_height,
            image_x: 0.0,
            image_y: 0.0,
            image_width: page_width,
            image_height: page_height,
        }
    }
}

/// Encode one page holding a JPEG image
///
/// `pixel_width`/`pixel_height` are the JPEG's own dimensions.
pub fn encode_jpeg_page(
    layout: &PageLayout,
    jpeg: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
) -> Result<Vec<u8>, CaptureError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => pixel_width as i64,
            "Height" => pixel_height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );
    let image_id = doc.add_object(image);

    // PDF space starts at the bottom-left corner.
    let bottom = layout.page_height - layout.image_y - layout.image_height;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    layout.image_width.into(),
                    0.into(),
                    0.into(),
                    layout.image_height.into(),
                    layout.image_x.into(),
                    bottom.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| CaptureError::PdfRender(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
        "MediaBox" => vec![
            0.into(),
            0.into(),
            layout.page_width.into(),
            layout.page_height.into(),
        ],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| CaptureError::PdfRender(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_jpeg;
    use image::{DynamicImage, RgbImage};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_a4_portrait_fit() {
        let layout = PageLayout::a4_fit(300, 400);
        assert!(!layout.is_landscape());
        assert!(approx(layout.page_width, 595.28));
        // Width-bound: 210mm wide, centered vertically
        assert!(approx(layout.image_width, layout.page_width));
        assert!(approx(layout.image_x, 0.0));
        assert!(approx(
            layout.image_y * 2.0 + layout.image_height,
            layout.page_height
        ));
    }

    #[test]
    fn test_a4_landscape_when_wider() {
        let layout = PageLayout::a4_fit(800, 200);
        assert!(layout.is_landscape());
        assert!(approx(layout.image_width / layout.image_height, 4.0));
    }

    #[test]
    fn test_square_region_is_portrait() {
        assert!(!PageLayout::a4_fit(300, 300).is_landscape());
    }

    #[test]
    fn test_exact_layout_uses_unit_scale() {
        let layout = PageLayout::exact(1500, 3000, 1.5);
        assert!(approx(layout.page_width, 1000.0));
        assert!(approx(layout.page_height, 2000.0));
        assert!(approx(layout.image_height, 2000.0));
    }

    #[test]
    fn test_encode_single_page_document() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(30, 20));
        let jpeg = encode_jpeg(&image, 0.8).unwrap();
        let layout = PageLayout::a4_fit(30, 20);

        let bytes = encode_jpeg_page(&layout, jpeg, 30, 20).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);

        let page_id = *pages.values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box.len(), 4);
        assert!(approx(media_box[2].as_float().unwrap() as f32, layout.page_width));
    }
}
