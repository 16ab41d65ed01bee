//! PDF export.
//!
//! Two paths produce PDFs:
//! - Region: an already-captured raster is placed on a single A4 page.
//! - Full page: the live document is cloned into a detached container, its
//!   images are settled, and the clone is rasterized by the page's DOM
//!   rasterizer instead of being stitched from screen captures.

pub mod document;
pub mod images;

use crate::config::Config;
use crate::controller::Notifier;
use crate::encode::encode_jpeg;
use crate::types::{filenames, CaptureError, ExportArtifact, Notice, RasterPayload};
use document::{encode_jpeg_page, PageLayout};
use image::DynamicImage;
use images::{ImageOutcome, ImagePipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Image element inside a detached clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneImage {
    pub index: usize,
    pub src: String,
    /// Intrinsic size, 0 when unknown
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Detached copy of the document (scripts and iframes removed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedClone {
    pub id: String,
    #[serde(default)]
    pub images: Vec<CloneImage>,
}

/// DOM access and rasterization capability of the page
#[async_trait::async_trait]
pub trait DomRenderer: Send + Sync {
    /// Clone the document into a detached container of the given size
    ///
    /// Scripts and iframes are dropped from the clone, and CSS
    /// `background-image` URLs are rewritten through `image_proxy`.
    async fn clone_document(
        &self,
        width: u32,
        height: u32,
        image_proxy: &str,
    ) -> Result<DetachedClone, CaptureError>;

    /// Point an image at `src` and wait until it loads or errors
    async fn load_image(&self, clone: &DetachedClone, index: usize, src: &str)
        -> Result<(), String>;

    /// Replace an image with a blank white placeholder
    async fn set_placeholder(
        &self,
        clone: &DetachedClone,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError>;

    /// Render the clone to a raster at `scale`
    async fn rasterize(&self, clone: &DetachedClone, scale: f32)
        -> Result<RasterPayload, CaptureError>;

    /// Remove the clone and its container from the page
    async fn remove_clone(&self, clone: &DetachedClone) -> Result<(), CaptureError>;
}

/// Wraps DOM rasterization and document encoding
pub struct PdfExporter {
    dom: Arc<dyn DomRenderer>,
    notifier: Arc<dyn Notifier>,
    raster_scale: f32,
    unit_scale: f32,
    image_proxy: String,
    placeholder_size: u32,
    image_timeout: Duration,
    region_quality: f32,
    full_page_quality: f32,
}

impl PdfExporter {
    pub fn new(dom: Arc<dyn DomRenderer>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            dom,
            notifier,
            raster_scale: config.pdf.raster_scale,
            unit_scale: config.pdf.unit_scale,
            image_proxy: config.pdf.image_proxy.clone(),
            placeholder_size: config.pdf.placeholder_size,
            image_timeout: config.timing.image_load_timeout(),
            region_quality: config.encoding.region_pdf_jpeg_quality,
            full_page_quality: config.encoding.full_page_pdf_jpeg_quality,
        }
    }

    /// Place a region raster on a single A4 page
    pub fn export_region_as_pdf(
        &self,
        raster: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<ExportArtifact, CaptureError> {
        let layout = PageLayout::a4_fit(width, height);
        let jpeg = encode_jpeg(raster, self.region_quality)
            .map_err(|e| CaptureError::PdfRender(e.to_string()))?;
        let bytes = encode_jpeg_page(&layout, jpeg, raster.width(), raster.height())?;

        debug!(
            "Region PDF {}x{} ({}), {} bytes",
            width,
            height,
            if layout.is_landscape() { "landscape" } else { "portrait" },
            bytes.len()
        );
        Ok(ExportArtifact::pdf(bytes, filenames::REGION_PDF))
    }

    /// Rasterize the whole document into a single page sized to the page
    ///
    /// The detached clone is removed on every exit path.
    pub async fn export_full_page_as_pdf(
        &self,
        full_width: u32,
        full_height: u32,
    ) -> Result<ExportArtifact, CaptureError> {
        let clone = self
            .dom
            .clone_document(full_width, full_height, &self.image_proxy)
            .await
            .map_err(|e| CaptureError::PdfRender(format!("failed to clone document: {}", e)))?;

        let outcome = self.render_clone(&clone, full_width, full_height).await;

        if let Err(e) = self.dom.remove_clone(&clone).await {
            warn!("Failed to remove detached clone {}: {}", clone.id, e);
        }

        outcome
    }

    async fn render_clone(
        &self,
        clone: &DetachedClone,
        full_width: u32,
        full_height: u32,
    ) -> Result<ExportArtifact, CaptureError> {
        self.settle_images(clone).await;

        self.notifier.notify(Notice::info("Rendering PDF...")).await;
        let raster = self
            .dom
            .rasterize(clone, self.raster_scale)
            .await
            .map_err(|e| match e {
                CaptureError::PdfRender(_) => e,
                other => CaptureError::PdfRender(other.to_string()),
            })?;
        let image = raster
            .decode()
            .map_err(|e| CaptureError::PdfRender(format!("rasterizer output: {}", e)))?;

        let layout = PageLayout::exact(full_width, full_height, self.unit_scale);
        let jpeg = encode_jpeg(&image, self.full_page_quality)
            .map_err(|e| CaptureError::PdfRender(e.to_string()))?;
        let bytes = encode_jpeg_page(&layout, jpeg, image.width(), image.height())?;

        info!(
            "Full-page PDF {}x{}pt from {}x{} raster, {} bytes",
            layout.page_width,
            layout.page_height,
            image.width(),
            image.height(),
            bytes.len()
        );
        Ok(ExportArtifact::pdf(bytes, filenames::FULL_PAGE_PDF))
    }

    /// Wait for every image to load, fall back to the proxy, or be replaced
    async fn settle_images(&self, clone: &DetachedClone) {
        if clone.images.is_empty() {
            return;
        }

        let pipeline = ImagePipeline::new(
            self.dom.as_ref(),
            &self.image_proxy,
            self.image_timeout,
            self.placeholder_size,
        );
        let outcomes =
            futures::future::join_all(clone.images.iter().map(|img| pipeline.resolve(clone, img)))
                .await;

        let proxied = outcomes
            .iter()
            .filter(|o| matches!(o, ImageOutcome::Proxied))
            .count();
        let placeholders = outcomes
            .iter()
            .filter(|o| matches!(o, ImageOutcome::Placeholder { .. }))
            .count();
        debug!(
            "Settled {} images ({} proxied, {} placeholders)",
            outcomes.len(),
            proxied,
            placeholders
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDom;
    use super::*;
    use crate::controller::testing::RecordingNotifier;
    use image::RgbImage;

    fn exporter(dom: Arc<FakeDom>) -> PdfExporter {
        let mut config = Config::immediate();
        config.timing.image_load_timeout_ms = 20;
        PdfExporter::new(dom, Arc::new(RecordingNotifier::default()), &config)
    }

    #[test]
    fn test_region_pdf() {
        let dom = Arc::new(FakeDom::default());
        let raster = DynamicImage::ImageRgb8(RgbImage::new(300, 200));

        let artifact = exporter(dom).export_region_as_pdf(&raster, 300, 200).unwrap();
        assert_eq!(artifact.suggested_filename, "screenshot.pdf");
        assert_eq!(artifact.mime_type, "application/pdf");
        assert!(artifact.payload.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_full_page_pdf_settles_every_image() {
        let dom = Arc::new(FakeDom::with_images(&[
            ("https://ok.example/a.png", 10, 10),
            ("https://proxied.example/b.png", 10, 10),
            ("https://dead.example/c.png", 64, 32),
            ("https://slow.example/d.png", 0, 0),
        ]));

        let artifact = exporter(dom.clone())
            .export_full_page_as_pdf(120, 90)
            .await
            .unwrap();
        assert_eq!(artifact.suggested_filename, "fullpage.pdf");

        let mut placeholders = dom.placeholders.lock().unwrap().clone();
        placeholders.sort();
        assert_eq!(placeholders, vec![(2, 64, 32), (3, 100, 100)]);

        let loads = dom.loads.lock().unwrap().clone();
        assert!(loads
            .iter()
            .any(|l| l.starts_with("https://ok.example/a.png?timestamp=")));
        assert!(loads.contains(
            &"https://images.weserv.nl/?url=https%3A%2F%2Fproxied.example%2Fb.png".to_string()
        ));
        // The hung direct load never reaches the proxy
        assert!(!loads.iter().any(|l| l.contains("slow.example%2F")));

        assert_eq!(*dom.rasterized_at.lock().unwrap(), Some(2.0));
        assert_eq!(*dom.removed.lock().unwrap(), vec!["clone-1".to_string()]);
        assert_eq!(
            dom.clone_proxy.lock().unwrap().as_deref(),
            Some("https://images.weserv.nl/?url=")
        );
    }

    #[tokio::test]
    async fn test_rasterize_failure_still_removes_clone() {
        let dom = Arc::new(FakeDom {
            fail_rasterize: true,
            ..Default::default()
        });

        let err = exporter(dom.clone())
            .export_full_page_as_pdf(100, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::PdfRender(_)));
        assert_eq!(dom.removed.lock().unwrap().len(), 1);
    }
}
