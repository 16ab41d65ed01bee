//! Capture entry points.
//!
//! This module wires the capture stages together behind the triggers the
//! extension exposes: region selection, full-page JPEG and full-page PDF
//! (plus a plain viewport capture). Every run ends either in an exported
//! artifact or in a failure notice.

use crate::capture::{CaptureClient, ViewportSource};
use crate::config::Config;
use crate::crop::RegionCropper;
use crate::encode::encode_jpeg;
use crate::pdf::{DomRenderer, PdfExporter};
use crate::scroll::{PageControl, ScrollDriver};
use crate::segment::{self, SegmentCapture};
use crate::selection::{run_selection, SelectionUi};
use crate::sink::ExportSink;
use crate::stitch::Stitcher;
use crate::types::{
    filenames, CaptureError, CaptureRequest, ExportArtifact, Notice, OutputFormat, Rect,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shows transient on-screen notices
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Replace the current notice
    async fn notify(&self, notice: Notice);

    /// Remove the current notice
    async fn clear(&self);
}

/// The external capabilities a controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub viewport: Arc<dyn ViewportSource>,
    pub page: Arc<dyn PageControl>,
    pub dom: Arc<dyn DomRenderer>,
    pub selection_ui: Arc<dyn SelectionUi>,
    pub sink: Arc<dyn ExportSink>,
    pub notifier: Arc<dyn Notifier>,
}

/// Main capture controller
pub struct CaptureController {
    config: Config,
    client: Arc<CaptureClient>,
    page: Arc<dyn PageControl>,
    selection_ui: Arc<dyn SelectionUi>,
    sink: Arc<dyn ExportSink>,
    notifier: Arc<dyn Notifier>,
    pdf: PdfExporter,
    stitcher: Stitcher,
}

impl CaptureController {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let client = Arc::new(CaptureClient::new(
            collaborators.viewport,
            config.timing.channel_retry_delay(),
        ));
        let pdf = PdfExporter::new(
            collaborators.dom,
            collaborators.notifier.clone(),
            &config,
        );
        let stitcher = Stitcher::new(config.capture.overlap_px);

        Self {
            config,
            client,
            page: collaborators.page,
            selection_ui: collaborators.selection_ui,
            sink: collaborators.sink,
            notifier: collaborators.notifier,
            pdf,
            stitcher,
        }
    }

    /// Let the user drag out a rectangle, then capture it in `format`
    pub async fn start_selection(&self, format: OutputFormat) -> Result<(), CaptureError> {
        info!("Starting region selection ({})", format.as_str());

        let Some(rect) = run_selection(
            self.selection_ui.as_ref(),
            self.config.capture.min_selection_px,
        )
        .await
        else {
            debug!("Selection cancelled, nothing captured");
            return Ok(());
        };

        // Keep the final box on screen briefly, then take the overlay down
        // and let the page repaint before capturing.
        tokio::time::sleep(self.config.timing.selection_confirm_delay()).await;
        self.selection_ui.cleanup().await;
        tokio::time::sleep(self.config.timing.settle_delay()).await;

        self.run(CaptureRequest::Region { rect, format }).await
    }

    /// Scroll, capture and stitch the whole page into `fullpage.jpg`
    pub async fn capture_full_page(&self) -> Result<(), CaptureError> {
        self.run(CaptureRequest::FullPageRaster).await
    }

    /// Rasterize the whole document into `fullpage.pdf`
    pub async fn capture_pdf(&self) -> Result<(), CaptureError> {
        self.run(CaptureRequest::FullPagePdf).await
    }

    /// Capture the visible viewport into `screenshot.jpg`
    pub async fn capture_viewport(&self) -> Result<(), CaptureError> {
        self.run(CaptureRequest::ViewportOnly).await
    }

    /// Produce and export one request, reporting failures on screen
    pub async fn run(&self, request: CaptureRequest) -> Result<(), CaptureError> {
        let artifact = match self.produce(request).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("{:?} capture failed: {}", request, e);
                self.notifier.notify(self.failure_notice(request)).await;
                return Err(e);
            }
        };

        if request == CaptureRequest::FullPagePdf {
            self.notifier.notify(Notice::info("Saving PDF...")).await;
        }

        match self.sink.save(&artifact, self.config.output.prompt_user).await {
            Ok(()) => {
                info!(
                    "Exported {} ({} bytes)",
                    artifact.suggested_filename,
                    artifact.payload.len()
                );
                self.notifier.clear().await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to save {}: {}", artifact.suggested_filename, e);
                self.notifier
                    .notify(Notice::error(
                        "Save failed, please retry",
                        self.config.timing.error_notice(),
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// Build the artifact for a request
    pub async fn produce(&self, request: CaptureRequest) -> Result<ExportArtifact, CaptureError> {
        match request {
            CaptureRequest::ViewportOnly => self.viewport_artifact().await,
            CaptureRequest::Region { rect, format } => self.region_artifact(rect, format).await,
            CaptureRequest::FullPageRaster => self.full_page_artifact().await,
            CaptureRequest::FullPagePdf => self.full_page_pdf_artifact().await,
        }
    }

    async fn viewport_artifact(&self) -> Result<ExportArtifact, CaptureError> {
        let payload = self.client.capture_viewport().await?;
        segment::validate(&payload)?;
        let image = payload
            .decode()
            .map_err(|e| CaptureError::InvalidCapture(e.to_string()))?;
        let jpeg = encode_jpeg(&image, self.config.encoding.region_jpeg_quality)?;
        Ok(ExportArtifact::jpeg(jpeg, filenames::REGION_JPG))
    }

    async fn region_artifact(
        &self,
        rect: Rect,
        format: OutputFormat,
    ) -> Result<ExportArtifact, CaptureError> {
        debug!("Capturing region {:?} as {}", rect, format.as_str());
        let payload = self.client.capture_viewport().await?;
        let cropped = RegionCropper::crop_payload(&payload, rect)?;

        match format {
            OutputFormat::Jpg => {
                let jpeg = encode_jpeg(&cropped, self.config.encoding.region_jpeg_quality)?;
                Ok(ExportArtifact::jpeg(jpeg, filenames::REGION_JPG))
            }
            OutputFormat::Pdf => self.pdf.export_region_as_pdf(&cropped, rect.width, rect.height),
        }
    }

    async fn full_page_artifact(&self) -> Result<ExportArtifact, CaptureError> {
        self.notifier.notify(Notice::info("Preparing capture...")).await;

        let segments = SegmentCapture::new(
            self.client.clone(),
            self.config.timing.settle_delay(),
            self.config.capture.max_attempts,
        );
        let driver = ScrollDriver::new(
            self.page.clone(),
            segments,
            self.notifier.clone(),
            self.config.capture.overlap_px,
            self.config.timing.pre_capture_delay(),
            self.config.timing.scroll_settle(),
        );

        let capture = driver.run().await?;
        let stitched = self
            .stitcher
            .stitch(capture.segments, capture.total_height, capture.page_width)?;
        let jpeg = encode_jpeg(&stitched, self.config.encoding.full_page_jpeg_quality)?;
        Ok(ExportArtifact::jpeg(jpeg, filenames::FULL_PAGE_JPG))
    }

    async fn full_page_pdf_artifact(&self) -> Result<ExportArtifact, CaptureError> {
        self.notifier
            .notify(Notice::info("Generating PDF, please wait..."))
            .await;

        let saved = self.page.page_state().await?;
        let outcome = match self.page.metrics().await {
            Ok(metrics) => {
                self.pdf
                    .export_full_page_as_pdf(metrics.full_width, metrics.full_height)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.page.restore_page_state(&saved).await {
            error!("Failed to restore page state after PDF export: {}", e);
        }
        outcome
    }

    fn failure_notice(&self, request: CaptureRequest) -> Notice {
        let timing = &self.config.timing;
        let (text, dismiss_after) = match request {
            CaptureRequest::FullPagePdf => {
                ("PDF generation failed, please retry", timing.failure_notice())
            }
            CaptureRequest::FullPageRaster => {
                ("Capture failed, please retry", timing.failure_notice())
            }
            CaptureRequest::Region {
                format: OutputFormat::Pdf,
                ..
            } => ("PDF generation failed, please retry", timing.error_notice()),
            _ => ("Capture failed, please retry", timing.error_notice()),
        };
        Notice::error(text, dismiss_after)
    }
}
