//! Core types used throughout the capture pipeline.
//!
//! This module defines the data model shared by every stage (requests,
//! segments, scroll state, export artifacts) and the error taxonomy.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format picked by the user for a region capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Pdf,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Rectangle in pixel coordinates (left, top, width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Normalize two corner points into a rectangle
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            width: a.0.abs_diff(b.0),
            height: a.1.abs_diff(b.1),
        }
    }

    /// Whether both sides exceed `min` pixels
    pub fn exceeds(&self, min: u32) -> bool {
        self.width > min && self.height > min
    }

    /// Size label drawn next to the selection box
    pub fn size_label(&self) -> String {
        format!("{} × {}", self.width, self.height)
    }
}

/// What a trigger asks the pipeline to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    /// The visible viewport as-is
    ViewportOnly,
    /// A user-selected rectangle in the requested format
    Region { rect: Rect, format: OutputFormat },
    /// Scroll, capture and stitch the whole page into a JPEG
    FullPageRaster,
    /// Rasterize the whole DOM into a PDF
    FullPagePdf,
}

/// Encoded raster bytes (JPEG or PNG) as returned by a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPayload {
    pub bytes: Vec<u8>,
}

impl RasterPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        image::load_from_memory(&self.bytes)
    }
}

/// One viewport-sized capture taken during a full-page run
#[derive(Debug, Clone)]
pub struct CapturedSegment {
    pub payload: RasterPayload,
    /// Page coordinate the segment's top edge is tagged with (overlap included)
    pub vertical_offset: u32,
    pub viewport_height: u32,
}

/// Scroll state for a full-page run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPlan {
    pub current_position: u32,
    pub viewport_height: u32,
    pub total_page_height: u32,
    pub overlap_px: u32,
}

impl ScrollPlan {
    pub fn new(viewport_height: u32, total_page_height: u32, overlap_px: u32) -> Self {
        Self {
            current_position: 0,
            viewport_height,
            total_page_height,
            overlap_px,
        }
    }

    /// Largest position the page can be scrolled to
    pub fn max_position(&self) -> u32 {
        self.total_page_height.saturating_sub(self.viewport_height)
    }

    /// The viewport at the current position reaches the bottom of the page
    pub fn is_complete(&self) -> bool {
        self.current_position + self.viewport_height >= self.total_page_height
    }

    /// Next scroll position, always advancing by at least one pixel
    pub fn next_position(&self) -> u32 {
        let step = self
            .viewport_height
            .saturating_sub(self.overlap_px)
            .max(1);
        (self.current_position + step).min(self.max_position())
    }

    /// Move to the next position, returning it. No-op once complete.
    pub fn advance(&mut self) -> u32 {
        if !self.is_complete() {
            let next = self.next_position();
            debug_assert!(next >= self.current_position);
            self.current_position = next;
        }
        self.current_position
    }

    /// Progress through the page in percent
    pub fn progress_percent(&self) -> u32 {
        if self.total_page_height == 0 {
            return 100;
        }
        let pct = (self.current_position as f64 / self.total_page_height as f64 * 100.0).round();
        (pct as u32).min(100)
    }
}

/// Page geometry reported by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Scrollable width of the whole document
    pub full_width: u32,
    /// Scrollable height of the whole document
    pub full_height: u32,
}

/// Page-level state the pipeline temporarily overrides
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub scroll_x: u32,
    pub scroll_y: u32,
    /// Inline style of the body before any override
    pub body_style: String,
}

/// Final payload handed to the export sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub payload: Vec<u8>,
    pub suggested_filename: String,
    pub mime_type: &'static str,
}

impl ExportArtifact {
    pub fn jpeg(payload: Vec<u8>, filename: &str) -> Self {
        Self {
            payload,
            suggested_filename: filename.to_string(),
            mime_type: "image/jpeg",
        }
    }

    pub fn pdf(payload: Vec<u8>, filename: &str) -> Self {
        Self {
            payload,
            suggested_filename: filename.to_string(),
            mime_type: "application/pdf",
        }
    }
}

/// Fixed output filenames
pub mod filenames {
    pub const REGION_JPG: &str = "screenshot.jpg";
    pub const REGION_PDF: &str = "screenshot.pdf";
    pub const FULL_PAGE_JPG: &str = "fullpage.jpg";
    pub const FULL_PAGE_PDF: &str = "fullpage.pdf";
}

/// Tone of an on-screen notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeTone {
    Info,
    Error,
}

/// Transient on-screen notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub tone: NoticeTone,
    /// `None` keeps the notice until it is replaced or cleared
    pub dismiss_after: Option<Duration>,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: NoticeTone::Info,
            dismiss_after: None,
        }
    }

    pub fn error(text: impl Into<String>, dismiss_after: Duration) -> Self {
        Self {
            text: text.into(),
            tone: NoticeTone::Error,
            dismiss_after: Some(dismiss_after),
        }
    }

    pub fn progress(percent: u32) -> Self {
        Self::info(format!("Capturing... {}%", percent))
    }
}

/// Failure of the messaging channel to the privileged side
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ChannelError {
    pub message: String,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The receiving end was not connected yet; worth one more send
    pub fn is_transient(&self) -> bool {
        self.message.to_lowercase().contains("connection")
    }
}

/// Errors that can occur while capturing or exporting
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("Segment capture failed after {attempts} attempts: {last}")]
    SegmentCaptureExhausted {
        attempts: u32,
        #[source]
        last: Box<CaptureError>,
    },

    #[error("No segments to stitch")]
    EmptySegmentList,

    #[error("Failed to decode segment {index}: {reason}")]
    SegmentDecode { index: usize, reason: String },

    #[error("PDF rendering failed: {0}")]
    PdfRender(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Page control failed: {0}")]
    Page(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
