//! Page Capture - Browser screenshot pipeline
//!
//! This crate captures web pages as images and PDFs through a browser
//! extension:
//!
//! - **Region**: the user drags a rectangle over the page; the visible
//!   viewport is captured and cropped, then exported as JPEG or an A4 PDF
//! - **Full page**: the page is scrolled a viewport at a time, each viewport
//!   is captured and the segments are stitched into one tall JPEG
//! - **Full-page PDF**: the document is cloned off-screen, its images are
//!   settled and the clone is rasterized into a single-page PDF
//!
//! # Architecture
//!
//! The pipeline never touches the browser directly. Every page-side
//! capability sits behind a trait ([`ViewportSource`], [`PageControl`],
//! [`DomRenderer`], [`SelectionUi`], [`ExportSink`], [`Notifier`]) that the
//! [`ExtensionBridge`] implements over Chrome Native Messaging.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod controller;
pub mod crop;
pub mod encode;
pub mod pdf;
pub mod scroll;
pub mod segment;
pub mod selection;
pub mod sink;
pub mod stitch;
pub mod types;

// Re-export commonly used types
pub use bridge::{ExtensionBridge, Trigger};
pub use capture::{CaptureClient, ViewportSource};
pub use config::Config;
pub use controller::{CaptureController, Collaborators, Notifier};
pub use crop::RegionCropper;
pub use pdf::{CloneImage, DetachedClone, DomRenderer, PdfExporter};
pub use scroll::{DriverState, FullPageCapture, PageControl, ScrollDriver};
pub use segment::SegmentCapture;
pub use selection::{SelectionInput, SelectionMachine, SelectionState, SelectionUi};
pub use sink::{DirectorySink, ExportSink};
pub use stitch::Stitcher;
pub use types::{
    CaptureError, CaptureRequest, CapturedSegment, ChannelError, ExportArtifact, Notice,
    NoticeTone, OutputFormat, PageMetrics, PageState, RasterPayload, Rect, ScrollPlan,
};
