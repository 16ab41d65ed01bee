//! Scroll-driven full-page capture.
//!
//! The driver walks the page top to bottom one viewport at a time, keeping a
//! fixed overlap band between consecutive captures, and hands the ordered
//! segments to the stitcher. Page scrolling and smooth-scroll styles are
//! suppressed for the duration of a run and restored on every exit path.

use crate::controller::Notifier;
use crate::segment::SegmentCapture;
use crate::types::{CaptureError, CapturedSegment, Notice, PageMetrics, PageState, ScrollPlan};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Page-level scroll and style control
#[async_trait::async_trait]
pub trait PageControl: Send + Sync {
    /// Current viewport and document geometry
    async fn metrics(&self) -> Result<PageMetrics, CaptureError>;

    /// Snapshot of everything a capture run may override
    async fn page_state(&self) -> Result<PageState, CaptureError>;

    /// Disable user scrolling and smooth-scroll behavior
    async fn suppress_scrolling(&self) -> Result<(), CaptureError>;

    /// Put back a snapshot taken with [`PageControl::page_state`]
    async fn restore_page_state(&self, state: &PageState) -> Result<(), CaptureError>;

    async fn scroll_to(&self, y: u32) -> Result<(), CaptureError>;
}

/// Driver states. Failures leave the machine through `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Capturing(u32),
    Scrolling { from: u32, to: u32 },
    Done,
}

/// Output of a completed run, ready for stitching
#[derive(Debug)]
pub struct FullPageCapture {
    pub segments: Vec<CapturedSegment>,
    pub page_width: u32,
    pub total_height: u32,
}

/// Owns the scroll state machine for one page
pub struct ScrollDriver {
    page: Arc<dyn PageControl>,
    segments: SegmentCapture,
    notifier: Arc<dyn Notifier>,
    overlap_px: u32,
    pre_capture_delay: Duration,
    scroll_settle: Duration,
}

impl ScrollDriver {
    pub fn new(
        page: Arc<dyn PageControl>,
        segments: SegmentCapture,
        notifier: Arc<dyn Notifier>,
        overlap_px: u32,
        pre_capture_delay: Duration,
        scroll_settle: Duration,
    ) -> Self {
        Self {
            page,
            segments,
            notifier,
            overlap_px,
            pre_capture_delay,
            scroll_settle,
        }
    }

    /// Capture the whole page as ordered segments
    ///
    /// The page state is restored whether or not the run succeeds.
    pub async fn run(&self) -> Result<FullPageCapture, CaptureError> {
        let saved = self.page.page_state().await?;

        let outcome = match self.page.suppress_scrolling().await {
            Ok(()) => self.drive().await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.page.restore_page_state(&saved).await {
            warn!("Failed to restore page state: {}", e);
        } else {
            trace!("Page state restored (scroll_y {})", saved.scroll_y);
        }

        outcome
    }

    async fn drive(&self) -> Result<FullPageCapture, CaptureError> {
        let metrics = self.page.metrics().await?;
        if metrics.viewport_height == 0 || metrics.viewport_width == 0 {
            return Err(CaptureError::Page(format!(
                "viewport has zero size ({}x{})",
                metrics.viewport_width, metrics.viewport_height
            )));
        }

        let total_height = metrics.full_height.max(metrics.viewport_height);
        let mut plan = ScrollPlan::new(metrics.viewport_height, total_height, self.overlap_px);
        let mut segments: Vec<CapturedSegment> = Vec::new();
        let mut state = DriverState::Idle;

        debug!(
            "Full-page run: viewport {}x{}, page height {}, overlap {}",
            metrics.viewport_width, metrics.viewport_height, total_height, self.overlap_px
        );

        loop {
            state = match state {
                DriverState::Idle => {
                    self.page.scroll_to(0).await?;
                    tokio::time::sleep(self.scroll_settle).await;
                    DriverState::Capturing(plan.current_position)
                }
                DriverState::Capturing(pos) => {
                    self.notifier
                        .notify(Notice::progress(plan.progress_percent()))
                        .await;
                    tokio::time::sleep(self.pre_capture_delay).await;

                    // Tag each segment so that subtracting the cumulative
                    // overlap yields its scroll position again.
                    let index = segments.len() as u32;
                    let target_offset = pos + self.overlap_px * index;
                    let segment = self
                        .segments
                        .capture_segment(target_offset, plan.viewport_height)
                        .await?;
                    segments.push(segment);

                    if plan.is_complete() {
                        DriverState::Done
                    } else {
                        DriverState::Scrolling {
                            from: pos,
                            to: plan.next_position(),
                        }
                    }
                }
                DriverState::Scrolling { from, to } => {
                    trace!("Scrolling {} -> {}", from, to);
                    self.page.scroll_to(to).await?;
                    tokio::time::sleep(self.scroll_settle).await;
                    DriverState::Capturing(plan.advance())
                }
                DriverState::Done => break,
            };
        }

        info!(
            "Captured {} segments covering {}px",
            segments.len(),
            total_height
        );

        Ok(FullPageCapture {
            segments,
            page_width: metrics.viewport_width,
            total_height,
        })
    }
}
