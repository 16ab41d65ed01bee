//! Single-segment capture with bounded retries.
//!
//! A segment is one viewport-sized raster taken at the current scroll
//! position. Captures taken mid-repaint can come back empty or undecodable,
//! so every attempt waits for the page to settle and validates the raster.

use crate::capture::CaptureClient;
use crate::types::{CaptureError, CapturedSegment, RasterPayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Captures validated viewport segments
pub struct SegmentCapture {
    client: Arc<CaptureClient>,
    settle_delay: Duration,
    max_attempts: u32,
}

impl SegmentCapture {
    pub fn new(client: Arc<CaptureClient>, settle_delay: Duration, max_attempts: u32) -> Self {
        Self {
            client,
            settle_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Capture one segment tagged with `target_offset`
    pub async fn capture_segment(
        &self,
        target_offset: u32,
        viewport_height: u32,
    ) -> Result<CapturedSegment, CaptureError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            tokio::time::sleep(self.settle_delay).await;

            match self.try_capture().await {
                Ok(payload) => {
                    trace!(
                        "Segment at offset {} captured on attempt {}",
                        target_offset,
                        attempt
                    );
                    return Ok(CapturedSegment {
                        payload,
                        vertical_offset: target_offset,
                        viewport_height,
                    });
                }
                Err(e) if attempt < self.max_attempts => {
                    debug!(
                        "Segment capture invalid ({}), retrying {}/{}",
                        e, attempt, self.max_attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Segment at offset {} failed after {} attempts: {}",
                        target_offset, attempt, e
                    );
                    return Err(CaptureError::SegmentCaptureExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
            }
        }
    }

    /// One capture plus validation
    async fn try_capture(&self) -> Result<RasterPayload, CaptureError> {
        let payload = self.client.capture_viewport().await?;
        validate(&payload)?;
        Ok(payload)
    }
}

/// The payload decodes to an image with positive dimensions
pub fn validate(payload: &RasterPayload) -> Result<(), CaptureError> {
    if payload.is_empty() {
        return Err(CaptureError::InvalidCapture("empty capture".to_string()));
    }

    let image = payload
        .decode()
        .map_err(|e| CaptureError::InvalidCapture(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(CaptureError::InvalidCapture(format!(
            "capture has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }

    Ok(())
}
