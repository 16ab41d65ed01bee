//! Viewport capture through the privileged capture capability.
//!
//! The privileged side owns the actual screen grab. This module wraps it with
//! request/response semantics, serializes requests (only one screen capture
//! may be in flight) and re-sends once when the channel was not yet connected.

use crate::types::{CaptureError, ChannelError, RasterPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Privileged "capture the visible viewport" capability
#[async_trait::async_trait]
pub trait ViewportSource: Send + Sync {
    async fn capture_viewport_raster(&self) -> Result<RasterPayload, ChannelError>;
}

/// Client for the viewport capture capability
pub struct CaptureClient {
    source: Arc<dyn ViewportSource>,
    /// Delay before re-sending over a channel that was not ready
    retry_delay: Duration,
    /// Held for the duration of each request
    in_flight: Mutex<()>,
}

impl CaptureClient {
    pub fn new(source: Arc<dyn ViewportSource>, retry_delay: Duration) -> Self {
        Self {
            source,
            retry_delay,
            in_flight: Mutex::new(()),
        }
    }

    /// Capture the current viewport
    ///
    /// Transient channel failures are re-sent exactly once after the retry
    /// delay. Anything else is returned as [`CaptureError::Channel`].
    pub async fn capture_viewport(&self) -> Result<RasterPayload, CaptureError> {
        let _guard = self.in_flight.lock().await;
        trace!("Requesting viewport capture");

        match self.source.capture_viewport_raster().await {
            Ok(payload) => Ok(payload),
            Err(e) if e.is_transient() => {
                debug!(
                    "Capture channel not ready ({}), retrying in {:?}",
                    e, self.retry_delay
                );
                tokio::time::sleep(self.retry_delay).await;
                self.source.capture_viewport_raster().await.map_err(|e| {
                    warn!("Capture request failed after channel retry: {}", e);
                    CaptureError::Channel(e)
                })
            }
            Err(e) => {
                warn!("Capture request failed: {}", e);
                Err(CaptureError::Channel(e))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    fn payload() -> RasterPayload {
        RasterPayload::new(vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_capture_success() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload())]));
        let client = CaptureClient::new(source.clone(), Duration::ZERO);

        assert_eq!(client.capture_viewport().await.unwrap(), payload());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(ChannelError::new("Could not establish connection")),
            Ok(payload()),
        ]));
        let client = CaptureClient::new(source.clone(), Duration::from_millis(1));

        assert!(client.capture_viewport().await.is_ok());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_not_retried_twice() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(ChannelError::new("connection lost")),
            Err(ChannelError::new("connection lost")),
            Ok(payload()),
        ]));
        let client = CaptureClient::new(source.clone(), Duration::ZERO);

        let err = client.capture_viewport().await.unwrap_err();
        assert!(matches!(err, CaptureError::Channel(_)));
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_other_failure_surfaces_immediately() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(ChannelError::new("No active tab")),
            Ok(payload()),
        ]));
        let client = CaptureClient::new(source.clone(), Duration::ZERO);

        assert!(client.capture_viewport().await.is_err());
        assert_eq!(source.call_count(), 1);
    }
}
