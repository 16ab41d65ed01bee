//! Per-image load pipeline for the full-page PDF path.
//!
//! Each image in the detached clone goes through up to three stages:
//! a direct load, a load through the public image proxy, and finally a
//! blank placeholder of the image's own size. Image failures never fail
//! the export.

use super::{CloneImage, DetachedClone, DomRenderer};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Stage an image is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStage {
    Direct,
    ProxyFallback,
    Placeholder,
}

/// How a stage attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Loaded,
    Failed(String),
    TimedOut,
}

/// Final state of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Direct,
    Proxied,
    Placeholder { width: u32, height: u32 },
}

impl ImageStage {
    /// Transition after an unsuccessful attempt in this stage
    ///
    /// A direct load that errors goes through the proxy (for http sources);
    /// a direct load that hangs goes straight to the placeholder.
    pub fn next(self, result: &StageResult, proxyable: bool) -> ImageStage {
        match (self, result) {
            (ImageStage::Direct, StageResult::Failed(_)) if proxyable => ImageStage::ProxyFallback,
            _ => ImageStage::Placeholder,
        }
    }
}

/// Drives one image through the stages
pub struct ImagePipeline<'a> {
    dom: &'a dyn DomRenderer,
    proxy_prefix: &'a str,
    stage_timeout: Duration,
    placeholder_size: u32,
}

impl<'a> ImagePipeline<'a> {
    pub fn new(
        dom: &'a dyn DomRenderer,
        proxy_prefix: &'a str,
        stage_timeout: Duration,
        placeholder_size: u32,
    ) -> Self {
        Self {
            dom,
            proxy_prefix,
            stage_timeout,
            placeholder_size,
        }
    }

    pub async fn resolve(&self, clone: &DetachedClone, image: &CloneImage) -> ImageOutcome {
        let proxyable = is_http(&image.src);
        let mut stage = ImageStage::Direct;

        loop {
            let result = match stage {
                ImageStage::Direct => {
                    let src = if proxyable {
                        cache_busted(&image.src, chrono::Utc::now().timestamp_millis())
                    } else {
                        image.src.clone()
                    };
                    self.attempt(clone, image.index, &src).await
                }
                ImageStage::ProxyFallback => {
                    let src = proxy_url(self.proxy_prefix, &image.src);
                    self.attempt(clone, image.index, &src).await
                }
                ImageStage::Placeholder => {
                    let (width, height) = self.placeholder_dimensions(image);
                    if let Err(e) = self
                        .dom
                        .set_placeholder(clone, image.index, width, height)
                        .await
                    {
                        warn!("Failed to place placeholder for image {}: {}", image.index, e);
                    }
                    debug!(
                        "Image {} replaced by {}x{} placeholder",
                        image.index, width, height
                    );
                    return ImageOutcome::Placeholder { width, height };
                }
            };

            match result {
                StageResult::Loaded if stage == ImageStage::Direct => return ImageOutcome::Direct,
                StageResult::Loaded => return ImageOutcome::Proxied,
                ref failure => {
                    trace!("Image {} {:?} stage ended with {:?}", image.index, stage, failure);
                    stage = stage.next(failure, proxyable);
                }
            }
        }
    }

    async fn attempt(&self, clone: &DetachedClone, index: usize, src: &str) -> StageResult {
        match tokio::time::timeout(self.stage_timeout, self.dom.load_image(clone, index, src)).await
        {
            Ok(Ok(())) => StageResult::Loaded,
            Ok(Err(e)) => StageResult::Failed(e),
            Err(_) => StageResult::TimedOut,
        }
    }

    fn placeholder_dimensions(&self, image: &CloneImage) -> (u32, u32) {
        let width = if image.width > 0 {
            image.width
        } else {
            self.placeholder_size
        };
        let height = if image.height > 0 {
            image.height
        } else {
            self.placeholder_size
        };
        (width, height)
    }
}

fn is_http(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Append a `timestamp` query parameter so the browser refetches with CORS
pub fn cache_busted(src: &str, now_ms: i64) -> String {
    let separator = if src.contains('?') { '&' } else { '?' };
    format!("{}{}timestamp={}", src, separator, now_ms)
}

/// Route `src` through the image proxy
pub fn proxy_url(prefix: &str, src: &str) -> String {
    format!("{}{}", prefix, urlencoding::encode(src))
}
