//! Configuration management for the capture host.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub pdf: PdfConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait before each scroll-step capture
    #[serde(default = "default_pre_capture_delay")]
    pub pre_capture_delay_ms: u64,

    /// Wait before every capture attempt (paint/scroll completion)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Wait after issuing a scroll
    #[serde(default = "default_scroll_settle")]
    pub scroll_settle_ms: u64,

    /// Delay before re-sending a capture request over a channel that was not ready
    #[serde(default = "default_channel_retry_delay")]
    pub channel_retry_delay_ms: u64,

    /// Pause between a finished selection and the capture
    #[serde(default = "default_selection_confirm_delay")]
    pub selection_confirm_delay_ms: u64,

    /// Per-stage timeout when loading images for the PDF path
    #[serde(default = "default_image_load_timeout")]
    pub image_load_timeout_ms: u64,

    /// How long capture/PDF failure notices stay up
    #[serde(default = "default_failure_notice")]
    pub failure_notice_ms: u64,

    /// How long save/region error notices stay up
    #[serde(default = "default_error_notice")]
    pub error_notice_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pre_capture_delay_ms: default_pre_capture_delay(),
            settle_delay_ms: default_settle_delay(),
            scroll_settle_ms: default_scroll_settle(),
            channel_retry_delay_ms: default_channel_retry_delay(),
            selection_confirm_delay_ms: default_selection_confirm_delay(),
            image_load_timeout_ms: default_image_load_timeout(),
            failure_notice_ms: default_failure_notice(),
            error_notice_ms: default_error_notice(),
        }
    }
}

impl TimingConfig {
    pub fn pre_capture_delay(&self) -> Duration {
        Duration::from_millis(self.pre_capture_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn channel_retry_delay(&self) -> Duration {
        Duration::from_millis(self.channel_retry_delay_ms)
    }

    pub fn selection_confirm_delay(&self) -> Duration {
        Duration::from_millis(self.selection_confirm_delay_ms)
    }

    pub fn image_load_timeout(&self) -> Duration {
        Duration::from_millis(self.image_load_timeout_ms)
    }

    pub fn failure_notice(&self) -> Duration {
        Duration::from_millis(self.failure_notice_ms)
    }

    pub fn error_notice(&self) -> Duration {
        Duration::from_millis(self.error_notice_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Vertical band re-captured between consecutive segments
    #[serde(default = "default_overlap")]
    pub overlap_px: u32,

    /// Attempts per segment before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Selections not larger than this on both sides are discarded
    #[serde(default = "default_min_selection")]
    pub min_selection_px: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            overlap_px: default_overlap(),
            max_attempts: default_max_attempts(),
            min_selection_px: default_min_selection(),
        }
    }
}

/// JPEG qualities in the 0.0-1.0 range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    #[serde(default = "default_high_quality")]
    pub region_jpeg_quality: f32,

    #[serde(default = "default_high_quality")]
    pub full_page_jpeg_quality: f32,

    #[serde(default = "default_region_pdf_quality")]
    pub region_pdf_jpeg_quality: f32,

    #[serde(default = "default_high_quality")]
    pub full_page_pdf_jpeg_quality: f32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            region_jpeg_quality: default_high_quality(),
            full_page_jpeg_quality: default_high_quality(),
            region_pdf_jpeg_quality: default_region_pdf_quality(),
            full_page_pdf_jpeg_quality: default_high_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Upscale factor handed to the DOM rasterizer
    #[serde(default = "default_raster_scale")]
    pub raster_scale: f32,

    /// CSS pixels per PDF point for the full-page document
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f32,

    /// Prefix for the public image proxy; the source URL is appended encoded
    #[serde(default = "default_image_proxy")]
    pub image_proxy: String,

    /// Placeholder side when an image has no intrinsic size
    #[serde(default = "default_placeholder_size")]
    pub placeholder_size: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            raster_scale: default_raster_scale(),
            unit_scale: default_unit_scale(),
            image_proxy: default_image_proxy(),
            placeholder_size: default_placeholder_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write artifacts here instead of handing them to the browser
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Ask the user where to save
    #[serde(default = "default_true")]
    pub prompt_user: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prompt_user: true,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pre_capture_delay() -> u64 {
    200
}

fn default_settle_delay() -> u64 {
    300
}

fn default_scroll_settle() -> u64 {
    300
}

fn default_channel_retry_delay() -> u64 {
    100
}

fn default_selection_confirm_delay() -> u64 {
    100
}

fn default_image_load_timeout() -> u64 {
    5000
}

fn default_failure_notice() -> u64 {
    2000
}

fn default_error_notice() -> u64 {
    3000
}

fn default_overlap() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_selection() -> u32 {
    10
}

fn default_high_quality() -> f32 {
    0.95
}

fn default_region_pdf_quality() -> f32 {
    0.8
}

fn default_raster_scale() -> f32 {
    2.0
}

fn default_unit_scale() -> f32 {
    1.5
}

fn default_image_proxy() -> String {
    "https://images.weserv.nl/?url=".to_string()
}

fn default_placeholder_size() -> u32 {
    100
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("page-capture")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Configuration with every wait set to zero, for driving the pipeline in tests
    #[cfg(test)]
    pub fn immediate() -> Self {
        let mut config = Self::default();
        config.timing = TimingConfig {
            pre_capture_delay_ms: 0,
            settle_delay_ms: 0,
            scroll_settle_ms: 0,
            channel_retry_delay_ms: 0,
            selection_confirm_delay_ms: 0,
            image_load_timeout_ms: 50,
            failure_notice_ms: 2000,
            error_notice_ms: 3000,
        };
        config
    }
}
