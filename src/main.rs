//! Page Capture - Native messaging host
//!
//! Chrome starts this binary when the extension connects. Stdout carries
//! the native messaging protocol, so all logging goes to stderr.

use page_capture::{
    CaptureController, Collaborators, Config, DirectorySink, ExportSink, ExtensionBridge, Trigger,
};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    info!("Starting page capture host");
    info!("Configuration loaded from {:?}", Config::default_config_path());

    let (bridge, mut triggers) = ExtensionBridge::spawn(tokio::io::stdin(), tokio::io::stdout());

    let sink: Arc<dyn ExportSink> = match &config.output.directory {
        Some(directory) => {
            info!("Saving captures to {:?}", directory);
            Arc::new(DirectorySink::new(directory.clone()))
        }
        None => bridge.clone(),
    };

    let controller = CaptureController::new(
        config,
        Collaborators {
            viewport: bridge.clone(),
            page: bridge.clone(),
            dom: bridge.clone(),
            selection_ui: bridge.clone(),
            sink,
            notifier: bridge.clone(),
        },
    );

    // One capture at a time; later triggers wait in the channel
    while let Some(trigger) = triggers.recv().await {
        info!("Handling {:?}", trigger);
        let result = match trigger {
            Trigger::StartSelection(format) => controller.start_selection(format).await,
            Trigger::CaptureFullPage => controller.capture_full_page().await,
            Trigger::CapturePdf => controller.capture_pdf().await,
            Trigger::CaptureViewport => controller.capture_viewport().await,
        };

        if let Err(e) = result {
            debug!("{:?} ended with error: {}", trigger, e);
        }
    }

    info!("Extension disconnected, exiting");
    Ok(())
}
