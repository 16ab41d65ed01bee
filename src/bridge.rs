//! Extension bridge over Chrome Native Messaging.
//!
//! The browser extension owns every page-side capability (tab capture, DOM
//! access, the selection overlay, downloads). This module speaks the native
//! messaging protocol with it: each message is a 4-byte native-endian length
//! followed by UTF-8 JSON.
//!
//! Requests from the host carry an `id`; the extension answers with a
//! `reply` carrying the same `id`. Triggers and selection input arrive
//! unsolicited and are routed to channels by a background reader task.

use crate::capture::ViewportSource;
use crate::controller::Notifier;
use crate::encode::from_data_url;
use crate::pdf::{DetachedClone, DomRenderer};
use crate::scroll::PageControl;
use crate::selection::{SelectionInput, SelectionUi};
use crate::sink::ExportSink;
use crate::types::{
    CaptureError, ChannelError, ExportArtifact, Notice, NoticeTone, OutputFormat, PageMetrics,
    PageState, RasterPayload, Rect,
};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, trace, warn};

/// Largest message accepted from the extension
const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Chrome drops host messages larger than this
const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

/// Raw bytes per download chunk. A multiple of 3 so the base64 chunks
/// concatenate into one valid encoding, and small enough that an encoded
/// chunk stays under [`MAX_OUTBOUND_FRAME`].
const DOWNLOAD_CHUNK_BYTES: usize = 600 * 1024;

/// Triggers queued while a capture is running
const TRIGGER_QUEUE: usize = 16;

/// User-initiated capture trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartSelection(OutputFormat),
    CaptureFullPage,
    CapturePdf,
    CaptureViewport,
}

/// Message from the extension
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Inbound {
    StartSelection {
        format: OutputFormat,
    },
    CaptureFullPage,
    #[serde(rename = "capturePDF")]
    CapturePdf,
    CaptureViewport,
    SelectionInput {
        input: SelectionInput,
    },
    Reply(Reply),
}

/// Answer to a host request
#[derive(Debug, Clone, Deserialize)]
struct Reply {
    id: u64,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Request sent to the extension
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Command {
    CaptureVisibleTab,
    PageMetrics,
    PageState,
    SuppressScrolling,
    RestorePageState {
        state: PageState,
    },
    ScrollTo {
        y: u32,
    },
    #[serde(rename_all = "camelCase")]
    CloneDocument {
        width: u32,
        height: u32,
        image_proxy: String,
    },
    #[serde(rename_all = "camelCase")]
    LoadImage {
        clone_id: String,
        index: usize,
        src: String,
    },
    #[serde(rename_all = "camelCase")]
    SetPlaceholder {
        clone_id: String,
        index: usize,
        width: u32,
        height: u32,
    },
    #[serde(rename_all = "camelCase")]
    Rasterize {
        clone_id: String,
        scale: f32,
    },
    #[serde(rename_all = "camelCase")]
    RemoveClone {
        clone_id: String,
    },
    /// Assemble the chunks of `transfer_id` into a data URL and save it
    #[serde(rename_all = "camelCase")]
    Download {
        transfer_id: u64,
        chunks: usize,
        mime_type: String,
        filename: String,
        save_as: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::CaptureVisibleTab => "captureVisibleTab",
            Command::PageMetrics => "pageMetrics",
            Command::PageState => "pageState",
            Command::SuppressScrolling => "suppressScrolling",
            Command::RestorePageState { .. } => "restorePageState",
            Command::ScrollTo { .. } => "scrollTo",
            Command::CloneDocument { .. } => "cloneDocument",
            Command::LoadImage { .. } => "loadImage",
            Command::SetPlaceholder { .. } => "setPlaceholder",
            Command::Rasterize { .. } => "rasterize",
            Command::RemoveClone { .. } => "removeClone",
            Command::Download { .. } => "download",
        }
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a Command,
}

/// What the selection overlay should show
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum OverlayAction {
    Begin,
    Draw { rect: Rect, label: String },
    Cleanup,
}

/// Fire-and-forget message to the extension
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Outbound {
    Ack {
        success: bool,
    },
    #[serde(rename_all = "camelCase")]
    Notice {
        text: String,
        tone: NoticeTone,
        dismiss_after_ms: Option<u64>,
    },
    ClearNotice,
    SelectionUi(OverlayAction),
    /// Base64 slice of an artifact awaiting a `download` request
    #[serde(rename_all = "camelCase")]
    DownloadChunk {
        transfer_id: u64,
        seq: usize,
        data: String,
    },
}

/// Read one native messaging frame; `None` on a clean disconnect
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_ne_bytes(len_bytes) as usize;
    if len > MAX_INBOUND_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

/// Write one native messaging frame
///
/// Frames over the browser's limit are refused; the browser would close the
/// connection on them.
pub async fn write_frame<W>(writer: &mut W, message: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if message.len() > MAX_OUTBOUND_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "message of {} bytes exceeds the {} byte limit",
                message.len(),
                MAX_OUTBOUND_FRAME
            ),
        ));
    }

    writer
        .write_all(&(message.len() as u32).to_ne_bytes())
        .await?;
    writer.write_all(message).await?;
    writer.flush().await
}

struct PendingReplies {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
}

/// Removes a request's waiter when the request finishes or is cancelled
struct WaiterGuard<'a> {
    bridge: &'a ExtensionBridge,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.bridge.pending().waiters.remove(&self.id);
    }
}

/// Connection to the browser extension
pub struct ExtensionBridge {
    writer: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    pending: std::sync::Mutex<PendingReplies>,
    next_id: AtomicU64,
    selection_rx: Mutex<mpsc::Receiver<SelectionInput>>,
}

impl ExtensionBridge {
    /// Start the bridge on a reader/writer pair
    ///
    /// Returns the bridge and the receiver of user triggers. The trigger
    /// channel closes when the extension disconnects.
    pub fn spawn<R, W>(reader: R, writer: W) -> (Arc<Self>, mpsc::Receiver<Trigger>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
        let (selection_tx, selection_rx) = mpsc::channel(256);

        let bridge = Arc::new(Self {
            writer: Mutex::new(Box::new(writer)),
            pending: std::sync::Mutex::new(PendingReplies {
                closed: false,
                waiters: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            selection_rx: Mutex::new(selection_rx),
        });

        let task_bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            task_bridge.read_loop(reader, trigger_tx, selection_tx).await;
        });

        (bridge, trigger_rx)
    }

    async fn read_loop<R>(
        &self,
        mut reader: R,
        triggers: mpsc::Sender<Trigger>,
        selection: mpsc::Sender<SelectionInput>,
    ) where
        R: AsyncRead + Unpin,
    {
        debug!("Starting native messaging reader");

        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Extension disconnected");
                    break;
                }
                Err(e) => {
                    error!("Error reading extension message: {}", e);
                    break;
                }
            };

            let message = match serde_json::from_slice::<Inbound>(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring unrecognized extension message: {}", e);
                    continue;
                }
            };

            match message {
                Inbound::Reply(reply) => self.resolve(reply),
                Inbound::SelectionInput { input } => {
                    if selection.try_send(input).is_err() {
                        trace!("Dropping selection input {:?}", input);
                    }
                }
                Inbound::StartSelection { format } => {
                    self.accept(&triggers, Trigger::StartSelection(format)).await
                }
                Inbound::CaptureFullPage => self.accept(&triggers, Trigger::CaptureFullPage).await,
                Inbound::CapturePdf => self.accept(&triggers, Trigger::CapturePdf).await,
                Inbound::CaptureViewport => self.accept(&triggers, Trigger::CaptureViewport).await,
            }
        }

        // Fail every outstanding request
        let mut pending = self.pending();
        pending.closed = true;
        pending.waiters.clear();
    }

    /// Queue a trigger without ever waiting on the consumer
    ///
    /// The consumer may itself be waiting for a reply only this loop can
    /// deliver, so a full queue rejects the trigger instead.
    async fn accept(&self, triggers: &mpsc::Sender<Trigger>, trigger: Trigger) {
        trace!("Received trigger {:?}", trigger);
        let success = match triggers.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Capture queue full, rejecting {:?}", trigger);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Trigger receiver dropped, ignoring {:?}", trigger);
                false
            }
        };
        self.send(&Outbound::Ack { success }).await;
    }

    fn pending(&self) -> MutexGuard<'_, PendingReplies> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn waiting_requests(&self) -> usize {
        self.pending().waiters.len()
    }

    fn resolve(&self, reply: Reply) {
        let waiter = self.pending().waiters.remove(&reply.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => warn!("Reply for unknown request {}", reply.id),
        }
    }

    async fn write_json<T: Serialize>(&self, message: &T) -> Result<(), ChannelError> {
        let json = serde_json::to_vec(message).map_err(|e| ChannelError::new(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &json).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidInput => ChannelError::new(e.to_string()),
            _ => ChannelError::new(format!("connection lost: {}", e)),
        })
    }

    /// Send a message that expects no reply
    async fn send(&self, message: &Outbound) {
        if let Err(e) = self.write_json(message).await {
            warn!("Failed to send message to extension: {}", e);
        }
    }

    /// Send a request and wait for the extension's reply
    async fn request<T: DeserializeOwned>(&self, command: Command) -> Result<T, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending();
            if pending.closed {
                return Err(ChannelError::new("Could not establish connection"));
            }
            pending.waiters.insert(id, tx);
        }
        let _guard = WaiterGuard { bridge: self, id };

        trace!("Request {} {}", id, command.name());
        self.write_json(&Request { id, command: &command }).await?;

        let reply = rx
            .await
            .map_err(|_| ChannelError::new("connection closed before reply"))?;
        if let Some(message) = reply.error {
            return Err(ChannelError::new(message));
        }
        serde_json::from_value(reply.result).map_err(|e| {
            ChannelError::new(format!("malformed {} reply: {}", command.name(), e))
        })
    }
}

fn page_error(e: ChannelError) -> CaptureError {
    CaptureError::Page(e.message)
}

fn render_error(e: ChannelError) -> CaptureError {
    CaptureError::PdfRender(e.message)
}

#[async_trait::async_trait]
impl ViewportSource for ExtensionBridge {
    async fn capture_viewport_raster(&self) -> Result<RasterPayload, ChannelError> {
        let data_url: String = self.request(Command::CaptureVisibleTab).await?;
        from_data_url(&data_url).map_err(|e| ChannelError::new(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PageControl for ExtensionBridge {
    async fn metrics(&self) -> Result<PageMetrics, CaptureError> {
        self.request(Command::PageMetrics).await.map_err(page_error)
    }

    async fn page_state(&self) -> Result<PageState, CaptureError> {
        self.request(Command::PageState).await.map_err(page_error)
    }

    async fn suppress_scrolling(&self) -> Result<(), CaptureError> {
        self.request(Command::SuppressScrolling)
            .await
            .map_err(page_error)
    }

    async fn restore_page_state(&self, state: &PageState) -> Result<(), CaptureError> {
        self.request(Command::RestorePageState {
            state: state.clone(),
        })
        .await
        .map_err(page_error)
    }

    async fn scroll_to(&self, y: u32) -> Result<(), CaptureError> {
        self.request(Command::ScrollTo { y }).await.map_err(page_error)
    }
}

#[async_trait::async_trait]
impl DomRenderer for ExtensionBridge {
    async fn clone_document(
        &self,
        width: u32,
        height: u32,
        image_proxy: &str,
    ) -> Result<DetachedClone, CaptureError> {
        self.request(Command::CloneDocument {
            width,
            height,
            image_proxy: image_proxy.to_string(),
        })
        .await
        .map_err(render_error)
    }

    async fn load_image(
        &self,
        clone: &DetachedClone,
        index: usize,
        src: &str,
    ) -> Result<(), String> {
        self.request(Command::LoadImage {
            clone_id: clone.id.clone(),
            index,
            src: src.to_string(),
        })
        .await
        .map_err(|e| e.message)
    }

    async fn set_placeholder(
        &self,
        clone: &DetachedClone,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError> {
        self.request(Command::SetPlaceholder {
            clone_id: clone.id.clone(),
            index,
            width,
            height,
        })
        .await
        .map_err(render_error)
    }

    async fn rasterize(
        &self,
        clone: &DetachedClone,
        scale: f32,
    ) -> Result<RasterPayload, CaptureError> {
        let data_url: String = self
            .request(Command::Rasterize {
                clone_id: clone.id.clone(),
                scale,
            })
            .await
            .map_err(render_error)?;
        from_data_url(&data_url)
    }

    async fn remove_clone(&self, clone: &DetachedClone) -> Result<(), CaptureError> {
        self.request(Command::RemoveClone {
            clone_id: clone.id.clone(),
        })
        .await
        .map_err(render_error)
    }
}

#[async_trait::async_trait]
impl SelectionUi for ExtensionBridge {
    async fn begin(&self) {
        // Drop input left over from an earlier overlay
        let mut rx = self.selection_rx.lock().await;
        while rx.try_recv().is_ok() {}
        drop(rx);

        self.send(&Outbound::SelectionUi(OverlayAction::Begin)).await;
    }

    async fn next_input(&self) -> Option<SelectionInput> {
        self.selection_rx.lock().await.recv().await
    }

    async fn draw(&self, rect: Rect) {
        self.send(&Outbound::SelectionUi(OverlayAction::Draw {
            rect,
            label: rect.size_label(),
        }))
        .await;
    }

    async fn cleanup(&self) {
        self.send(&Outbound::SelectionUi(OverlayAction::Cleanup))
            .await;
    }
}

#[async_trait::async_trait]
impl ExportSink for ExtensionBridge {
    /// Stream the artifact in chunks that each fit one frame, then ask the
    /// extension to assemble and download it
    async fn save(&self, artifact: &ExportArtifact, prompt_user: bool) -> Result<(), CaptureError> {
        let transfer_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut chunks = 0;

        for (seq, chunk) in artifact.payload.chunks(DOWNLOAD_CHUNK_BYTES).enumerate() {
            self.write_json(&Outbound::DownloadChunk {
                transfer_id,
                seq,
                data: base64::engine::general_purpose::STANDARD.encode(chunk),
            })
            .await
            .map_err(|e| CaptureError::Export(e.message))?;
            chunks = seq + 1;
        }

        debug!(
            "Sent {} in {} chunks ({} bytes)",
            artifact.suggested_filename,
            chunks,
            artifact.payload.len()
        );

        self.request(Command::Download {
            transfer_id,
            chunks,
            mime_type: artifact.mime_type.to_string(),
            filename: artifact.suggested_filename.clone(),
            save_as: prompt_user,
        })
        .await
        .map_err(|e| CaptureError::Export(e.message))
    }
}

#[async_trait::async_trait]
impl Notifier for ExtensionBridge {
    async fn notify(&self, notice: Notice) {
        self.send(&Outbound::Notice {
            text: notice.text,
            tone: notice.tone,
            dismiss_after_ms: notice.dismiss_after.map(|d| d.as_millis() as u64),
        })
        .await;
    }

    async fn clear(&self) {
        self.send(&Outbound::ClearNotice).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    /// The extension side of a bridge under test
    struct Extension {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Extension {
        async fn recv(&mut self) -> Value {
            self.recv_sized().await.1
        }

        async fn recv_sized(&mut self) -> (usize, Value) {
            let frame = read_frame(&mut self.reader).await.unwrap().unwrap();
            (frame.len(), serde_json::from_slice(&frame).unwrap())
        }

        async fn send(&mut self, message: Value) {
            write_frame(&mut self.writer, &serde_json::to_vec(&message).unwrap())
                .await
                .unwrap();
        }

        async fn reply(&mut self, id: &Value, result: Value) {
            self.send(json!({"type": "reply", "id": id, "result": result}))
                .await;
        }
    }

    fn connect() -> (Arc<ExtensionBridge>, mpsc::Receiver<Trigger>, Extension) {
        let (host, extension) = tokio::io::duplex(1 << 20);
        let (host_reader, host_writer) = tokio::io::split(host);
        let (ext_reader, ext_writer) = tokio::io::split(extension);
        let (bridge, triggers) = ExtensionBridge::spawn(host_reader, host_writer);
        (
            bridge,
            triggers,
            Extension {
                reader: ext_reader,
                writer: ext_writer,
            },
        )
    }

    #[tokio::test]
    async fn test_frame_uses_native_endian_length() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"a":1}"#).await.unwrap();
        assert_eq!(&buf[..4], &7u32.to_ne_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(
            read_frame(&mut cursor).await.unwrap(),
            Some(br#"{"a":1}"#.to_vec())
        );
        assert_eq!(read_frame(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_triggers_are_acked() {
        let (_bridge, mut triggers, mut ext) = connect();

        ext.send(json!({"type": "startSelection", "format": "pdf"}))
            .await;
        assert_eq!(ext.recv().await, json!({"type": "ack", "success": true}));
        assert_eq!(
            triggers.recv().await,
            Some(Trigger::StartSelection(OutputFormat::Pdf))
        );

        ext.send(json!({"type": "capturePDF"})).await;
        assert_eq!(ext.recv().await["type"], "ack");
        assert_eq!(triggers.recv().await, Some(Trigger::CapturePdf));
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let (bridge, _triggers, mut ext) = connect();

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.metrics().await }
        });

        let request = ext.recv().await;
        assert_eq!(request["type"], "pageMetrics");
        ext.reply(
            &request["id"],
            json!({"viewportWidth": 800, "viewportHeight": 600, "fullWidth": 800, "fullHeight": 2400}),
        )
        .await;

        let metrics = host.await.unwrap().unwrap();
        assert_eq!(metrics.full_height, 2400);
        assert_eq!(metrics.viewport_height, 600);
    }

    #[tokio::test]
    async fn test_scroll_request_shape() {
        let (bridge, _triggers, mut ext) = connect();

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scroll_to(950).await }
        });

        let request = ext.recv().await;
        assert_eq!(request["type"], "scrollTo");
        assert_eq!(request["y"], 950);
        ext.reply(&request["id"], Value::Null).await;
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_becomes_channel_error() {
        let (bridge, _triggers, mut ext) = connect();

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.capture_viewport_raster().await }
        });

        let request = ext.recv().await;
        assert_eq!(request["type"], "captureVisibleTab");
        ext.send(json!({"type": "reply", "id": request["id"], "error": "Tab not found"}))
            .await;

        let err = host.await.unwrap().unwrap_err();
        assert_eq!(err.message, "Tab not found");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_disconnect_fails_requests_as_transient() {
        let (bridge, _triggers, ext) = connect();
        drop(ext);

        let err = bridge.capture_viewport_raster().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_selection_input_is_routed() {
        let (bridge, _triggers, mut ext) = connect();

        bridge.begin().await;
        assert_eq!(
            ext.recv().await,
            json!({"type": "selectionUi", "action": "begin"})
        );

        ext.send(json!({"type": "selectionInput", "input": {"kind": "pointerDown", "x": 5, "y": 6}}))
            .await;
        assert_eq!(
            bridge.next_input().await,
            Some(SelectionInput::PointerDown { x: 5, y: 6 })
        );

        bridge.draw(Rect::new(5, 6, 300, 400)).await;
        let draw = ext.recv().await;
        assert_eq!(draw["action"], "draw");
        assert_eq!(draw["label"], "300 × 400");
    }

    #[tokio::test]
    async fn test_download_is_chunked_then_requested() {
        let (bridge, _triggers, mut ext) = connect();
        let artifact = ExportArtifact::pdf(b"%PDF-1.5".to_vec(), "fullpage.pdf");

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.save(&artifact, true).await }
        });

        let chunk = ext.recv().await;
        assert_eq!(chunk["type"], "downloadChunk");
        assert_eq!(chunk["seq"], 0);
        let data = base64::engine::general_purpose::STANDARD
            .decode(chunk["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(data, b"%PDF-1.5");

        let request = ext.recv().await;
        assert_eq!(request["type"], "download");
        assert_eq!(request["transferId"], chunk["transferId"]);
        assert_eq!(request["chunks"], 1);
        assert_eq!(request["mimeType"], "application/pdf");
        assert_eq!(request["filename"], "fullpage.pdf");
        assert_eq!(request["saveAs"], true);
        ext.reply(&request["id"], Value::Null).await;
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_large_download_fits_frame_limit() {
        let (bridge, _triggers, mut ext) = connect();
        let payload: Vec<u8> = (0..2_500_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let artifact = ExportArtifact::jpeg(payload.clone(), "fullpage.jpg");

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.save(&artifact, false).await }
        });

        let mut encoded = String::new();
        let mut seqs = Vec::new();
        let request = loop {
            let (len, message) = ext.recv_sized().await;
            assert!(len <= MAX_OUTBOUND_FRAME, "frame of {} bytes", len);
            if message["type"] == "downloadChunk" {
                seqs.push(message["seq"].as_u64().unwrap());
                encoded.push_str(message["data"].as_str().unwrap());
            } else {
                break message;
            }
        };

        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(request["chunks"], 5);
        let joined = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        assert_eq!(joined, payload);

        ext.reply(&request["id"], Value::Null).await;
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_refused() {
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &vec![b'x'; MAX_OUTBOUND_FRAME + 1])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_full_trigger_queue_never_blocks_replies() {
        let (bridge, _triggers, mut ext) = connect();

        let host = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.metrics().await }
        });
        let request = ext.recv().await;

        for _ in 0..20 {
            ext.send(json!({"type": "captureFullPage"})).await;
        }
        let mut acks = Vec::new();
        for _ in 0..20 {
            let ack = tokio::time::timeout(std::time::Duration::from_secs(2), ext.recv())
                .await
                .expect("reader stalled on the trigger queue");
            acks.push(ack["success"].as_bool().unwrap());
        }
        assert_eq!(acks.iter().filter(|ok| **ok).count(), TRIGGER_QUEUE);
        assert!(!acks[19]);

        ext.reply(
            &request["id"],
            json!({"viewportWidth": 800, "viewportHeight": 600, "fullWidth": 800, "fullHeight": 600}),
        )
        .await;
        let metrics = tokio::time::timeout(std::time::Duration::from_secs(2), host)
            .await
            .expect("reply never delivered")
            .unwrap()
            .unwrap();
        assert_eq!(metrics.full_height, 600);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_waiter() {
        let (bridge, _triggers, _ext) = connect();
        let clone = DetachedClone {
            id: "clone-1".to_string(),
            images: Vec::new(),
        };

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            bridge.load_image(&clone, 0, "https://slow.example/a.png"),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(bridge.waiting_requests(), 0);
    }

    #[tokio::test]
    async fn test_notice_message() {
        let (bridge, _triggers, mut ext) = connect();

        bridge
            .notify(Notice::error(
                "Capture failed, please retry",
                std::time::Duration::from_millis(2000),
            ))
            .await;
        assert_eq!(
            ext.recv().await,
            json!({
                "type": "notice",
                "text": "Capture failed, please retry",
                "tone": "error",
                "dismissAfterMs": 2000
            })
        );
    }
}
