//! Decode source contract.
//!
//! A decode source turns frames from a capture device into decoded text.
//! How it does so is opaque to the controller: it only lists cameras,
//! starts against one with a [`DecodeSink`], and stops. Every start gets a
//! fresh epoch so signals from a source that has since been stopped can be
//! recognised and dropped.

use async_trait::async_trait;
use rollcall_core::scan::DEFAULT_SCAN_FPS;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Cameras and configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    pub label: Option<String>,
}

impl CameraInfo {
    pub fn new(id: impl Into<String>, label: Option<String>) -> Self {
        Self {
            id: id.into(),
            label,
        }
    }

    /// Label for camera pickers; unlabeled devices show as `Camera <id>`.
    pub fn display_label(&self) -> String {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("Camera {}", self.id),
        }
    }
}

/// The camera selected when the operator has not picked one.
pub fn default_camera(cameras: &[CameraInfo]) -> Option<&CameraInfo> {
    cameras.first()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera on phones and tablets.
    Environment,
    User,
}

/// Capture and decode parameters handed to the source on start.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeConfig {
    pub fps: u32,
    /// Side of the square scan region, in pixels.
    pub qrbox: u32,
    pub aspect_ratio: f32,
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub disable_flip: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_SCAN_FPS,
            qrbox: 300,
            aspect_ratio: 1.0,
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            disable_flip: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// One successfully decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub code: String,
    pub observed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeSignal {
    Decoded { epoch: u64, event: ScanEvent },
    /// Best-effort error text from the decoder.
    Error { epoch: u64, message: String },
}

impl DecodeSignal {
    pub fn epoch(&self) -> u64 {
        match self {
            DecodeSignal::Decoded { epoch, .. } | DecodeSignal::Error { epoch, .. } => *epoch,
        }
    }
}

/// Callback pair a source reports through, bound to one start.
#[derive(Debug, Clone)]
pub struct DecodeSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<DecodeSignal>,
}

impl DecodeSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<DecodeSignal>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report decoded text. Returns `false` once the controller is gone.
    pub fn decoded(&self, code: impl Into<String>) -> bool {
        self.tx
            .send(DecodeSignal::Decoded {
                epoch: self.epoch,
                event: ScanEvent {
                    code: code.into(),
                    observed_at: Instant::now(),
                },
            })
            .is_ok()
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.tx
            .send(DecodeSignal::Error {
                epoch: self.epoch,
                message: message.into(),
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera device error: {0}")]
    Device(String),
}

#[async_trait]
pub trait DecodeSource: Send + Sync {
    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, DecodeError>;

    /// Begin decoding from `camera_id`, reporting through `sink` until
    /// [`stop`](DecodeSource::stop) returns.
    async fn start(
        &mut self,
        camera_id: &str,
        config: &DecodeConfig,
        sink: DecodeSink,
    ) -> Result<(), DecodeError>;

    /// Stop decoding and release the device. A no-op when not running.
    async fn stop(&mut self) -> Result<(), DecodeError>;

    fn is_running(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Decoder error triage
// ---------------------------------------------------------------------------

/// Routine per-frame "nothing here" conditions.
const BENIGN_DECODER_ERRORS: &[&str] = &[
    "NotFoundException",
    "No MultiFormat Readers",
    "No barcode detected",
];

/// Conditions the operator has to act on.
const SURFACED_DECODER_ERRORS: &[&str] = &["permission", "NotAllowedError", "camera", "device"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderNoise {
    /// Expected at frame rate; dropped without logging.
    Benign,
    /// Permission, device or configuration problem shown to the operator.
    Surfaced,
    /// Anything else: logged, not shown.
    Advisory,
}

pub fn classify_decoder_error(message: &str) -> DecoderNoise {
    if BENIGN_DECODER_ERRORS.iter().any(|m| message.contains(m)) {
        return DecoderNoise::Benign;
    }
    let lower = message.to_lowercase();
    if SURFACED_DECODER_ERRORS
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()))
    {
        return DecoderNoise::Surfaced;
    }
    DecoderNoise::Advisory
}
