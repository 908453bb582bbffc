//! Scanner phases and the state snapshot exposed to the presentation layer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Default minimum time before the scanner re-arms after a submission.
pub const DEFAULT_COOLDOWN_MS: u64 = 3000;

/// Frame sampling rate requested from the decode source.
pub const DEFAULT_SCAN_FPS: u32 = 10;

/// Feedback shown while an accepted code is being handled.
pub const ACCEPTED_MESSAGE: &str = "QR Code scanned successfully! Ready for next scan...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ScanPhase {
    /// No event/session selected, no decode source.
    Idle,
    /// Camera and event selected, decode source not yet running.
    Ready,
    /// Decode source running and accepting new codes.
    Scanning,
    /// A code was accepted; submission pending or cooling down.
    Processing,
    /// Decode source stopped; recoverable with a manual restart.
    Stopped,
}

impl ScanPhase {
    /// Whether the decode source is expected to be running.
    pub fn is_running(self) -> bool {
        matches!(self, ScanPhase::Scanning | ScanPhase::Processing)
    }
}

/// Read-only view of the scan controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScanSnapshot {
    pub phase: ScanPhase,
    pub is_processing: bool,
    pub last_message: Option<String>,
    pub last_processed_code: Option<String>,
    pub active_camera: Option<String>,
    /// Time left before the scanner re-arms, while cooling down.
    pub cooldown_remaining_ms: Option<u64>,
    /// A network failure is awaiting acknowledgment; decodes are dropped.
    pub network_blocked: bool,
}

impl ScanSnapshot {
    /// Whole seconds left in the cooldown, rounded up.
    pub fn seconds_remaining(&self) -> Option<u64> {
        self.cooldown_remaining_ms.map(|ms| ms.div_ceil(1000))
    }
}
