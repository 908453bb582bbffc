//! Operator-facing notifications derived from submission outcomes.
//!
//! One notification is visible at a time. Success, duplicate and ordinary
//! error notifications dismiss themselves; network failures stay up until
//! the operator acknowledges them.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::attendance::{AttendanceOutcome, ErrorKind};

/// Auto-dismiss delay for success notifications.
pub const SUCCESS_DISMISS_MS: u64 = 3000;
/// Auto-dismiss delay for already-marked notifications.
pub const DUPLICATE_DISMISS_MS: u64 = 3000;
/// Auto-dismiss delay for validation/server errors and scanner faults.
pub const ERROR_DISMISS_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Tone {
    Success,
    Duplicate,
    Error,
    NetworkError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    pub tone: Tone,
    pub title: String,
    pub message: String,
    /// `None` means the notification persists until acknowledged.
    pub dismiss_after_ms: Option<u64>,
}

impl Notification {
    pub fn for_outcome(outcome: &AttendanceOutcome) -> Self {
        match outcome {
            AttendanceOutcome::Success {
                person_id,
                display_name,
                session,
            } => Self {
                tone: Tone::Success,
                title: "Attendance Marked Successfully!".into(),
                message: format!("{display_name} (ID: {person_id}) - {} Session", session.label()),
                dismiss_after_ms: Some(SUCCESS_DISMISS_MS),
            },
            AttendanceOutcome::AlreadyMarked {
                person_id,
                display_name,
                session,
                marked_at,
            } => Self {
                tone: Tone::Duplicate,
                title: "Already Signed In".into(),
                message: format!(
                    "{display_name} (ID: {person_id}) already signed in for the {} session at {}",
                    session.as_str(),
                    marked_at.format("%H:%M:%S"),
                ),
                dismiss_after_ms: Some(DUPLICATE_DISMISS_MS),
            },
            AttendanceOutcome::Error {
                kind: ErrorKind::Network,
                message,
                ..
            } => Self {
                tone: Tone::NetworkError,
                title: "Connection Problem".into(),
                message: format!("{message}. Check the connection, then acknowledge to retry."),
                dismiss_after_ms: None,
            },
            AttendanceOutcome::Error { message, .. } => Self {
                tone: Tone::Error,
                title: "Attendance Not Marked".into(),
                message: message.clone(),
                dismiss_after_ms: Some(ERROR_DISMISS_MS),
            },
        }
    }

    /// A camera/permission problem reported by the decode source.
    pub fn scanner_fault(message: &str) -> Self {
        Self {
            tone: Tone::Error,
            title: "Scanner Error".into(),
            message: format!("QR Scan Error: {message}"),
            dismiss_after_ms: Some(ERROR_DISMISS_MS),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.dismiss_after_ms.is_none()
    }
}

/// Holds the single visible notification and expires it on schedule.
#[derive(Debug, Default)]
pub struct NotificationTray {
    current: Option<(Notification, Option<Instant>)>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `notification`, replacing whatever was visible.
    pub fn show(&mut self, notification: Notification, now: Instant) {
        let expires_at = notification
            .dismiss_after_ms
            .map(|ms| now + Duration::from_millis(ms));
        self.current = Some((notification, expires_at));
    }

    /// The visible notification, if it has not expired by `now`.
    pub fn visible(&mut self, now: Instant) -> Option<&Notification> {
        if let Some((_, Some(expires_at))) = &self.current {
            if now >= *expires_at {
                self.current = None;
            }
        }
        self.current.as_ref().map(|(n, _)| n)
    }

    /// Operator dismissed the visible notification.
    pub fn acknowledge(&mut self) -> Option<Notification> {
        self.current.take().map(|(n, _)| n)
    }
}
