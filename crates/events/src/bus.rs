//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the fan-out point between the attendance logic and the
//! presentation layer. It is designed to be shared via `Arc<EventBus>`.

use chrono::Utc;
use rollcall_core::attendance::AttendanceOutcome;
use rollcall_core::notification::Notification;
use rollcall_core::scan::ScanSnapshot;
use rollcall_core::types::{RecordId, Timestamp};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// KioskEvent
// ---------------------------------------------------------------------------

/// Which input path produced a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Scanner,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum KioskEventKind {
    /// A submission finished; `notification` is what the operator sees.
    Outcome {
        channel: Channel,
        outcome: AttendanceOutcome,
        notification: Notification,
    },

    /// The scan controller changed phase.
    ScannerState { snapshot: ScanSnapshot },

    /// The decode source reported a permission/device/configuration problem.
    ScannerFault { message: String, notification: Notification },

    /// The public roster was refreshed.
    RosterUpdated { event_id: RecordId, entries: usize },

    /// The public roster could not be loaded at all.
    RosterUnavailable { event_id: RecordId, message: String },

    /// The backend rejected the bearer token; the auth layer should end the session.
    SessionExpired,
}

/// An event published on the bus, stamped with its creation time.
#[derive(Debug, Clone, Serialize)]
pub struct KioskEvent {
    #[serde(flatten)]
    pub kind: KioskEventKind,
    pub timestamp: Timestamp,
}

impl KioskEvent {
    pub fn new(kind: KioskEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn outcome(channel: Channel, outcome: AttendanceOutcome) -> Self {
        let notification = Notification::for_outcome(&outcome);
        Self::new(KioskEventKind::Outcome {
            channel,
            outcome,
            notification,
        })
    }

    pub fn scanner_fault(message: impl Into<String>) -> Self {
        let message = message.into();
        let notification = Notification::scanner_fault(&message);
        Self::new(KioskEventKind::ScannerFault {
            message,
            notification,
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use rollcall_events::bus::{EventBus, KioskEvent, KioskEventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(KioskEvent::new(KioskEventKind::SessionExpired));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<KioskEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: KioskEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
