//! Terminal presentation: renders bus events as structured log lines and
//! keeps the single visible notification.

use std::time::Instant;

use rollcall_core::notification::{Notification, NotificationTray, Tone};
use rollcall_core::scan::{ScanPhase, ScanSnapshot};
use rollcall_events::{Channel, KioskEvent, KioskEventKind};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Default)]
pub struct Console {
    tray: NotificationTray,
    phase: Option<ScanPhase>,
    network_blocked: bool,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&mut self, now: Instant) -> Option<&Notification> {
        self.tray.visible(now)
    }

    pub fn handle(&mut self, event: &KioskEvent, now: Instant) {
        match &event.kind {
            KioskEventKind::Outcome {
                channel,
                notification,
                ..
            } => {
                render_notification(notification, Some(*channel));
                self.tray.show(notification.clone(), now);
            }
            KioskEventKind::ScannerState { snapshot } => self.on_state(snapshot),
            KioskEventKind::ScannerFault { notification, .. } => {
                render_notification(notification, None);
                self.tray.show(notification.clone(), now);
            }
            KioskEventKind::RosterUpdated { event_id, entries } => {
                tracing::info!(event_id = %event_id, signed_in = entries, "Live roster refreshed");
            }
            KioskEventKind::RosterUnavailable { event_id, message } => {
                tracing::warn!(event_id = %event_id, "{message}");
            }
            KioskEventKind::SessionExpired => {
                tracing::error!("Session expired: set a fresh API_TOKEN and restart the kiosk");
            }
        }
    }

    fn on_state(&mut self, snapshot: &ScanSnapshot) {
        if self.phase != Some(snapshot.phase) {
            tracing::info!(
                phase = ?snapshot.phase,
                camera = snapshot.active_camera.as_deref().unwrap_or("-"),
                "Scanner state changed",
            );
            self.phase = Some(snapshot.phase);
        }
        if let Some(secs) = snapshot.seconds_remaining() {
            tracing::debug!(seconds_remaining = secs, "Processing");
        }
        if self.network_blocked && !snapshot.network_blocked {
            let cleared = self.tray.acknowledge();
            if cleared.is_some_and(|n| n.is_persistent()) {
                tracing::info!("Connection problem acknowledged, scanning resumed");
            }
        }
        self.network_blocked = snapshot.network_blocked;
    }
}

fn render_notification(n: &Notification, channel: Option<Channel>) {
    let channel = channel.map(|c| format!("{c:?}")).unwrap_or_else(|| "Scanner".into());
    match n.tone {
        Tone::Success | Tone::Duplicate => {
            tracing::info!(channel = %channel, "{}: {}", n.title, n.message);
        }
        Tone::Error => {
            tracing::warn!(channel = %channel, "{}: {}", n.title, n.message);
        }
        Tone::NetworkError => {
            tracing::error!(channel = %channel, "{}: {} (type /ack when back online)", n.title, n.message);
        }
    }
}

/// Render events until the bus closes.
pub async fn run(mut events: broadcast::Receiver<KioskEvent>) {
    let mut console = Console::new();
    loop {
        match events.recv().await {
            Ok(event) => console.handle(&event, Instant::now()),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Console fell behind, events skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::attendance::{AttendanceOutcome, ErrorKind, Session};
    use std::time::Duration;

    fn state(network_blocked: bool) -> KioskEvent {
        KioskEvent::new(KioskEventKind::ScannerState {
            snapshot: ScanSnapshot {
                phase: ScanPhase::Scanning,
                is_processing: false,
                last_message: None,
                last_processed_code: None,
                active_camera: Some("wedge".into()),
                cooldown_remaining_ms: None,
                network_blocked,
            },
        })
    }

    #[test]
    fn success_notification_auto_dismisses() {
        let t0 = Instant::now();
        let mut console = Console::new();
        console.handle(
            &KioskEvent::outcome(
                Channel::Scanner,
                AttendanceOutcome::Success {
                    person_id: "2021-001".into(),
                    display_name: "Juan Dela Cruz".into(),
                    session: Session::Morning,
                },
            ),
            t0,
        );
        assert_eq!(console.visible(t0).map(|n| n.tone), Some(Tone::Success));
        assert!(console.visible(t0 + Duration::from_secs(3)).is_none());
    }

    #[test]
    fn network_banner_stays_until_block_is_lifted() {
        let t0 = Instant::now();
        let mut console = Console::new();
        console.handle(
            &KioskEvent::outcome(
                Channel::Manual,
                AttendanceOutcome::error(ErrorKind::Network, "Unable to reach the attendance server"),
            ),
            t0,
        );
        console.handle(&state(true), t0);

        let later = t0 + Duration::from_secs(60);
        assert_eq!(console.visible(later).map(|n| n.tone), Some(Tone::NetworkError));

        console.handle(&state(false), later);
        assert!(console.visible(later).is_none());
    }

    #[test]
    fn newer_notification_replaces_older() {
        let t0 = Instant::now();
        let mut console = Console::new();
        console.handle(&KioskEvent::scanner_fault("NotAllowedError"), t0);
        console.handle(
            &KioskEvent::outcome(Channel::Scanner, AttendanceOutcome::error(ErrorKind::Server, "Invalid QR code")),
            t0,
        );
        let visible = console.visible(t0).unwrap();
        assert_eq!(visible.message, "Invalid QR code");
    }
}
