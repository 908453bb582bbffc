//! Public live roster poller.
//!
//! Fetches an event's public roster once on start and then on a fixed
//! interval until [`RosterPoller::stop`] is called. A failed first load is
//! published as `RosterUnavailable`; later failures keep the last good
//! roster and are only logged.

use std::sync::Arc;
use std::time::Duration;

use rollcall_core::roster::{filter_roster, RosterEntry, ROSTER_POLL_INTERVAL_SECS};
use rollcall_core::types::RecordId;
use rollcall_events::{EventBus, KioskEvent, KioskEventKind};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::AttendanceApi;

pub struct RosterPoller {
    event_id: RecordId,
    entries: Arc<RwLock<Vec<RosterEntry>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RosterPoller {
    /// Start polling with the default 30 s interval.
    pub fn start(api: Arc<dyn AttendanceApi>, bus: Arc<EventBus>, event_id: impl Into<RecordId>) -> Self {
        Self::with_interval(
            api,
            bus,
            event_id,
            Duration::from_secs(ROSTER_POLL_INTERVAL_SECS),
        )
    }

    pub fn with_interval(
        api: Arc<dyn AttendanceApi>,
        bus: Arc<EventBus>,
        event_id: impl Into<RecordId>,
        interval: Duration,
    ) -> Self {
        let event_id = event_id.into();
        let entries = Arc::new(RwLock::new(Vec::new()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poll_loop(
            api,
            bus,
            event_id.clone(),
            interval,
            Arc::clone(&entries),
            cancel.clone(),
        ));

        Self {
            event_id,
            entries,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// The last successfully loaded roster.
    pub async fn entries(&self) -> Vec<RosterEntry> {
        self.entries.read().await.clone()
    }

    /// Entries matching `term` on last name, first name or student id.
    pub async fn search(&self, term: &str) -> Vec<RosterEntry> {
        let entries = self.entries.read().await;
        filter_roster(&entries, term).into_iter().cloned().collect()
    }

    /// Stop polling and wait for the task to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
            tracing::info!(event_id = %self.event_id, "Roster poller stopped");
        }
    }
}

impl Drop for RosterPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    api: Arc<dyn AttendanceApi>,
    bus: Arc<EventBus>,
    event_id: RecordId,
    interval: Duration,
    entries: Arc<RwLock<Vec<RosterEntry>>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut first_load = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = api.event_roster(&event_id) => result,
        };

        let first = std::mem::replace(&mut first_load, false);
        match result {
            Ok(fresh) => {
                let count = fresh.len();
                *entries.write().await = fresh;
                tracing::debug!(event_id = %event_id, count, "Roster refreshed");
                bus.publish(KioskEvent::new(KioskEventKind::RosterUpdated {
                    event_id: event_id.clone(),
                    entries: count,
                }));
            }
            Err(e) if first => {
                tracing::error!(event_id = %event_id, error = %e, "Failed to load roster");
                bus.publish(KioskEvent::new(KioskEventKind::RosterUnavailable {
                    event_id: event_id.clone(),
                    message: "Failed to load attendance data.".into(),
                }));
            }
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Roster refresh failed, keeping last roster");
            }
        }
    }
}
