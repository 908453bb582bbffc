//! Shared fixtures for scanner integration tests: an in-memory backend and
//! a decode source whose signals the test drives by hand.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use rollcall_client::api::{ApiError, AttendanceApi, RawResponse};
use rollcall_core::attendance::{AttendanceOutcome, AttendanceRequest, AttendanceTarget, EventContext, Session};
use rollcall_core::event::Event;
use rollcall_core::history::AttendanceRecord;
use rollcall_core::roster::RosterEntry;
use rollcall_core::student::Student;
use rollcall_events::{KioskEvent, KioskEventKind};
use rollcall_scanner::decode::{CameraInfo, DecodeConfig, DecodeError, DecodeSink, DecodeSource};

pub fn ctx() -> EventContext {
    EventContext::new("evt-1", "Foundation Day", Session::Morning)
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeApi {
    /// Every mark attempt: the code, or the record id on the manual path.
    marks: Mutex<Vec<String>>,
    searches: Mutex<Vec<String>>,
    search_delays: Mutex<HashMap<String, Duration>>,
    offline: AtomicBool,
    duplicate: AtomicBool,
}

impl FakeApi {
    pub fn marks(&self) -> Vec<String> {
        self.marks.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every mark with "already signed in".
    pub fn set_duplicate(&self, duplicate: bool) {
        self.duplicate.store(duplicate, Ordering::SeqCst);
    }

    pub fn slow_search(&self, query: &str, delay: Duration) {
        self.search_delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }
}

/// Eight matches for any query, with `query` as their last name.
pub fn students_for(query: &str) -> Vec<Student> {
    (1..=8)
        .map(|n| Student {
            id: format!("rec-{n}"),
            student_id: format!("2021-{n:03}"),
            first_name: "Juan".into(),
            last_name: query.to_string(),
            year_level: None,
            major: None,
            organization: None,
        })
        .collect()
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn mark_attendance(&self, request: &AttendanceRequest) -> Result<RawResponse, ApiError> {
        let key = match &request.target {
            AttendanceTarget::Code(code) => code.clone(),
            AttendanceTarget::Person { id, .. } => id.clone(),
        };
        self.marks.lock().unwrap().push(key.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection refused".into()));
        }
        if self.duplicate.load(Ordering::SeqCst) {
            return Ok(RawResponse {
                status: 409,
                body: json!({
                    "message": "already signed in",
                    "student": {
                        "studentName": "Juan Dela Cruz",
                        "studentId": "2021-001",
                        "signInTime": "2025-01-01T08:00:00Z",
                    },
                }),
            });
        }

        let body = match &request.target {
            AttendanceTarget::Code(code) => json!({
                "message": "Attendance marked",
                "student": { "studentName": format!("Student {code}"), "studentId": code },
            }),
            AttendanceTarget::Person { .. } => json!({ "message": "Attendance marked" }),
        };
        Ok(RawResponse { status: 201, body })
    }

    async fn search_students(&self, query: &str) -> Result<Vec<Student>, ApiError> {
        self.searches.lock().unwrap().push(query.to_string());
        let delay = self.search_delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(students_for(query))
    }

    async fn list_events(&self) -> Result<Vec<Event>, ApiError> {
        Ok(Vec::new())
    }

    async fn event_roster(&self, _event_id: &str) -> Result<Vec<RosterEntry>, ApiError> {
        Ok(Vec::new())
    }

    async fn my_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Scripted decode source
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SpyState {
    /// Most recent sink handed to `start`, kept after `stop` so tests can
    /// deliver late signals.
    sink: Mutex<Option<DecodeSink>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    starts: Mutex<Vec<String>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
}

/// Test-side view of a [`MockSource`].
#[derive(Clone, Default)]
pub struct SourceSpy {
    state: Arc<SpyState>,
}

impl SourceSpy {
    pub fn emit(&self, code: &str) -> bool {
        match self.state.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.decoded(code),
            None => false,
        }
    }

    pub fn error(&self, message: &str) -> bool {
        match self.state.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.error(message),
            None => false,
        }
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running sources seen.
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> Vec<String> {
        self.state.starts.lock().unwrap().clone()
    }

    pub fn fail_next_starts(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make `stop` fail and leave the source running.
    pub fn fail_next_stops(&self, fail: bool) {
        self.state.fail_stop.store(fail, Ordering::SeqCst);
    }
}

pub struct MockSource {
    spy: SourceSpy,
    cameras: Vec<CameraInfo>,
    running: bool,
}

impl MockSource {
    pub fn new(spy: SourceSpy, camera_ids: &[&str]) -> Self {
        Self {
            spy,
            cameras: camera_ids
                .iter()
                .map(|id| CameraInfo::new(*id, None))
                .collect(),
            running: false,
        }
    }
}

#[async_trait]
impl DecodeSource for MockSource {
    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, DecodeError> {
        Ok(self.cameras.clone())
    }

    async fn start(
        &mut self,
        camera_id: &str,
        _config: &DecodeConfig,
        sink: DecodeSink,
    ) -> Result<(), DecodeError> {
        let state = &self.spy.state;
        if state.fail_start.load(Ordering::SeqCst) {
            return Err(DecodeError::PermissionDenied("NotAllowedError".into()));
        }
        if !self.cameras.iter().any(|c| c.id == camera_id) {
            return Err(DecodeError::CameraNotFound(camera_id.to_string()));
        }

        let now_active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        state.starts.lock().unwrap().push(camera_id.to_string());
        *state.sink.lock().unwrap() = Some(sink);
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DecodeError> {
        if !self.running {
            return Ok(());
        }
        if self.spy.state.fail_stop.load(Ordering::SeqCst) {
            return Err(DecodeError::Device("camera busy".into()));
        }
        // Releasing a camera takes a while.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.spy.state.active.fetch_sub(1, Ordering::SeqCst);
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// ---------------------------------------------------------------------------
// Bus helpers
// ---------------------------------------------------------------------------

const EVENT_WAIT: Duration = Duration::from_secs(30);

pub async fn next_outcome(rx: &mut broadcast::Receiver<KioskEvent>) -> AttendanceOutcome {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            if let KioskEventKind::Outcome { outcome, .. } = rx.recv().await.unwrap().kind {
                return outcome;
            }
        }
    })
    .await
    .expect("no outcome published")
}

pub async fn next_fault(rx: &mut broadcast::Receiver<KioskEvent>) -> String {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            if let KioskEventKind::ScannerFault { message, .. } = rx.recv().await.unwrap().kind {
                return message;
            }
        }
    })
    .await
    .expect("no scanner fault published")
}
