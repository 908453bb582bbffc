//! Scan session state machine.
//!
//! [`ScanSession`] holds every piece of scanner bookkeeping and performs no
//! I/O. Callers pass the current instant and act on what each operation
//! returns (start or stop the decode source, submit an intent, sleep until
//! [`ScanSession::cooldown_deadline`]).
//!
//! Phases:
//!
//! ```text
//! Idle --activate--> Ready --source_started--> Scanning --accept--> Processing
//!                                                  ^                    |
//!                                                  +---cooldown/restart-+
//! Processing --complete (no auto-restart) / stop--> Stopped --restart--> Ready
//! any --deactivate--> Idle
//! ```
//!
//! De-duplication keys off the last *processed* code: once a code is
//! accepted it is ignored until a different code is accepted or the
//! operator restarts the scanner. Cooldown expiry does not re-arm it.

use std::time::Duration;

use rollcall_core::attendance::{AttendanceOutcome, AttendanceRequest, EventContext};
use rollcall_core::error::CoreError;
use rollcall_core::scan::{ScanPhase, ScanSnapshot, ACCEPTED_MESSAGE, DEFAULT_COOLDOWN_MS};
use tokio::time::Instant;
use uuid::Uuid;

use crate::timer::OneShotTimer;

pub const NO_EVENT_SELECTED: &str = "no event selected";
pub const NO_CAMERA_SELECTED: &str = "no camera selected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Minimum time after a completed submission before scanning resumes.
    pub cooldown: Duration,
    /// Resume scanning after the cooldown; otherwise stop after each submission.
    pub auto_restart: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            auto_restart: true,
        }
    }
}

/// An accepted code, ready to hand to the submission gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIntent {
    pub id: Uuid,
    pub code: String,
    pub context: EventContext,
}

impl ScanIntent {
/// The backend request for this intent.
    pub fn request(&self) -> AttendanceRequest {
        AttendanceRequest::for_code(self.code.clone(), &self.context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session, or the decode source is not running.
    Inactive,
    /// Signal from a decode source that has since been stopped.
    StaleSource,
    Empty,
    NetworkBlocked,
    /// A submission is in flight.
    InFlight,
    SameCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeDecision {
    Accepted(ScanIntent),
    Ignored(IgnoreReason),
}

/// What the caller must do after a submission completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The intent is no longer current; publish the outcome, change nothing.
    Stale,
    /// Sleep until the deadline, then call `on_cooldown_elapsed`.
    CoolingDown(Instant),
    /// Stop the decode source.
    StopSource,
    /// Completed while the scanner was already stopped.
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restart {
    /// The source is still running; scanning resumes immediately.
    Resume,
    /// Start the source on `camera` with sink epoch `epoch`.
    StartSource { epoch: u64, camera: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSwitch {
    /// Selection recorded; nothing is running.
    Recorded,
    /// Stop the running source, then start on `camera` with `epoch`.
    Restart { epoch: u64, camera: String },
}

/// Scanner bookkeeping for one kiosk; see the module docs for phases.
#[derive(Debug)]
pub struct ScanSession {
    settings: ScanSettings,
    phase: ScanPhase,
    context: Option<EventContext>,
    camera: Option<String>,
    /// Bumped whenever the decode source is (re)started or released.
    epoch: u64,
    last_processed_code: Option<String>,
    in_flight: Option<Uuid>,
    cooldown: OneShotTimer,
    last_message: Option<String>,
    network_blocked: bool,
}

impl ScanSession {
    /// An idle session with no event or camera.
    pub fn new(settings: ScanSettings) -> Self {
        Self {
            settings,
            phase: ScanPhase::Idle,
            context: None,
            camera: None,
            epoch: 0,
            last_processed_code: None,
            in_flight: None,
            cooldown: OneShotTimer::new(),
            last_message: None,
            network_blocked: false,
        }
    }

    /// Cooldown and auto-restart settings fixed at construction.
    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Epoch of the decode sink currently allowed to deliver signals.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Selected camera, kept across deactivation.
    pub fn camera(&self) -> Option<&str> {
        self.camera.as_deref()
    }

    /// Event and session codes are submitted for.
    pub fn context(&self) -> Option<&EventContext> {
        self.context.as_ref()
    }

    /// A code is in flight or cooling down.
    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some() || self.cooldown.is_armed()
    }

    /// Start a session for `context` on `camera` (or the previously
    /// selected camera). Returns the epoch to start the decode source with.
    pub fn activate(
        &mut self,
        camera: Option<String>,
        context: Option<EventContext>,
    ) -> Result<u64, CoreError> {
        let context = context.ok_or_else(|| CoreError::Validation(NO_EVENT_SELECTED.into()))?;
        let camera = camera
            .or_else(|| self.camera.clone())
            .ok_or_else(|| CoreError::Validation(NO_CAMERA_SELECTED.into()))?;

        self.reset_bookkeeping();
        self.context = Some(context);
        self.camera = Some(camera);
        self.phase = ScanPhase::Ready;
        self.epoch += 1;
        Ok(self.epoch)
    }

    /// The decode source for `epoch` is running.
    pub fn source_started(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.phase != ScanPhase::Ready {
            return false;
        }
        self.phase = if self.is_processing() {
            ScanPhase::Processing
        } else {
            ScanPhase::Scanning
        };
        true
    }

    /// The decode source for `epoch` failed to start.
    pub fn source_failed(&mut self, epoch: u64, message: impl Into<String>) -> bool {
        if epoch != self.epoch || self.phase == ScanPhase::Idle {
            return false;
        }
        self.phase = ScanPhase::Stopped;
        self.epoch += 1;
        self.cooldown.cancel();
        self.last_message = Some(message.into());
        true
    }

    /// Decide what to do with a decoded code from sink `epoch`.
    ///
    /// Accepting records the code as last processed and puts it in flight;
    /// the caller must submit the returned intent and report back with
    /// [`on_submission_complete`](Self::on_submission_complete).
    pub fn on_decode(&mut self, epoch: u64, code: &str) -> DecodeDecision {
        if !self.phase.is_running() {
            return DecodeDecision::Ignored(IgnoreReason::Inactive);
        }
        if epoch != self.epoch {
            return DecodeDecision::Ignored(IgnoreReason::StaleSource);
        }
        let code = code.trim();
        if code.is_empty() {
            return DecodeDecision::Ignored(IgnoreReason::Empty);
        }
        if self.network_blocked {
            return DecodeDecision::Ignored(IgnoreReason::NetworkBlocked);
        }
        if self.in_flight.is_some() {
            return DecodeDecision::Ignored(IgnoreReason::InFlight);
        }
        if self.last_processed_code.as_deref() == Some(code) {
            return DecodeDecision::Ignored(IgnoreReason::SameCode);
        }
        let Some(context) = self.context.clone() else {
            return DecodeDecision::Ignored(IgnoreReason::Inactive);
        };

        // A different code during cooldown is accepted at once.
        self.cooldown.cancel();

        let intent = ScanIntent {
            id: Uuid::new_v4(),
            code: code.to_string(),
            context,
        };
        self.last_processed_code = Some(intent.code.clone());
        self.in_flight = Some(intent.id);
        self.phase = ScanPhase::Processing;
        self.last_message = Some(ACCEPTED_MESSAGE.to_string());
        DecodeDecision::Accepted(intent)
    }

    /// Record the outcome of intent `intent_id`. A network error blocks
    /// further decodes until acknowledged.
    pub fn on_submission_complete(
        &mut self,
        intent_id: Uuid,
        outcome: &AttendanceOutcome,
        now: Instant,
    ) -> Completion {
        if self.in_flight != Some(intent_id) {
            return Completion::Stale;
        }
        self.in_flight = None;
        if outcome.is_network_error() {
            self.network_blocked = true;
        }

        if self.phase != ScanPhase::Processing {
            return Completion::Settled;
        }

        if self.settings.auto_restart {
            self.cooldown.arm(now, self.settings.cooldown);
            match self.cooldown.deadline() {
                Some(deadline) => Completion::CoolingDown(deadline),
                None => Completion::Settled,
            }
        } else {
            self.phase = ScanPhase::Stopped;
            self.epoch += 1;
            self.last_message = None;
            Completion::StopSource
        }
    }

    /// Deadline of the pending cooldown, while one is pending.
    pub fn cooldown_deadline(&self) -> Option<Instant> {
        self.cooldown.deadline()
    }

    /// Called when the cooldown deadline is reached. Returns whether the
    /// session changed.
    pub fn on_cooldown_elapsed(&mut self, now: Instant) -> bool {
        if !self.cooldown.fire(now) || self.phase != ScanPhase::Processing {
            return false;
        }
        self.phase = ScanPhase::Scanning;
        self.last_message = None;
        true
    }

    /// Forget the last processed code and resume scanning. The only way to
    /// re-accept the same code without first seeing a different one.
    pub fn manual_restart(&mut self) -> Result<Restart, CoreError> {
        if self.phase == ScanPhase::Idle {
            return Err(CoreError::Validation(NO_EVENT_SELECTED.into()));
        }
        self.reset_bookkeeping();

        if self.phase.is_running() {
            self.phase = ScanPhase::Scanning;
            return Ok(Restart::Resume);
        }

        let camera = self
            .camera
            .clone()
            .ok_or_else(|| CoreError::Validation(NO_CAMERA_SELECTED.into()))?;
        self.phase = ScanPhase::Ready;
        self.epoch += 1;
        Ok(Restart::StartSource {
            epoch: self.epoch,
            camera,
        })
    }

    /// Select `camera`. A running source must be restarted against it; the
    /// de-duplication state carries over.
    pub fn change_camera(&mut self, camera: impl Into<String>) -> CameraSwitch {
        let camera = camera.into();
        self.camera = Some(camera.clone());

        if !self.phase.is_running() && self.phase != ScanPhase::Ready {
            return CameraSwitch::Recorded;
        }
        self.phase = ScanPhase::Ready;
        self.epoch += 1;
        CameraSwitch::Restart {
            epoch: self.epoch,
            camera,
        }
    }

    /// Operator stop. Returns whether the decode source must be stopped.
    pub fn stop(&mut self) -> bool {
        if !self.phase.is_running() && self.phase != ScanPhase::Ready {
            return false;
        }
        self.phase = ScanPhase::Stopped;
        self.epoch += 1;
        self.cooldown.cancel();
        self.last_message = None;
        true
    }

    /// Tear the session down. Idempotent; returns whether anything was active.
    pub fn deactivate(&mut self) -> bool {
        if self.phase == ScanPhase::Idle {
            return false;
        }
        self.reset_bookkeeping();
        self.context = None;
        self.phase = ScanPhase::Idle;
        self.epoch += 1;
        true
    }

    /// Lift the network block. Returns whether one was set.
    pub fn acknowledge_network_error(&mut self) -> bool {
        std::mem::replace(&mut self.network_blocked, false)
    }

    /// Presentation view of the session at `now`.
    pub fn snapshot(&self, now: Instant) -> ScanSnapshot {
        ScanSnapshot {
            phase: self.phase,
            is_processing: self.is_processing(),
            last_message: self.last_message.clone(),
            last_processed_code: self.last_processed_code.clone(),
            active_camera: self.camera.clone(),
            cooldown_remaining_ms: self
                .cooldown
                .remaining(now)
                .map(|d| d.as_millis() as u64),
            network_blocked: self.network_blocked,
        }
    }

    fn reset_bookkeeping(&mut self) {
        self.last_processed_code = None;
        self.in_flight = None;
        self.cooldown.cancel();
        self.last_message = None;
        self.network_blocked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rollcall_core::attendance::{ErrorKind, Session};

    fn ctx() -> EventContext {
        EventContext::new("evt-1", "Foundation Day", Session::Morning)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn success() -> AttendanceOutcome {
        AttendanceOutcome::Success {
            person_id: "2021-001".into(),
            display_name: "Juan Dela Cruz".into(),
            session: Session::Morning,
        }
    }

    /// Active session with its decode source running.
    fn scanning(settings: ScanSettings) -> (ScanSession, u64) {
        let mut session = ScanSession::new(settings);
        let epoch = session.activate(Some("cam1".into()), Some(ctx())).unwrap();
        assert!(session.source_started(epoch));
        (session, epoch)
    }

    fn accept(session: &mut ScanSession, epoch: u64, code: &str) -> ScanIntent {
        match session.on_decode(epoch, code) {
            DecodeDecision::Accepted(intent) => intent,
            other => panic!("expected {code} to be accepted, got {other:?}"),
        }
    }

    #[test]
    fn activate_requires_event_context() {
        let mut session = ScanSession::new(ScanSettings::default());
        let err = session.activate(Some("cam1".into()), None).unwrap_err();
        assert_eq!(err, CoreError::Validation(NO_EVENT_SELECTED.into()));
        assert_eq!(session.phase(), ScanPhase::Idle);
    }

    #[test]
    fn activate_requires_a_camera() {
        let mut session = ScanSession::new(ScanSettings::default());
        assert_matches!(
            session.activate(None, Some(ctx())),
            Err(CoreError::Validation(msg)) if msg == NO_CAMERA_SELECTED
        );
    }

    #[test]
    fn decodes_before_source_start_are_ignored() {
        let mut session = ScanSession::new(ScanSettings::default());
        let epoch = session.activate(Some("cam1".into()), Some(ctx())).unwrap();
        assert_eq!(session.phase(), ScanPhase::Ready);
        assert_eq!(
            session.on_decode(epoch, "STU-001"),
            DecodeDecision::Ignored(IgnoreReason::Inactive)
        );
    }

    #[test]
    fn repeated_code_yields_one_intent() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let intent = accept(&mut session, epoch, "STU-001");
        assert_eq!(intent.request().event_id, "evt-1");
        for _ in 0..20 {
            assert_matches!(session.on_decode(epoch, "STU-001"), DecodeDecision::Ignored(_));
        }

        session.on_submission_complete(intent.id, &success(), t0);
        for _ in 0..20 {
            assert_eq!(
                session.on_decode(epoch, "STU-001"),
                DecodeDecision::Ignored(IgnoreReason::SameCode)
            );
        }
    }

    #[test]
    fn scenario_cooldown_keeps_last_code() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let intent = accept(&mut session, epoch, "STU-001");
        assert_eq!(
            session.on_decode(epoch, "STU-001"),
            DecodeDecision::Ignored(IgnoreReason::InFlight)
        );
        assert!(session.is_processing());

        let completion = session.on_submission_complete(intent.id, &success(), t0);
        assert_eq!(completion, Completion::CoolingDown(t0 + ms(3000)));
        assert!(session.is_processing());
        assert_eq!(session.phase(), ScanPhase::Processing);

        assert!(!session.on_cooldown_elapsed(t0 + ms(2999)));
        assert!(session.on_cooldown_elapsed(t0 + ms(3000)));

        let snap = session.snapshot(t0 + ms(3000));
        assert!(!snap.is_processing);
        assert_eq!(snap.phase, ScanPhase::Scanning);
        assert_eq!(snap.last_processed_code.as_deref(), Some("STU-001"));
        assert_eq!(snap.last_message, None);

        assert_eq!(
            session.on_decode(epoch, "STU-001"),
            DecodeDecision::Ignored(IgnoreReason::SameCode)
        );
    }

    #[test]
    fn scenario_different_code_bypasses_cooldown() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let first = accept(&mut session, epoch, "STU-001");
        session.on_submission_complete(first.id, &success(), t0);

        let second = accept(&mut session, epoch, "STU-002");
        assert_eq!(second.code, "STU-002");
        assert_eq!(session.cooldown_deadline(), None);
        assert_eq!(
            session.snapshot(t0 + ms(1500)).last_processed_code.as_deref(),
            Some("STU-002")
        );
    }

    #[test]
    fn different_code_waits_for_in_flight_submission() {
        let (mut session, epoch) = scanning(ScanSettings::default());
        accept(&mut session, epoch, "STU-001");
        assert_eq!(
            session.on_decode(epoch, "STU-002"),
            DecodeDecision::Ignored(IgnoreReason::InFlight)
        );
    }

    #[test]
    fn manual_restart_rearms_same_code() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let intent = accept(&mut session, epoch, "STU-001");
        session.on_submission_complete(intent.id, &success(), t0);

        assert_eq!(session.manual_restart().unwrap(), Restart::Resume);
        assert_eq!(session.phase(), ScanPhase::Scanning);
        assert_eq!(session.cooldown_deadline(), None);
        accept(&mut session, epoch, "STU-001");
    }

    #[test]
    fn completion_after_restart_is_stale() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let intent = accept(&mut session, epoch, "STU-001");
        session.manual_restart().unwrap();
        assert_eq!(
            session.on_submission_complete(intent.id, &success(), t0),
            Completion::Stale
        );
        assert!(!session.is_processing());
    }

    #[test]
    fn without_auto_restart_completion_stops() {
        let t0 = Instant::now();
        let settings = ScanSettings {
            auto_restart: false,
            ..ScanSettings::default()
        };
        let (mut session, epoch) = scanning(settings);

        let intent = accept(&mut session, epoch, "STU-001");
        assert_eq!(
            session.on_submission_complete(intent.id, &success(), t0),
            Completion::StopSource
        );
        assert_eq!(session.phase(), ScanPhase::Stopped);
        assert_eq!(
            session.on_decode(epoch, "STU-002"),
            DecodeDecision::Ignored(IgnoreReason::Inactive)
        );

        let Restart::StartSource { epoch: next, camera } = session.manual_restart().unwrap() else {
            panic!("stopped scanner must restart its source");
        };
        assert_eq!(camera, "cam1");
        assert!(session.source_started(next));
        accept(&mut session, next, "STU-001");
    }

    #[test]
    fn network_error_blocks_until_acknowledged() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());

        let intent = accept(&mut session, epoch, "STU-001");
        let outcome = AttendanceOutcome::error(ErrorKind::Network, "offline");
        session.on_submission_complete(intent.id, &outcome, t0);
        assert!(session.snapshot(t0).network_blocked);
        assert_eq!(
            session.on_decode(epoch, "STU-002"),
            DecodeDecision::Ignored(IgnoreReason::NetworkBlocked)
        );

        assert!(session.acknowledge_network_error());
        assert!(!session.acknowledge_network_error());
        accept(&mut session, epoch, "STU-002");
    }

    #[test]
    fn camera_switch_bumps_epoch_and_keeps_dedup() {
        let t0 = Instant::now();
        let (mut session, old) = scanning(ScanSettings::default());
        let intent = accept(&mut session, old, "STU-001");
        session.on_submission_complete(intent.id, &success(), t0);

        let CameraSwitch::Restart { epoch: new, camera } = session.change_camera("cam2") else {
            panic!("running scanner must restart on camera change");
        };
        assert_eq!(camera, "cam2");
        assert_ne!(new, old);

        assert!(session.source_started(new));
        assert_eq!(session.phase(), ScanPhase::Processing);
        assert_eq!(
            session.on_decode(old, "STU-003"),
            DecodeDecision::Ignored(IgnoreReason::StaleSource)
        );
        assert_eq!(
            session.on_decode(new, "STU-001"),
            DecodeDecision::Ignored(IgnoreReason::SameCode)
        );
    }

    #[test]
    fn camera_change_while_idle_is_recorded() {
        let mut session = ScanSession::new(ScanSettings::default());
        assert_eq!(session.change_camera("cam2"), CameraSwitch::Recorded);
        assert!(session.activate(None, Some(ctx())).is_ok());
        assert_eq!(session.camera(), Some("cam2"));
    }

    #[test]
    fn teardown_is_inert() {
        let t0 = Instant::now();
        let (mut session, epoch) = scanning(ScanSettings::default());
        let intent = accept(&mut session, epoch, "STU-001");
        session.on_submission_complete(intent.id, &success(), t0);

        assert!(session.deactivate());
        assert!(!session.deactivate());
        let before = session.snapshot(t0);

        assert_eq!(
            session.on_decode(epoch, "STU-002"),
            DecodeDecision::Ignored(IgnoreReason::Inactive)
        );
        assert!(!session.on_cooldown_elapsed(t0 + ms(10_000)));
        assert_eq!(
            session.on_submission_complete(intent.id, &success(), t0),
            Completion::Stale
        );
        assert_eq!(session.snapshot(t0), before);
        assert_eq!(before.phase, ScanPhase::Idle);
        assert_eq!(before.last_processed_code, None);
        assert!(session.manual_restart().is_err());
    }

    #[test]
    fn stop_then_restart_resumes_scanning() {
        let (mut session, _) = scanning(ScanSettings::default());
        assert!(session.stop());
        assert!(!session.stop());
        assert_eq!(session.phase(), ScanPhase::Stopped);
        assert_matches!(session.manual_restart(), Ok(Restart::StartSource { .. }));
        assert_eq!(session.phase(), ScanPhase::Ready);
    }

    #[test]
    fn source_failure_stops_session() {
        let mut session = ScanSession::new(ScanSettings::default());
        let epoch = session.activate(Some("cam1".into()), Some(ctx())).unwrap();
        assert!(session.source_failed(epoch, "NotAllowedError"));
        assert_eq!(session.phase(), ScanPhase::Stopped);
        assert!(!session.source_started(epoch));
    }
}
