//! Scan intent controller.
//!
//! A single Tokio task owns the [`ScanSession`], the decode source and the
//! cooldown timer. Decode signals, submission completions, the timer and
//! operator commands all arrive on channels and are handled one at a time,
//! so the session is never mutated concurrently. Submissions run on their
//! own tasks and report back by intent id.
//!
//! Camera changes stop the running source and wait for the stop to finish
//! before starting the next one.

use std::sync::Arc;

use rollcall_client::gateway::SubmissionGateway;
use rollcall_core::attendance::{AttendanceOutcome, EventContext};
use rollcall_core::error::CoreError;
use rollcall_core::scan::ScanSnapshot;
use rollcall_events::{Channel, EventBus, KioskEvent, KioskEventKind};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::decode::{
    classify_decoder_error, default_camera, CameraInfo, DecodeConfig, DecodeError, DecodeSignal,
    DecodeSink, DecodeSource, DecoderNoise,
};
use crate::session::{
    CameraSwitch, Completion, DecodeDecision, Restart, ScanSession, ScanSettings,
    NO_CAMERA_SELECTED, NO_EVENT_SELECTED,
};
use crate::timer::wait_until;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Activate {
        camera: Option<String>,
        context: Option<EventContext>,
        reply: oneshot::Sender<Result<ScanSnapshot, CoreError>>,
    },
    Deactivate {
        reply: oneshot::Sender<ScanSnapshot>,
    },
    Stop {
        reply: oneshot::Sender<ScanSnapshot>,
    },
    ManualRestart {
        reply: oneshot::Sender<Result<ScanSnapshot, CoreError>>,
    },
    ChangeCamera {
        camera_id: String,
        reply: oneshot::Sender<Result<ScanSnapshot, CoreError>>,
    },
    AcknowledgeNetworkError {
        reply: oneshot::Sender<ScanSnapshot>,
    },
    ListCameras {
        reply: oneshot::Sender<Result<Vec<CameraInfo>, CoreError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ScanSnapshot>,
    },
}

struct SubmissionDone {
    intent_id: Uuid,
    code: String,
    outcome: AttendanceOutcome,
}

/// Cloneable handle to a running [`ScanController`]. The controller tears
/// itself down once every handle is dropped.
#[derive(Clone)]
pub struct ScanHandle {
    commands: mpsc::Sender<Command>,
}

impl ScanHandle {
    /// Start scanning for `context`. Without `camera`, the previously
    /// selected camera or the first available one is used.
    pub async fn activate(
        &self,
        camera: Option<String>,
        context: Option<EventContext>,
    ) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::Activate {
            camera,
            context,
            reply,
        })
        .await?
    }

    /// Release the decode source and reset to idle. Idempotent.
    pub async fn deactivate(&self) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::Deactivate { reply }).await
    }

    /// Stop the decode source but keep the session; `manual_restart`
    /// resumes it.
    pub async fn stop(&self) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Forget the last processed code and resume scanning, restarting the
    /// source if it was stopped. Also lifts a network block.
    pub async fn manual_restart(&self) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::ManualRestart { reply }).await?
    }

    /// Switch to `camera_id`. A running source is fully stopped before the
    /// new one starts; an unknown id is a validation error.
    pub async fn change_camera(&self, camera_id: impl Into<String>) -> Result<ScanSnapshot, CoreError> {
        let camera_id = camera_id.into();
        self.request(|reply| Command::ChangeCamera { camera_id, reply })
            .await?
    }

    /// Lift the block left by a network error.
    pub async fn acknowledge_network_error(&self) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::AcknowledgeNetworkError { reply })
            .await
    }

    /// Cameras the decode source can use, default first.
    pub async fn list_cameras(&self) -> Result<Vec<CameraInfo>, CoreError> {
        self.request(|reply| Command::ListCameras { reply }).await?
    }

    /// Current scanner state.
    pub async fn snapshot(&self) -> Result<ScanSnapshot, CoreError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| controller_gone())?;
        rx.await.map_err(|_| controller_gone())
    }
}

fn controller_gone() -> CoreError {
    CoreError::Internal("scan controller has shut down".into())
}

pub struct ScanController {
    session: ScanSession,
    source: Box<dyn DecodeSource>,
    config: DecodeConfig,
    gateway: Arc<SubmissionGateway>,
    bus: Arc<EventBus>,
    commands: mpsc::Receiver<Command>,
    signals_tx: mpsc::UnboundedSender<DecodeSignal>,
    signals: mpsc::UnboundedReceiver<DecodeSignal>,
    completions_tx: mpsc::UnboundedSender<SubmissionDone>,
    completions: mpsc::UnboundedReceiver<SubmissionDone>,
}

impl ScanController {
    /// Spawn the controller task and return its handle.
    pub fn spawn(
        source: Box<dyn DecodeSource>,
        gateway: Arc<SubmissionGateway>,
        bus: Arc<EventBus>,
        settings: ScanSettings,
        config: DecodeConfig,
    ) -> ScanHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let controller = Self {
            session: ScanSession::new(settings),
            source,
            config,
            gateway,
            bus,
            commands,
            signals_tx,
            signals,
            completions_tx,
            completions,
        };
        tokio::spawn(controller.run());

        ScanHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        tracing::debug!(
            cooldown_ms = self.session.settings().cooldown.as_millis() as u64,
            auto_restart = self.session.settings().auto_restart,
            "Scan controller started",
        );

        loop {
            let cooldown = self.session.cooldown_deadline();
            tokio::select! {
                biased;
                Some(signal) = self.signals.recv() => self.on_signal(signal),
                Some(done) = self.completions.recv() => self.on_completion(done).await,
                _ = wait_until(cooldown) => self.on_cooldown_elapsed(),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }
        }

        if self.session.deactivate() {
            self.release_source().await;
        }
        tracing::debug!("Scan controller stopped");
    }

    // ---- decode path ----

    fn on_signal(&mut self, signal: DecodeSignal) {
        match signal {
            DecodeSignal::Decoded { epoch, event } => {
                match self.session.on_decode(epoch, &event.code) {
                    DecodeDecision::Accepted(intent) => {
                        tracing::info!(
                            code = %intent.code,
                            event_id = %intent.context.event_id,
                            session = %intent.context.session,
                            latency_ms = event.observed_at.elapsed().as_millis() as u64,
                            "Scan accepted",
                        );
                        let gateway = Arc::clone(&self.gateway);
                        let tx = self.completions_tx.clone();
                        tokio::spawn(async move {
                            let outcome = gateway.submit(&intent.request()).await;
                            let _ = tx.send(SubmissionDone {
                                intent_id: intent.id,
                                code: intent.code,
                                outcome,
                            });
                        });
                        self.publish_state();
                    }
                    DecodeDecision::Ignored(reason) => {
                        tracing::trace!(code = %event.code, reason = ?reason, "Scan ignored");
                    }
                }
            }
            DecodeSignal::Error { epoch, message } => {
                if epoch != self.session.epoch() || !self.session.phase().is_running() {
                    return;
                }
                match classify_decoder_error(&message) {
                    DecoderNoise::Benign => {}
                    DecoderNoise::Surfaced => {
                        tracing::warn!(error = %message, "Decoder reported a device problem");
                        self.bus.publish(KioskEvent::scanner_fault(message));
                    }
                    DecoderNoise::Advisory => {
                        tracing::warn!(error = %message, "Decoder error");
                    }
                }
            }
        }
    }

    async fn on_completion(&mut self, done: SubmissionDone) {
        let completion =
            self.session
                .on_submission_complete(done.intent_id, &done.outcome, Instant::now());
        tracing::debug!(
            code = %done.code,
            outcome = done.outcome.label(),
            completion = ?completion,
            "Scan submission completed",
        );

        self.bus
            .publish(KioskEvent::outcome(Channel::Scanner, done.outcome));

        match completion {
            Completion::Stale => return,
            Completion::StopSource => self.release_source().await,
            Completion::CoolingDown(_) | Completion::Settled => {}
        }
        self.publish_state();
    }

    fn on_cooldown_elapsed(&mut self) {
        if self.session.on_cooldown_elapsed(Instant::now()) {
            tracing::debug!("Cooldown elapsed, scanner re-armed");
            self.publish_state();
        }
    }

    // ---- commands ----

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Activate {
                camera,
                context,
                reply,
            } => {
                let result = self.activate(camera, context).await;
                let _ = reply.send(result);
            }
            Command::Deactivate { reply } => {
                if self.session.deactivate() {
                    self.release_source().await;
                    tracing::info!("Scanner deactivated");
                    self.publish_state();
                }
                let _ = reply.send(self.snapshot());
            }
            Command::Stop { reply } => {
                if self.session.stop() {
                    self.release_source().await;
                    tracing::info!("Scanner stopped");
                    self.publish_state();
                }
                let _ = reply.send(self.snapshot());
            }
            Command::ManualRestart { reply } => {
                let result = self.manual_restart().await;
                let _ = reply.send(result);
            }
            Command::ChangeCamera { camera_id, reply } => {
                let result = self.change_camera(camera_id).await;
                let _ = reply.send(result);
            }
            Command::AcknowledgeNetworkError { reply } => {
                if self.session.acknowledge_network_error() {
                    self.publish_state();
                }
                let _ = reply.send(self.snapshot());
            }
            Command::ListCameras { reply } => {
                let result = self
                    .source
                    .list_cameras()
                    .await
                    .map_err(|e| CoreError::Device(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn activate(
        &mut self,
        camera: Option<String>,
        context: Option<EventContext>,
    ) -> Result<ScanSnapshot, CoreError> {
        // Refuse before touching the running session.
        let context = context.ok_or_else(|| CoreError::Validation(NO_EVENT_SELECTED.into()))?;
        let camera = match camera.or_else(|| self.session.camera().map(str::to_string)) {
            Some(camera) => camera,
            None => {
                let cameras = self
                    .source
                    .list_cameras()
                    .await
                    .map_err(|e| CoreError::Device(e.to_string()))?;
                default_camera(&cameras)
                    .map(|c| c.id.clone())
                    .ok_or_else(|| CoreError::Validation(NO_CAMERA_SELECTED.into()))?
            }
        };

        let epoch = self.session.activate(Some(camera.clone()), Some(context))?;
        tracing::info!(camera = %camera, "Scanner activated");
        self.restart_source(epoch, &camera).await?;
        Ok(self.snapshot())
    }

    async fn manual_restart(&mut self) -> Result<ScanSnapshot, CoreError> {
        match self.session.manual_restart()? {
            Restart::Resume => {}
            Restart::StartSource { epoch, camera } => {
                self.restart_source(epoch, &camera).await?;
            }
        }
        tracing::info!("Scanner restarted manually");
        self.publish_state();
        Ok(self.snapshot())
    }

    async fn change_camera(&mut self, camera_id: String) -> Result<ScanSnapshot, CoreError> {
        let cameras = self
            .source
            .list_cameras()
            .await
            .map_err(|e| CoreError::Device(e.to_string()))?;
        if !cameras.iter().any(|c| c.id == camera_id) {
            return Err(CoreError::Validation(format!("unknown camera '{camera_id}'")));
        }

        match self.session.change_camera(camera_id) {
            CameraSwitch::Recorded => {}
            CameraSwitch::Restart { epoch, camera } => {
                tracing::info!(camera = %camera, "Switching camera");
                self.restart_source(epoch, &camera).await?;
            }
        }
        self.publish_state();
        Ok(self.snapshot())
    }

    // ---- source lifecycle ----

    /// Release whatever is running, then start on `camera`. Nothing is
    /// started unless the release succeeded.
    async fn restart_source(&mut self, epoch: u64, camera: &str) -> Result<(), CoreError> {
        if let Err(e) = self.stop_source().await {
            return Err(self.fail_source(epoch, camera, e.to_string()));
        }
        self.start_source(epoch, camera).await
    }

    async fn start_source(&mut self, epoch: u64, camera: &str) -> Result<(), CoreError> {
        let sink = DecodeSink::new(epoch, self.signals_tx.clone());
        match self.source.start(camera, &self.config, sink).await {
            Ok(()) => {
                self.session.source_started(epoch);
                self.publish_state();
                Ok(())
            }
            Err(e) => Err(self.fail_source(epoch, camera, e.to_string())),
        }
    }

    fn fail_source(&mut self, epoch: u64, camera: &str, message: String) -> CoreError {
        tracing::error!(camera = %camera, error = %message, "Decode source unavailable");
        self.session.source_failed(epoch, message.clone());
        self.bus.publish(KioskEvent::scanner_fault(message.clone()));
        self.publish_state();
        CoreError::Device(message)
    }

    async fn stop_source(&mut self) -> Result<(), DecodeError> {
        if !self.source.is_running() {
            return Ok(());
        }
        self.source.stop().await
    }

    /// Stop the source where nothing is started afterwards.
    async fn release_source(&mut self) {
        if let Err(e) = self.stop_source().await {
            tracing::warn!(error = %e, "Failed to stop decode source cleanly");
        }
    }

    fn snapshot(&self) -> ScanSnapshot {
        self.session.snapshot(Instant::now())
    }

    fn publish_state(&self) {
        self.bus.publish(KioskEvent::new(KioskEventKind::ScannerState {
            snapshot: self.snapshot(),
        }));
    }
}
