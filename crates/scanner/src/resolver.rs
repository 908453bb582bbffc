//! Manual lookup resolver.
//!
//! Actor around [`LookupState`]: owns the debounce timer, runs student
//! searches and submissions on their own tasks and feeds their results back
//! through channels, tagged so superseded searches can be discarded.

use std::sync::Arc;

use rollcall_client::api::AttendanceApi;
use rollcall_client::gateway::SubmissionGateway;
use rollcall_core::attendance::{AttendanceOutcome, EventContext};
use rollcall_core::error::CoreError;
use rollcall_core::student::Student;
use rollcall_events::{Channel, EventBus, KioskEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::lookup::{LookupSnapshot, LookupState, SearchTicket};
use crate::timer::wait_until;

const COMMAND_BUFFER: usize = 32;

enum Command {
    QueryChanged {
        text: String,
        reply: oneshot::Sender<LookupSnapshot>,
    },
    Select {
        index: usize,
        reply: oneshot::Sender<Result<LookupSnapshot, CoreError>>,
    },
    Clear {
        reply: oneshot::Sender<LookupSnapshot>,
    },
    SetContext {
        context: Option<EventContext>,
        reply: oneshot::Sender<LookupSnapshot>,
    },
    Submit {
        reply: oneshot::Sender<Result<AttendanceOutcome, CoreError>>,
    },
    AcknowledgeNetworkError {
        reply: oneshot::Sender<LookupSnapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<LookupSnapshot>,
    },
}

enum TaskResult {
    Search {
        seq: u64,
        result: Result<Vec<Student>, String>,
    },
    Submitted {
        outcome: AttendanceOutcome,
        reply: oneshot::Sender<Result<AttendanceOutcome, CoreError>>,
    },
}

/// Cloneable handle to a running [`LookupResolver`]. The resolver exits
/// once every handle is dropped.
#[derive(Clone)]
pub struct LookupHandle {
    commands: mpsc::Sender<Command>,
}

impl LookupHandle {
    /// Replace the search text; the search runs once typing pauses.
    pub async fn query_changed(&self, text: impl Into<String>) -> Result<LookupSnapshot, CoreError> {
        let text = text.into();
        self.request(|reply| Command::QueryChanged { text, reply })
            .await
    }

    /// Pick candidate `index` (0-based) from the current results.
    pub async fn select(&self, index: usize) -> Result<LookupSnapshot, CoreError> {
        self.request(|reply| Command::Select { index, reply }).await?
    }

    /// Reset query, candidates and selection.
    pub async fn clear(&self) -> Result<LookupSnapshot, CoreError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Event and session manual marks are submitted for.
    pub async fn set_context(&self, context: Option<EventContext>) -> Result<LookupSnapshot, CoreError> {
        self.request(|reply| Command::SetContext { context, reply })
            .await
    }

    /// Submit the selected student. Resolves once the outcome is known.
    pub async fn submit(&self) -> Result<AttendanceOutcome, CoreError> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    /// Allow submissions again after a network error.
    pub async fn acknowledge_network_error(&self) -> Result<LookupSnapshot, CoreError> {
        self.request(|reply| Command::AcknowledgeNetworkError { reply })
            .await
    }

    /// Current lookup state.
    pub async fn snapshot(&self) -> Result<LookupSnapshot, CoreError> {
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
            .map_err(|_| resolver_gone())?;
        rx.await.map_err(|_| resolver_gone())
    }
}

fn resolver_gone() -> CoreError {
    CoreError::Internal("lookup resolver has shut down".into())
}

pub struct LookupResolver {
    state: LookupState,
    api: Arc<dyn AttendanceApi>,
    gateway: Arc<SubmissionGateway>,
    bus: Arc<EventBus>,
    commands: mpsc::Receiver<Command>,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results: mpsc::UnboundedReceiver<TaskResult>,
}

impl LookupResolver {
/// Spawn the resolver task and return its handle.
    pub fn spawn(
        api: Arc<dyn AttendanceApi>,
        gateway: Arc<SubmissionGateway>,
        bus: Arc<EventBus>,
    ) -> LookupHandle {
        Self::spawn_with_state(LookupState::new(), api, gateway, bus)
    }

    /// Spawn around a preconfigured [`LookupState`], e.g. one with a custom
    /// debounce.
    pub fn spawn_with_state(
        state: LookupState,
        api: Arc<dyn AttendanceApi>,
        gateway: Arc<SubmissionGateway>,
        bus: Arc<EventBus>,
    ) -> LookupHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (results_tx, results) = mpsc::unbounded_channel();

        let resolver = Self {
            state,
            api,
            gateway,
            bus,
            commands,
            results_tx,
            results,
        };
        tokio::spawn(resolver.run());

        LookupHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        loop {
            let debounce = self.state.debounce_deadline();
            tokio::select! {
                biased;
                Some(result) = self.results.recv() => self.on_result(result),
                _ = wait_until(debounce) => self.on_debounce_elapsed(),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }
        tracing::debug!("Lookup resolver stopped");
    }

    fn on_debounce_elapsed(&mut self) {
        if let Some(ticket) = self.state.on_debounce_elapsed(Instant::now()) {
            self.search(ticket);
        }
    }

    fn search(&self, ticket: SearchTicket) {
        tracing::debug!(seq = ticket.seq, query = %ticket.query, "Searching students");
        let api = Arc::clone(&self.api);
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let result = api
                .search_students(&ticket.query)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(TaskResult::Search {
                seq: ticket.seq,
                result,
            });
        });
    }

    fn on_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::Search { seq, result } => {
                if let Err(e) = &result {
                    tracing::warn!(seq, error = %e, "Student search failed");
                }
                if !self.state.search_finished(seq, result) {
                    tracing::debug!(seq, "Discarded superseded search result");
                }
            }
            TaskResult::Submitted { outcome, reply } => {
                self.state.finish_submit(&outcome);
                self.bus
                    .publish(KioskEvent::outcome(Channel::Manual, outcome.clone()));
                let _ = reply.send(Ok(outcome));
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::QueryChanged { text, reply } => {
                self.state.query_changed(text, Instant::now());
                let _ = reply.send(self.state.snapshot());
            }
            Command::Select { index, reply } => {
                let result = self.state.select(index).map(|student| {
                    tracing::debug!(student_id = %student.student_id, "Candidate selected");
                });
                let _ = reply.send(result.map(|()| self.state.snapshot()));
            }
            Command::Clear { reply } => {
                self.state.clear();
                let _ = reply.send(self.state.snapshot());
            }
            Command::SetContext { context, reply } => {
                self.state.set_context(context);
                let _ = reply.send(self.state.snapshot());
            }
            Command::Submit { reply } => match self.state.begin_submit() {
                Ok(request) => {
                    tracing::info!(
                        event_id = %request.event_id,
                        session = %request.session,
                        "Submitting manual attendance",
                    );
                    let gateway = Arc::clone(&self.gateway);
                    let tx = self.results_tx.clone();
                    tokio::spawn(async move {
                        let outcome = gateway.submit(&request).await;
                        let _ = tx.send(TaskResult::Submitted { outcome, reply });
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Manual submission refused");
                    self.bus.publish(KioskEvent::outcome(
                        Channel::Manual,
                        AttendanceOutcome::from(&e),
                    ));
                    let _ = reply.send(Err(e));
                }
            },
            Command::AcknowledgeNetworkError { reply } => {
                self.state.acknowledge_network_error();
                let _ = reply.send(self.state.snapshot());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }
}
