//! Attendance marking requests and the outcome contract shared by the
//! scan and manual paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::types::{RecordId, Timestamp};

// ---------------------------------------------------------------------------
// Placeholder identity
// ---------------------------------------------------------------------------

/// Display name used when a duplicate response carries a payload without a name.
pub const UNKNOWN_STUDENT_NAME: &str = "Unknown Student";
/// Id used when a duplicate response carries a payload without an id.
pub const UNKNOWN_STUDENT_ID: &str = "Unknown ID";
/// Display name used when a response carries no person payload at all.
pub const PLACEHOLDER_NAME: &str = "Student";
/// Id used when a response carries no person payload at all.
pub const PLACEHOLDER_ID: &str = "Unknown";

/// Fallback message for rejected submissions without a server message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to mark attendance";

// ---------------------------------------------------------------------------
// Session of day
// ---------------------------------------------------------------------------

/// Half-day session an attendance mark belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Session {
    Morning,
    Afternoon,
}

impl Session {
    pub fn as_str(self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Afternoon => "afternoon",
        }
    }

    /// Capitalised label for notifications, e.g. `Morning`.
    pub fn label(self) -> &'static str {
        match self {
            Session::Morning => "Morning",
            Session::Afternoon => "Afternoon",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Session::Morning),
            "afternoon" => Ok(Session::Afternoon),
            other => Err(CoreError::Validation(format!(
                "Invalid session '{other}'. Must be one of: morning, afternoon"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The event and session an operator is marking attendance for.
///
/// Supplied by the surrounding page; the scanner and resolver never
/// resolve it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub event_id: RecordId,
    pub event_title: String,
    pub session: Session,
}

impl EventContext {
    pub fn new(event_id: impl Into<RecordId>, event_title: impl Into<String>, session: Session) -> Self {
        Self {
            event_id: event_id.into(),
            event_title: event_title.into(),
            session,
        }
    }
}

/// Who is being marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceTarget {
    /// Raw decoded QR payload; the backend resolves the person.
    Code(String),
    /// A person picked through manual lookup.
    Person {
        /// Backend record id sent to the server.
        id: RecordId,
        /// Human-facing student number, used as a fallback for display.
        student_id: String,
        display_name: String,
    },
}

/// A single "mark attendance" intent handed to the submission gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRequest {
    pub target: AttendanceTarget,
    pub event_id: RecordId,
    pub session: Session,
}

impl AttendanceRequest {
    pub fn for_code(code: impl Into<String>, context: &EventContext) -> Self {
        Self {
            target: AttendanceTarget::Code(code.into()),
            event_id: context.event_id.clone(),
            session: context.session,
        }
    }

    pub fn for_person(
        id: impl Into<RecordId>,
        student_id: impl Into<String>,
        display_name: impl Into<String>,
        context: &EventContext,
    ) -> Self {
        Self {
            target: AttendanceTarget::Person {
                id: id.into(),
                student_id: student_id.into(),
                display_name: display_name.into(),
            },
            event_id: context.event_id.clone(),
            session: context.session,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    /// No response reached the client.
    #[serde(rename = "NetworkError")]
    Network,
    /// The caller's precondition was not met.
    #[serde(rename = "ValidationError")]
    Validation,
    /// Any other rejected submission.
    #[serde(rename = "ServerError")]
    Server,
}

/// Result of one attendance submission. Exactly one variant per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type")]
#[ts(export)]
pub enum AttendanceOutcome {
    Success {
        person_id: String,
        display_name: String,
        session: Session,
    },
    /// A prior valid mark exists. Not a failure.
    AlreadyMarked {
        person_id: String,
        display_name: String,
        session: Session,
        marked_at: Timestamp,
    },
    Error {
        kind: ErrorKind,
        message: String,
        /// HTTP status when a response was received.
        status: Option<u16>,
    },
}

impl AttendanceOutcome {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        AttendanceOutcome::Error {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttendanceOutcome::Success { .. })
    }

    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            AttendanceOutcome::Error {
                kind: ErrorKind::Network,
                ..
            }
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceOutcome::Success { .. } => "success",
            AttendanceOutcome::AlreadyMarked { .. } => "already_marked",
            AttendanceOutcome::Error { .. } => "error",
        }
    }
}

/// A request refused before it reached the backend.
impl From<&CoreError> for AttendanceOutcome {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => AttendanceOutcome::error(ErrorKind::Validation, msg.clone()),
            CoreError::Network(msg) => AttendanceOutcome::error(ErrorKind::Network, msg.clone()),
            CoreError::Device(msg) | CoreError::Internal(msg) => {
                AttendanceOutcome::error(ErrorKind::Server, msg.clone())
            }
        }
    }
}
