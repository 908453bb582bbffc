//! Attendance submission gateway.
//!
//! The one path both the scanner and the manual lookup use to mark
//! attendance. Every response, or lack of one, is classified into exactly
//! one [`AttendanceOutcome`]:
//!
//! | Response                                   | Outcome                     |
//! |--------------------------------------------|-----------------------------|
//! | no response                                | `Error(NetworkError)`       |
//! | 2xx                                        | `Success`                   |
//! | non-2xx, duplicate marker                  | `AlreadyMarked`             |
//! | any other non-2xx                          | `Error(ServerError)`        |
//!
//! The gateway never retries; retry is an operator action.

use std::sync::Arc;

use chrono::Utc;
use rollcall_core::attendance::{
    AttendanceOutcome, AttendanceRequest, AttendanceTarget, ErrorKind, GENERIC_FAILURE_MESSAGE,
    PLACEHOLDER_ID, PLACEHOLDER_NAME, UNKNOWN_STUDENT_ID, UNKNOWN_STUDENT_NAME,
};
use rollcall_core::types::Timestamp;
use rollcall_events::{EventBus, KioskEvent, KioskEventKind};

use crate::api::{ApiError, AttendanceApi, RawResponse};
use crate::payload::{server_message, PersonPayload};

/// Message fragments that mark a rejection as "already marked".
const DUPLICATE_MARKERS: &[&str] = &["already signed in", "duplicate"];

const NETWORK_FAILURE_MESSAGE: &str = "Unable to reach the attendance server";

pub struct SubmissionGateway {
    api: Arc<dyn AttendanceApi>,
    bus: Option<Arc<EventBus>>,
}

impl SubmissionGateway {
    pub fn new(api: Arc<dyn AttendanceApi>) -> Self {
        Self { api, bus: None }
    }

    /// Publish `SessionExpired` on `bus` when the backend answers 401.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn submit(&self, request: &AttendanceRequest) -> AttendanceOutcome {
        let result = self.api.mark_attendance(request).await;

        if let Ok(response) = &result {
            if response.status == 401 {
                tracing::warn!(event_id = %request.event_id, "Backend rejected credentials");
                if let Some(bus) = &self.bus {
                    bus.publish(KioskEvent::new(KioskEventKind::SessionExpired));
                }
            }
        }

        let outcome = classify(request, result, Utc::now());
        match &outcome {
            AttendanceOutcome::Error { kind, message, status } => tracing::warn!(
                event_id = %request.event_id,
                kind = ?kind,
                status = ?status,
                message = %message,
                "Attendance submission failed",
            ),
            other => tracing::info!(
                event_id = %request.event_id,
                session = %request.session,
                outcome = other.label(),
                "Attendance submission completed",
            ),
        }
        outcome
    }
}

/// Classify a submission result. Total: every input maps to one outcome.
///
/// `now` stands in for the prior mark time when a duplicate response does
/// not carry one.
pub fn classify(
    request: &AttendanceRequest,
    result: Result<RawResponse, ApiError>,
    now: Timestamp,
) -> AttendanceOutcome {
    let response = match result {
        Ok(response) => response,
        Err(ApiError::Transport(msg)) => {
            return AttendanceOutcome::error(
                ErrorKind::Network,
                format!("{NETWORK_FAILURE_MESSAGE}: {msg}"),
            );
        }
        Err(ApiError::Status { status, message }) => {
            return AttendanceOutcome::Error {
                kind: ErrorKind::Server,
                message,
                status: Some(status),
            };
        }
        Err(ApiError::Decode(msg)) => {
            return AttendanceOutcome::error(ErrorKind::Server, msg);
        }
    };

    let person = PersonPayload::from_body(&response.body);

    if response.is_success() {
        let (person_id, display_name) = success_identity(request, person.as_ref());
        return AttendanceOutcome::Success {
            person_id,
            display_name,
            session: request.session,
        };
    }

    let message = server_message(&response.body);

    if is_duplicate(response.status, message.as_deref(), person.is_some()) {
        let (person_id, display_name, marked_at) = match person {
            Some(p) => (
                p.person_id.unwrap_or_else(|| UNKNOWN_STUDENT_ID.to_string()),
                p.display_name.unwrap_or_else(|| UNKNOWN_STUDENT_NAME.to_string()),
                p.marked_at.unwrap_or(now),
            ),
            None => (PLACEHOLDER_ID.to_string(), PLACEHOLDER_NAME.to_string(), now),
        };
        return AttendanceOutcome::AlreadyMarked {
            person_id,
            display_name,
            session: request.session,
            marked_at,
        };
    }

    AttendanceOutcome::Error {
        kind: ErrorKind::Server,
        message: message.unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
        status: Some(response.status),
    }
}

fn is_duplicate(status: u16, message: Option<&str>, has_person: bool) -> bool {
    let marked = message.is_some_and(|m| {
        let lower = m.to_lowercase();
        DUPLICATE_MARKERS.iter().any(|marker| lower.contains(marker))
    });
    marked || (status == 409 && has_person)
}

/// Identity for a success: response payload, then the submitted person,
/// then placeholders.
fn success_identity(request: &AttendanceRequest, person: Option<&PersonPayload>) -> (String, String) {
    let (fallback_id, fallback_name) = match &request.target {
        AttendanceTarget::Person {
            student_id,
            display_name,
            ..
        } => (student_id.clone(), display_name.clone()),
        AttendanceTarget::Code(_) => (PLACEHOLDER_ID.to_string(), PLACEHOLDER_NAME.to_string()),
    };

    let person_id = person
        .and_then(|p| p.person_id.clone())
        .unwrap_or(fallback_id);
    let display_name = person
        .and_then(|p| p.display_name.clone())
        .unwrap_or(fallback_name);
    (person_id, display_name)
}
