//! Decoder for the person payloads the backend attaches to attendance
//! responses.
//!
//! The backend has used several field names for the same data. Every
//! lookup here follows a fixed fallback order:
//!
//! | Value        | Order                                              |
//! |--------------|----------------------------------------------------|
//! | display name | `studentName`, `name`, `firstName` + `lastName`    |
//! | person id    | `studentId`, `id`                                  |
//! | marked at    | `signInTime`, `markedAt` (RFC 3339 or epoch ms)    |
//! | message      | `message`, `error`, bare string body               |

use chrono::{DateTime, TimeZone, Utc};
use rollcall_core::types::Timestamp;
use serde_json::{Map, Value};

/// Person fields found under `student` in a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonPayload {
    pub display_name: Option<String>,
    pub person_id: Option<String>,
    pub marked_at: Option<Timestamp>,
}

impl PersonPayload {
    /// Decode `body.student`. Returns `None` when there is no object there.
    pub fn from_body(body: &Value) -> Option<Self> {
        let student = body.get("student")?.as_object()?;
        Some(Self::from_object(student))
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let display_name = text(obj, "studentName")
            .or_else(|| text(obj, "name"))
            .or_else(|| {
                match (text(obj, "firstName"), text(obj, "lastName")) {
                    (Some(first), Some(last)) => Some(format!("{first} {last}")),
                    (Some(only), None) | (None, Some(only)) => Some(only),
                    (None, None) => None,
                }
            });

        let person_id = text(obj, "studentId").or_else(|| text(obj, "id"));

        let marked_at = timestamp(obj, "signInTime").or_else(|| timestamp(obj, "markedAt"));

        Self {
            display_name,
            person_id,
            marked_at,
        }
    }
}

/// Human-readable message the server attached to a response, if any.
pub fn server_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(obj) => text(obj, "message").or_else(|| text(obj, "error")),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Non-empty string field; numbers are accepted and rendered as text.
fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(obj: &Map<String, Value>, key: &str) -> Option<Timestamp> {
    match obj.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
