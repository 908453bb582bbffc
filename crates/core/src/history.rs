//! A student's own attendance history.

use serde::{Deserialize, Serialize};

use crate::attendance::Session;
use crate::types::{RecordId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkStatus {
    Present,
    Absent,
    Excused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub event_title: String,
    pub morning_status: MarkStatus,
    pub afternoon_status: MarkStatus,
    #[serde(default)]
    pub morning_check_in: Option<Timestamp>,
    #[serde(default)]
    pub afternoon_check_in: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl AttendanceRecord {
    pub fn status_for(&self, session: Session) -> MarkStatus {
        match session {
            Session::Morning => self.morning_status,
            Session::Afternoon => self.afternoon_status,
        }
    }

    pub fn check_in_for(&self, session: Session) -> Option<Timestamp> {
        match session {
            Session::Morning => self.morning_check_in,
            Session::Afternoon => self.afternoon_check_in,
        }
    }
}

/// Per-status session counts across a history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub present: usize,
    pub absent: usize,
    pub excused: usize,
}

/// Count every session (morning and afternoon) of every record.
pub fn summarize(records: &[AttendanceRecord]) -> HistorySummary {
    let mut summary = HistorySummary::default();
    for record in records {
        for session in [Session::Morning, Session::Afternoon] {
            match record.status_for(session) {
                MarkStatus::Present => summary.present += 1,
                MarkStatus::Absent => summary.absent += 1,
                MarkStatus::Excused => summary.excused += 1,
            }
        }
    }
    summary
}
