//! Scheduled events attendance is taken for.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub title: String,
    pub event_date: Timestamp,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// The two shapes the events endpoint has returned over time: a bare
/// array, or an object wrapping the array under `events`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventList {
    Wrapped { events: Vec<Event> },
    Bare(Vec<Event>),
}

impl EventList {
    pub fn into_vec(self) -> Vec<Event> {
        match self {
            EventList::Wrapped { events } => events,
            EventList::Bare(events) => events,
        }
    }
}

/// First event whose (UTC) date is `today`.
pub fn pick_todays_event(events: &[Event], today: NaiveDate) -> Option<&Event> {
    events.iter().find(|e| e.event_date.date_naive() == today)
}
