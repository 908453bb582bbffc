//! Public live roster for an event.

use serde::{Deserialize, Serialize};

use crate::student::{matches_term, Organization};
use crate::types::Timestamp;

/// Interval between public roster refreshes.
pub const ROSTER_POLL_INTERVAL_SECS: u64 = 30;

/// One signed-in student as shown on the public roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub year_level: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub organization: Option<Organization>,
    #[serde(default)]
    pub sign_in_time: Option<Timestamp>,
}

/// Entries whose last name, first name or student id contain `term`.
pub fn filter_roster<'a>(entries: &'a [RosterEntry], term: &str) -> Vec<&'a RosterEntry> {
    entries
        .iter()
        .filter(|e| matches_term(&e.first_name, &e.last_name, &e.student_id, term))
        .collect()
}
