//! Manual lookup state machine.
//!
//! Search-as-you-type over the student directory: each query change
//! re-arms a 300 ms debounce, and a search is issued only once the query
//! has been quiet that long. Every issued search carries a sequence number;
//! a result is applied only if it answers the latest search and the query
//! is still searchable with nothing selected.

use std::time::Duration;

use rollcall_core::attendance::{AttendanceOutcome, AttendanceRequest, EventContext};
use rollcall_core::error::CoreError;
use rollcall_core::student::{is_searchable, Student, MAX_CANDIDATES};
use serde::Serialize;
use tokio::time::Instant;

use crate::session::NO_EVENT_SELECTED;
use crate::timer::OneShotTimer;

pub const DEBOUNCE_MS: u64 = 300;

pub const NO_STUDENT_SELECTED: &str = "no student selected";

/// A search the caller must run and report back with `search_finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub seq: u64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupSnapshot {
    pub query: String,
    pub candidates: Vec<Student>,
    pub selected: Option<Student>,
    /// A search is pending (debouncing or in flight).
    pub searching: bool,
    pub submitting: bool,
    pub network_blocked: bool,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct LookupState {
    query: String,
    candidates: Vec<Student>,
    selected: Option<Student>,
    context: Option<EventContext>,
    debounce: OneShotTimer,
    debounce_for: Duration,
    seq: u64,
    pending_search: Option<u64>,
    /// Record id of the student whose submission is in flight.
    submitted: Option<String>,
    network_blocked: bool,
    last_error: Option<String>,
}

impl Default for LookupState {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupState {
/// Empty lookup with the default 300 ms debounce.
    pub fn new() -> Self {
        Self::with_debounce(Duration::from_millis(DEBOUNCE_MS))
    }

    /// Empty lookup with a custom debounce interval.
    pub fn with_debounce(debounce_for: Duration) -> Self {
        Self {
            query: String::new(),
            candidates: Vec::new(),
            selected: None,
            context: None,
            debounce: OneShotTimer::new(),
            debounce_for,
            seq: 0,
            pending_search: None,
            submitted: None,
            network_blocked: false,
            last_error: None,
        }
    }

    /// Event and session manual marks are submitted for.
    pub fn set_context(&mut self, context: Option<EventContext>) {
        self.context = context;
    }

    /// Replace the query text. Drops any selection, and re-arms the
    /// debounce when the text is long enough to search.
    pub fn query_changed(&mut self, text: impl Into<String>, now: Instant) {
        self.query = text.into();
        self.selected = None;
        self.pending_search = None;
        self.last_error = None;

        if is_searchable(&self.query) {
            self.debounce.arm(now, self.debounce_for);
        } else {
            self.debounce.cancel();
            self.candidates.clear();
        }
    }

    /// When the pending debounce elapses, if one is pending.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Called when the debounce deadline is reached.
    pub fn on_debounce_elapsed(&mut self, now: Instant) -> Option<SearchTicket> {
        if !self.debounce.fire(now) || self.selected.is_some() || !is_searchable(&self.query) {
            return None;
        }
        self.seq += 1;
        self.pending_search = Some(self.seq);
        Some(SearchTicket {
            seq: self.seq,
            query: self.query.trim().to_string(),
        })
    }

    /// Apply a search result. Returns `false` when it was stale and dropped.
    pub fn search_finished(&mut self, seq: u64, result: Result<Vec<Student>, String>) -> bool {
        if self.pending_search != Some(seq) || self.selected.is_some() || !is_searchable(&self.query) {
            return false;
        }
        self.pending_search = None;
        match result {
            Ok(mut students) => {
                students.truncate(MAX_CANDIDATES);
                self.candidates = students;
                self.last_error = None;
            }
            Err(message) => {
                self.candidates.clear();
                self.last_error = Some(message);
            }
        }
        true
    }

    /// Pick the candidate at `index`, freezing the query to its label.
    pub fn select(&mut self, index: usize) -> Result<&Student, CoreError> {
        if index >= self.candidates.len() {
            return Err(CoreError::Validation(format!(
                "no candidate at position {index}"
            )));
        }
        let student = self.candidates.swap_remove(index);
        self.query = student.canonical_label();
        self.candidates.clear();
        self.debounce.cancel();
        self.pending_search = None;
        Ok(self.selected.insert(student))
    }

    /// Reset query, candidates and selection.
    pub fn clear(&mut self) {
        self.query.clear();
        self.candidates.clear();
        self.selected = None;
        self.debounce.cancel();
        self.pending_search = None;
        self.last_error = None;
    }

    /// Build the request for the selected student and mark submission as
    /// in progress.
    pub fn begin_submit(&mut self) -> Result<AttendanceRequest, CoreError> {
        if self.submitted.is_some() {
            return Err(CoreError::Validation("a submission is already in progress".into()));
        }
        if self.network_blocked {
            return Err(CoreError::Network(
                "acknowledge the network error before submitting again".into(),
            ));
        }
        let student = self
            .selected
            .as_ref()
            .ok_or_else(|| CoreError::Validation(NO_STUDENT_SELECTED.into()))?;
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| CoreError::Validation(NO_EVENT_SELECTED.into()))?;

        let request = AttendanceRequest::for_person(
            student.id.clone(),
            student.student_id.clone(),
            student.full_name(),
            context,
        );
        self.submitted = Some(student.id.clone());
        Ok(request)
    }

    /// Record a submission outcome. Only a success clears the form, and
    /// only while the submitted student is still the selection.
    pub fn finish_submit(&mut self, outcome: &AttendanceOutcome) {
        let submitted = self.submitted.take();
        if outcome.is_success() {
            let still_selected = self.selected.as_ref().map(|s| &s.id) == submitted.as_ref();
            if still_selected {
                self.clear();
            }
        } else if outcome.is_network_error() {
            self.network_blocked = true;
        }
    }

    /// Lift the network block. Returns whether one was set.
    pub fn acknowledge_network_error(&mut self) -> bool {
        std::mem::replace(&mut self.network_blocked, false)
    }

    /// Presentation view of the lookup.
    pub fn snapshot(&self) -> LookupSnapshot {
        LookupSnapshot {
            query: self.query.clone(),
            candidates: self.candidates.clone(),
            selected: self.selected.clone(),
            searching: self.debounce.is_armed() || self.pending_search.is_some(),
            submitting: self.submitted.is_some(),
            network_blocked: self.network_blocked,
            last_error: self.last_error.clone(),
        }
    }
}
