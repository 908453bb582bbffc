//! Student records as returned by the backend's search endpoint.

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// Maximum number of lookup candidates shown to the operator.
pub const MAX_CANDIDATES: usize = 5;

/// Minimum trimmed query length (in characters) before a search is issued.
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
}

/// A student that can be picked as a manual lookup candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub year_level: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub organization: Option<Organization>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Text the lookup input is frozen to once this student is selected.
    pub fn canonical_label(&self) -> String {
        format!("{} - {}", self.student_id, self.full_name())
    }
}

/// Case-insensitive substring match over first name, last name and
/// student number. An empty term matches everything.
pub fn matches_term(first_name: &str, last_name: &str, student_id: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    first_name.to_lowercase().contains(&term)
        || last_name.to_lowercase().contains(&term)
        || student_id.to_lowercase().contains(&term)
}

/// Whether a raw query is long enough to be searched.
pub fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn juan() -> Student {
        serde_json::from_value(serde_json::json!({
            "_id": "65a1",
            "studentId": "2021-001",
            "firstName": "Juan",
            "lastName": "Dela Cruz",
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_backend_shape() {
        let s = juan();
        assert_eq!(s.id, "65a1");
        assert!(s.year_level.is_none());
        assert!(s.organization.is_none());
    }

    #[test]
    fn canonical_label_includes_id_and_name() {
        assert_eq!(juan().canonical_label(), "2021-001 - Juan Dela Cruz");
    }

    #[test]
    fn matches_any_field_case_insensitively() {
        assert!(matches_term("Juan", "Dela Cruz", "2021-001", "dela"));
        assert!(matches_term("Juan", "Dela Cruz", "2021-001", "JUA"));
        assert!(matches_term("Juan", "Dela Cruz", "2021-001", "001"));
        assert!(!matches_term("Juan", "Dela Cruz", "2021-001", "maria"));
        assert!(matches_term("Juan", "Dela Cruz", "2021-001", "  "));
    }

    #[test]
    fn searchable_requires_two_trimmed_chars() {
        assert!(!is_searchable(""));
        assert!(!is_searchable(" J "));
        assert!(is_searchable("Ju"));
        assert!(is_searchable("ñé"));
    }
}
