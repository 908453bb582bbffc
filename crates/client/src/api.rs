//! REST API client for the attendance backend.
//!
//! [`AttendanceApi`] is the seam the gateway, lookup resolver and roster
//! poller depend on; [`HttpAttendanceApi`] implements it with [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use rollcall_core::attendance::{AttendanceRequest, AttendanceTarget};
use rollcall_core::event::{Event, EventList};
use rollcall_core::history::AttendanceRecord;
use rollcall_core::roster::RosterEntry;
use rollcall_core::student::Student;
use serde::Deserialize;

use crate::config::ClientConfig;

/// Status and body of a "mark attendance" response, whatever the status.
///
/// The gateway classifies it; the transport layer does not judge it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed JSON body, a JSON string for non-JSON bodies, or null.
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connect failure, DNS, TLS, timeout).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    /// A 2xx response body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Remote operations the attendance core depends on.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Submit one attendance mark and return the raw response.
    ///
    /// Only [`ApiError::Transport`] is expected as an error: any response,
    /// including non-2xx, is returned as a [`RawResponse`].
    async fn mark_attendance(&self, request: &AttendanceRequest) -> Result<RawResponse, ApiError>;

    async fn search_students(&self, query: &str) -> Result<Vec<Student>, ApiError>;

    async fn list_events(&self) -> Result<Vec<Event>, ApiError>;

    /// Unauthenticated live roster for an event.
    async fn event_roster(&self, event_id: &str) -> Result<Vec<RosterEntry>, ApiError>;

    /// Attendance history of the signed-in student.
    async fn my_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError>;
}

/// The two shapes the student search endpoint returns.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StudentList {
    Wrapped { students: Vec<Student> },
    Bare(Vec<Student>),
}

impl StudentList {
    fn into_vec(self) -> Vec<Student> {
        match self {
            StudentList::Wrapped { students } => students,
            StudentList::Bare(students) => students,
        }
    }
}

/// HTTP client for the attendance backend.
pub struct HttpAttendanceApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpAttendanceApi {
    /// Build a client with the configured request timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.clone(),
            token: config.token.clone(),
        }
    }

    // ---- private helpers ----

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ensure the response has a success status code, otherwise turn it
    /// into [`ApiError::Status`] carrying the server's message.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn mark_attendance(&self, request: &AttendanceRequest) -> Result<RawResponse, ApiError> {
        let (path, body) = match &request.target {
            AttendanceTarget::Code(code) => (
                "attendance",
                serde_json::json!({
                    "qrCodeData": code,
                    "eventId": request.event_id,
                    "session": request.session,
                }),
            ),
            AttendanceTarget::Person { id, .. } => (
                "attendance/manual-signin",
                serde_json::json!({
                    "studentId": id,
                    "eventId": request.event_id,
                    "session": request.session,
                }),
            ),
        };

        let response = self
            .authorized(self.client.post(format!("{}/{path}", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) if text.trim().is_empty() => serde_json::Value::Null,
            Ok(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
            Err(e) => {
                tracing::warn!(status, error = %e, "Failed to read attendance response body");
                serde_json::Value::Null
            }
        };

        Ok(RawResponse { status, body })
    }

    async fn search_students(&self, query: &str) -> Result<Vec<Student>, ApiError> {
        let response = self
            .authorized(self.client.get(format!("{}/students", self.base_url)))
            .query(&[("search", query)])
            .send()
            .await?;

        let list: StudentList = Self::parse_response(response).await?;
        Ok(list.into_vec())
    }

    async fn list_events(&self) -> Result<Vec<Event>, ApiError> {
        let response = self
            .authorized(self.client.get(format!("{}/events", self.base_url)))
            .send()
            .await?;

        let list: EventList = Self::parse_response(response).await?;
        Ok(list.into_vec())
    }

    async fn event_roster(&self, event_id: &str) -> Result<Vec<RosterEntry>, ApiError> {
        let response = self
            .client
            .get(format!("{}/public/events/{event_id}/attendance", self.base_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn my_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        let response = self
            .authorized(self.client.get(format!("{}/attendance", self.base_url)))
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
