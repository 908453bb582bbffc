use rollcall_core::error::CoreError;

/// Default backend origin when `API_URL` is unset.
const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Backend client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL ending in exactly one `/api`, without a trailing slash.
    pub api_base_url: String,
    /// Bearer token supplied by the external auth layer.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_url: &str, token: Option<String>) -> Self {
        Self {
            api_base_url: normalize_api_url(api_url),
            token,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `API_URL`              | `http://localhost:5000` |
    /// | `API_TOKEN`            | unset                   |
    /// | `REQUEST_TIMEOUT_SECS` | `15`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        let api_url = std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

        let token = std::env::var("API_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let request_timeout_secs = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("REQUEST_TIMEOUT_SECS must be a valid u64, got '{raw}'"))
            })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            api_base_url: normalize_api_url(&api_url),
            token,
            request_timeout_secs,
        })
    }
}

/// Strip trailing slashes and any existing `/api` suffix, then append `/api`.
pub fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let origin = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    format!("{}/api", origin.trim_end_matches('/'))
}
