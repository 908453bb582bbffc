use std::time::Duration;

use rollcall_core::attendance::Session;
use rollcall_core::error::CoreError;
use rollcall_core::scan::DEFAULT_COOLDOWN_MS;
use rollcall_scanner::session::ScanSettings;

/// Kiosk configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct KioskConfig {
    /// Event to take attendance for; today's event when unset.
    pub event_id: Option<String>,
    pub session: Session,
    pub scan: ScanSettings,
    /// Poll the public roster and log its size.
    pub watch_roster: bool,
}

impl KioskConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default             |
    /// |--------------------|---------------------|
    /// | `EVENT_ID`         | today's event       |
    /// | `SESSION`          | `morning`           |
    /// | `SCAN_COOLDOWN_MS` | `3000`              |
    /// | `AUTO_RESTART`     | `true`              |
    /// | `WATCH_ROSTER`     | `false`             |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let event_id = var("EVENT_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let session = match var("SESSION") {
            Some(raw) => raw.parse()?,
            None => Session::Morning,
        };

        let cooldown_ms: u64 = match var("SCAN_COOLDOWN_MS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("SCAN_COOLDOWN_MS must be a valid u64, got '{raw}'"))
            })?,
            None => DEFAULT_COOLDOWN_MS,
        };

        let auto_restart = parse_flag("AUTO_RESTART", var("AUTO_RESTART"), true)?;
        let watch_roster = parse_flag("WATCH_ROSTER", var("WATCH_ROSTER"), false)?;

        Ok(Self {
            event_id,
            session,
            scan: ScanSettings {
                cooldown: Duration::from_millis(cooldown_ms),
                auto_restart,
            },
            watch_roster,
        })
    }
}

fn parse_flag(name: &str, raw: Option<String>, default: bool) -> Result<bool, CoreError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{name} must be a boolean, got '{raw}'"
        ))),
    }
}
