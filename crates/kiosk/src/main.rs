//! `rollcall-kiosk` -- attendance check-in terminal.
//!
//! Reads QR payloads from a keyboard-wedge reader on stdin, submits them
//! to the attendance backend and renders the outcome. The operator can
//! type `/` commands on the same terminal for manual lookup, restarts and
//! camera switching (`/help` lists them).
//!
//! # Environment variables
//!
//! | Variable               | Required | Default                 | Description                          |
//! |------------------------|----------|-------------------------|--------------------------------------|
//! | `API_URL`              | no       | `http://localhost:5000` | Backend origin (`/api` is appended)  |
//! | `API_TOKEN`            | no       | --                      | Bearer token for protected endpoints |
//! | `REQUEST_TIMEOUT_SECS` | no       | `15`                    | HTTP request timeout                 |
//! | `EVENT_ID`             | no       | today's event           | Event to take attendance for         |
//! | `SESSION`              | no       | `morning`               | `morning` or `afternoon`             |
//! | `SCAN_COOLDOWN_MS`     | no       | `3000`                  | Pause after each submission          |
//! | `AUTO_RESTART`         | no       | `true`                  | Resume scanning after the cooldown   |
//! | `WATCH_ROSTER`         | no       | `false`                 | Poll the public roster for the event |

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_client::api::{AttendanceApi, HttpAttendanceApi};
use rollcall_client::config::ClientConfig;
use rollcall_client::gateway::SubmissionGateway;
use rollcall_client::roster::RosterPoller;
use rollcall_core::attendance::EventContext;
use rollcall_core::event::pick_todays_event;
use rollcall_events::EventBus;
use rollcall_kiosk::config::KioskConfig;
use rollcall_kiosk::{console, operator};
use rollcall_scanner::controller::ScanController;
use rollcall_scanner::decode::{CameraInfo, DecodeConfig};
use rollcall_scanner::line_source::LineDecodeSource;
use rollcall_scanner::resolver::LookupResolver;

/// Buffer between the operator loop and the wedge decode source.
const WEDGE_BUFFER_BYTES: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rollcall_kiosk=info,rollcall_scanner=info,rollcall_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let client_config = ClientConfig::from_env()?;
    let kiosk_config = KioskConfig::from_env()?;
    tracing::info!(
        api = %client_config.api_base_url,
        authenticated = client_config.token.is_some(),
        session = kiosk_config.session.as_str(),
        "Loaded kiosk configuration",
    );

    let api: Arc<dyn AttendanceApi> = Arc::new(
        HttpAttendanceApi::new(&client_config).context("Failed to build HTTP client")?,
    );

    // --- Event bus and presentation ---
    let bus = Arc::new(EventBus::default());
    let console_handle = tokio::spawn(console::run(bus.subscribe()));

    // --- Event selection ---
    let context = resolve_context(api.as_ref(), &kiosk_config).await?;
    tracing::info!(
        event_id = %context.event_id,
        event = %context.event_title,
        session = context.session.label(),
        "Taking attendance",
    );

    let roster = kiosk_config.watch_roster.then(|| {
        RosterPoller::start(Arc::clone(&api), Arc::clone(&bus), context.event_id.clone())
    });

    // --- Scanner and manual lookup ---
    let gateway = Arc::new(SubmissionGateway::new(Arc::clone(&api)).with_events(Arc::clone(&bus)));

    let (wedge_tx, wedge_rx) = tokio::io::duplex(WEDGE_BUFFER_BYTES);
    let source = LineDecodeSource::new(
        BufReader::new(wedge_rx),
        CameraInfo::new("wedge", Some("Keyboard wedge reader".into())),
    );
    let scanner = ScanController::spawn(
        Box::new(source),
        Arc::clone(&gateway),
        Arc::clone(&bus),
        kiosk_config.scan,
        DecodeConfig::default(),
    );
    let lookup = LookupResolver::spawn(Arc::clone(&api), gateway, Arc::clone(&bus));

    lookup.set_context(Some(context.clone())).await?;
    let snapshot = scanner.activate(None, Some(context)).await?;
    tracing::info!(
        camera = snapshot.active_camera.as_deref().unwrap_or("-"),
        "Ready to scan, type /help for operator commands",
    );

    // --- Run until EOF, /quit or Ctrl-C ---
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = operator::run(stdin, wedge_tx, scanner.clone(), lookup.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Operator input failed");
            }
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        }
    }

    // --- Shutdown ---
    if let Err(e) = scanner.deactivate().await {
        tracing::warn!(error = %e, "Scanner did not deactivate cleanly");
    }
    if let Some(roster) = roster {
        roster.stop().await;
    }

    drop(scanner);
    drop(lookup);
    drop(bus);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), console_handle).await;

    tracing::info!("Kiosk stopped");
    Ok(())
}

/// The configured event, or today's event when none is configured.
async fn resolve_context(
    api: &dyn AttendanceApi,
    config: &KioskConfig,
) -> anyhow::Result<EventContext> {
    let events = match api.list_events().await {
        Ok(events) => events,
        Err(e) if config.event_id.is_some() => {
            tracing::warn!(error = %e, "Could not load events, using the configured id as title");
            Vec::new()
        }
        Err(e) => return Err(e).context("Failed to load events"),
    };

    match &config.event_id {
        Some(id) => {
            let title = events
                .iter()
                .find(|e| &e.id == id)
                .map(|e| e.title.clone())
                .unwrap_or_else(|| id.clone());
            Ok(EventContext::new(id.clone(), title, config.session))
        }
        None => {
            let today = Utc::now().date_naive();
            let Some(event) = pick_todays_event(&events, today) else {
                anyhow::bail!("No event scheduled for {today}; set EVENT_ID to choose one");
            };
            Ok(EventContext::new(event.id.clone(), event.title.clone(), config.session))
        }
    }
}
