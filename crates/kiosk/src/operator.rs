//! Operator input routing.
//!
//! The kiosk terminal carries both the QR reader's output and the
//! operator's commands. Lines starting with `/` are commands; every other
//! non-empty line is a decoded code and is forwarded to the decode source.

use rollcall_core::error::CoreError;
use rollcall_scanner::controller::ScanHandle;
use rollcall_scanner::resolver::LookupHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const HELP: &str = "\
/restart          re-arm the scanner (allows the same code again)
/stop             stop the scanner
/ack              acknowledge a network error
/cameras          list capture devices
/camera <id>      switch capture device
/search <text>    look a student up by name or id
/pick <n>         select candidate n (1-based)
/submit           mark the selected student present
/clear            clear the lookup
/status           show scanner and lookup state
/quit             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Restart,
    Stop,
    Acknowledge,
    Cameras,
    Camera(String),
    Search(String),
    Pick(usize),
    Submit,
    Clear,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Code(String),
    Command(Command),
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Input::Code(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name.to_ascii_lowercase().as_str(), arg) {
            ("restart", _) => Command::Restart,
            ("stop", _) => Command::Stop,
            ("ack", _) => Command::Acknowledge,
            ("cameras", _) => Command::Cameras,
            ("camera", id) if !id.is_empty() => Command::Camera(id.to_string()),
            ("search", text) => Command::Search(text.to_string()),
            ("pick", n) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => Command::Pick(n - 1),
                _ => return Input::Invalid(format!("/pick needs a candidate number, got '{n}'")),
            },
            ("submit", _) => Command::Submit,
            ("clear", _) => Command::Clear,
            ("status", _) => Command::Status,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => return Input::Invalid(format!("unknown command '{line}', type /help")),
        };
        Input::Command(command)
    }
}

/// Route operator input until EOF or `/quit`. Codes are written, one per
/// line, to `wedge`.
pub async fn run<R, W>(
    input: R,
    mut wedge: W,
    scanner: ScanHandle,
    lookup: LookupHandle,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match Input::parse(&line) {
            Input::Empty => {}
            Input::Code(code) => {
                wedge.write_all(code.as_bytes()).await?;
                wedge.write_all(b"\n").await?;
                wedge.flush().await?;
            }
            Input::Invalid(message) => tracing::warn!("{message}"),
            Input::Command(Command::Quit) => break,
            Input::Command(command) => {
                if let Err(e) = execute(command, &scanner, &lookup).await {
                    tracing::warn!(error = %e, "Command failed");
                }
            }
        }
    }
    Ok(())
}

async fn execute(command: Command, scanner: &ScanHandle, lookup: &LookupHandle) -> Result<(), CoreError> {
    match command {
        Command::Restart => {
            scanner.manual_restart().await?;
        }
        Command::Stop => {
            scanner.stop().await?;
        }
        Command::Acknowledge => {
            scanner.acknowledge_network_error().await?;
            lookup.acknowledge_network_error().await?;
        }
        Command::Cameras => {
            for (i, camera) in scanner.list_cameras().await?.iter().enumerate() {
                tracing::info!(index = i + 1, id = %camera.id, "{}", camera.display_label());
            }
        }
        Command::Camera(id) => {
            scanner.change_camera(id).await?;
        }
        Command::Search(text) => {
            lookup.query_changed(text).await?;
        }
        Command::Pick(index) => {
            let snap = lookup.select(index).await?;
            tracing::info!(selected = %snap.query, "Candidate selected, type /submit to mark present");
        }
        Command::Submit => {
            let outcome = lookup.submit().await?;
            tracing::debug!(outcome = outcome.label(), "Manual submission finished");
        }
        Command::Clear => {
            lookup.clear().await?;
        }
        Command::Status => {
            let scan = scanner.snapshot().await?;
            let manual = lookup.snapshot().await?;
            tracing::info!(
                phase = ?scan.phase,
                processing = scan.is_processing,
                seconds_remaining = ?scan.seconds_remaining(),
                last_code = scan.last_processed_code.as_deref().unwrap_or("-"),
                network_blocked = scan.network_blocked || manual.network_blocked,
                "Scanner status",
            );
            if let Some(message) = scan.last_message {
                tracing::info!("{message}");
            }
            for (i, student) in manual.candidates.iter().enumerate() {
                tracing::info!(index = i + 1, "{}", student.canonical_label());
            }
        }
        Command::Help => {
            for line in HELP.lines() {
                tracing::info!("{line}");
            }
        }
        Command::Quit => {}
    }
    Ok(())
}
