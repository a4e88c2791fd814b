//! Operator console.
//!
//! Lines are read by `rustyline` on a blocking thread and handled on the
//! runtime, so a slow room never stalls input editing.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use roomhub_core::{Command, CommandCode};
use roomhub_types::HubSnapshot;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::execute;
use crate::hub::{Hub, wait_for_shutdown};

const PROMPT: &str = "roomhub> ";

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Help,
    Status,
    Quit,
    Command(Command),
}

impl FromStr for Input {
    type Err = roomhub_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Input::Empty),
            "help" | "h" | "?" => Ok(Input::Help),
            "status" | "s" => Ok(Input::Status),
            "quit" | "q" | "exit" => Ok(Input::Quit),
            other => other.parse().map(Input::Command),
        }
    }
}

#[must_use]
pub fn help() -> String {
    let mut text = String::from("Commands:\n  <room> <code>   room 0 targets every connected room\n");
    for code in CommandCode::ALL.into_iter().filter(|c| !c.is_alarm()) {
        let _ = writeln!(text, "    {:>2}  {}", code.code(), code.description());
    }
    text.push_str("  <code>          alarm subsystem\n");
    for code in CommandCode::ALL.into_iter().filter(|c| c.is_alarm()) {
        let _ = writeln!(text, "    {:>2}  {}", code.code(), code.description());
    }
    text.push_str("  status | help | quit");
    text
}

#[must_use]
pub fn render_status(snapshot: &HubSnapshot) -> String {
    let mut text = format!(
        "Alarm: {}  People: {}  Rooms: {}/{} connected",
        snapshot.alarm,
        snapshot.people_count,
        snapshot.connected_rooms(),
        snapshot.rooms.len()
    );

    for room in &snapshot.rooms {
        let state = if room.connected {
            "connected"
        } else {
            "disconnected"
        };
        let _ = write!(
            text,
            "\n{} ({}) {} [{}]",
            room.name, room.label, room.address, state
        );
        for device in &room.devices {
            let _ = write!(text, "\n  {:<28} {}", device.name, device.value);
        }
    }
    text
}

/// Handle one line and return what to print.
pub async fn respond(hub: &Hub, line: &str) -> String {
    match line.parse::<Input>() {
        Ok(Input::Empty) => String::new(),
        Ok(Input::Help) => help(),
        Ok(Input::Status) => render_status(&hub.snapshot().await),
        Ok(Input::Quit) => {
            hub.shutdown().await;
            "Bye".to_string()
        }
        Ok(Input::Command(command)) => match execute(hub, command).await {
            Ok(outcome) => outcome.to_string(),
            Err(e) => format!("Command not applied: {e}"),
        },
        Err(e) => format!("{e} (type `help`)"),
    }
}

fn spawn_reader(tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                warn!("Console unavailable: {}", e);
                return;
            }
        };

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    let _ = tx.send("quit".to_string());
                    break;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });
}

/// Run the console until the operator quits or the hub shuts down.
pub async fn run_console(hub: Arc<Hub>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_reader(tx);
    println!("{}", help());

    let mut shutdown = hub.shutdown_signal();
    loop {
        let line = tokio::select! {
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            () = wait_for_shutdown(&mut shutdown) => break,
        };

        let reply = respond(&hub, &line).await;
        if !reply.is_empty() {
            println!("{reply}");
        }
    }

    debug!("Console stopped");
}

/// Log every published snapshot change at debug level.
pub async fn log_snapshots(hub: Arc<Hub>) {
    let mut snapshots = hub.subscribe();
    let mut shutdown = hub.shutdown_signal();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                debug!(
                    "State: alarm {}, {} people, {}/{} rooms connected",
                    snapshot.alarm,
                    snapshot.people_count,
                    snapshot.connected_rooms(),
                    snapshot.rooms.len()
                );
            }
            () = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}
