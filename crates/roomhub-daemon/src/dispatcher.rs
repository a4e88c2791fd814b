//! Command dispatcher: operator commands to room posts.
//!
//! Room commands (codes 1-8) fan out to their target rooms concurrently,
//! one post per room. Alarm commands (9-12) go to the alarm coordinator.

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use roomhub_core::{ArmRefused, Command, CommandCode, LogEntry, Scope};
use roomhub_types::{ActionSet, DeviceValues, RoomId};
use tracing::{debug, warn};

use crate::hub::Hub;
use crate::registry::Room;
use crate::session::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No connected room matches {0}")]
    RoomNotFound(Scope),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Room {room}: {source}")]
    Command {
        room: RoomId,
        #[source]
        source: CommandError,
    },

    #[error("Could not record command: {0}")]
    Persistence(roomhub_core::Error),
}

impl From<roomhub_core::Error> for DispatchError {
    fn from(err: roomhub_core::Error) -> Self {
        match err {
            roomhub_core::Error::InvalidCommand(msg) => DispatchError::InvalidCommand(msg),
            roomhub_core::Error::DeviceNotFound(tag) => DispatchError::DeviceNotFound(tag),
            other => DispatchError::Persistence(other),
        }
    }
}

/// What one room did with its share of a command.
#[derive(Debug)]
pub struct RoomOutcome {
    pub room: RoomId,
    pub name: String,
    pub result: Result<Applied, DispatchError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub actions: ActionSet,
    pub values: DeviceValues,
}

/// Per-room results of one dispatch, in room id order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<RoomOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &RoomOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RoomOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    #[must_use]
    pub fn outcome(&self, room: RoomId) -> Option<&RoomOutcome> {
        self.outcomes.iter().find(|o| o.room == room)
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.outcomes.is_empty() {
            return f.write_str("No room affected");
        }
        for (i, outcome) in self.outcomes.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            match &outcome.result {
                Ok(applied) => {
                    let actions: Vec<String> = applied
                        .actions
                        .iter()
                        .map(|(tag, action)| format!("{tag} {action}"))
                        .collect();
                    write!(f, "{}: applied {}", outcome.name, actions.join(", "))?;
                }
                Err(e) => write!(f, "{}: failed: {}", outcome.name, e)?,
            }
        }
        Ok(())
    }
}

/// Result of executing any operator command.
#[derive(Debug)]
pub enum Outcome {
    Applied(DispatchReport),
    ArmRefused(ArmRefused),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied(report) => report.fmt(f),
            Outcome::ArmRefused(refused) => refused.fmt(f),
        }
    }
}

/// Execute a validated operator command.
///
/// # Errors
///
/// Returns `RoomNotFound` when no connected room matches, and for a single
/// room scope, that room's failure.
pub async fn execute(hub: &Hub, command: Command) -> Result<Outcome, DispatchError> {
    debug!("Executing {}", command);
    match command.code {
        CommandCode::Arm => hub.alarm().arm(hub).await,
        CommandCode::Disarm => hub.alarm().disarm(hub).await.map(Outcome::Applied),
        CommandCode::BuzzerOn => hub.alarm().buzzer(hub, true).await.map(Outcome::Applied),
        CommandCode::BuzzerOff => hub.alarm().buzzer(hub, false).await.map(Outcome::Applied),
        code => dispatch(hub, command.scope, code).await.map(Outcome::Applied),
    }
}

/// Send a room command (codes 1-8) to every room in `scope`.
///
/// Each room is handled independently: one room failing doesn't stop the
/// others, and its failure is reported in its own outcome.
///
/// # Errors
///
/// - `InvalidCommand` for an alarm code or the system-wide scope
/// - `RoomNotFound` when no connected room matches
/// - for `Scope::Room`, the single room's failure
pub async fn dispatch(
    hub: &Hub,
    scope: Scope,
    code: CommandCode,
) -> Result<DispatchReport, DispatchError> {
    let command = Command::new(scope, code)?;
    let rooms = hub.registry().resolve(command.scope).await?;

    let mut outcomes = join_all(rooms.iter().map(|room| async move {
        RoomOutcome {
            room: room.id(),
            name: room.name().to_string(),
            result: apply_code(hub, room, code).await,
        }
    }))
    .await;

    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            warn!("Command {} failed in room {}: {}", code.code(), outcome.room, e);
        }
    }

    hub.publish_snapshot().await;

    if let Scope::Room(_) = scope
        && let Some(pos) = outcomes.iter().position(|o| o.result.is_err())
        && let Err(e) = outcomes.swap_remove(pos).result
    {
        return Err(e);
    }
    Ok(DispatchReport { outcomes })
}

/// Resolve and send one room's actions while holding its command slot, so
/// toggles read the value the previous command left behind.
async fn apply_code(hub: &Hub, room: &Room, code: CommandCode) -> Result<Applied, DispatchError> {
    let session = room.session().await.ok_or(DispatchError::Command {
        room: room.id(),
        source: CommandError::ConnectionLost,
    })?;
    let permit = session.begin().await.map_err(|source| DispatchError::Command {
        room: room.id(),
        source,
    })?;

    let actions = room.with_devices(|devices| code.resolve(devices)).await?;
    let values = permit
        .send(actions.clone())
        .await
        .map_err(|source| DispatchError::Command {
            room: room.id(),
            source,
        })?;

    hub.record(&LogEntry::new(Scope::Room(room.id()).to_string(), &actions))?;
    Ok(Applied { actions, values })
}

/// Send `actions` to every connected room, trimmed to the tags each room
/// declared. Rooms with none of the tags are left out of the report.
pub async fn broadcast_actions(hub: &Hub, actions: &ActionSet) -> DispatchReport {
    let rooms = hub.registry().connected().await;

    let sends = rooms.iter().map(|room: &Arc<Room>| async move {
        let trimmed: ActionSet = room
            .with_devices(|devices| {
                actions
                    .iter()
                    .filter(|(tag, _)| devices.contains(tag))
                    .map(|(tag, action)| (tag.clone(), *action))
                    .collect()
            })
            .await;
        if trimmed.is_empty() {
            return None;
        }

        let result = match room.session().await {
            Some(session) => session
                .send_command(trimmed.clone())
                .await
                .map(|values| Applied {
                    actions: trimmed,
                    values,
                })
                .map_err(|source| DispatchError::Command {
                    room: room.id(),
                    source,
                }),
            None => Err(DispatchError::Command {
                room: room.id(),
                source: CommandError::ConnectionLost,
            }),
        };

        if let Err(e) = &result {
            warn!("Alarm command failed in room {}: {}", room.id(), e);
        }
        Some(RoomOutcome {
            room: room.id(),
            name: room.name().to_string(),
            result,
        })
    });

    let outcomes = join_all(sends).await.into_iter().flatten().collect();
    DispatchReport { outcomes }
}
