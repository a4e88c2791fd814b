//! Operator commands: scope and numeric code.
//!
//! Codes 1-8 act on a room's devices; 9-12 belong to the alarm subsystem.

use std::fmt;
use std::str::FromStr;

use roomhub_types::{Action, ActionSet, RoomId, tags};

use crate::device::DeviceStore;
use crate::{Error, Result};

const LAMPS: &[&str] = &[tags::LAMP_1, tags::LAMP_2];
const ALL_OUTPUTS: &[&str] = &[
    tags::LAMP_1,
    tags::LAMP_2,
    tags::AIR_CONDITIONER,
    tags::PROJECTOR,
];

/// Target of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Room(RoomId),
    /// Every connected room
    Broadcast,
    /// The alarm subsystem
    SystemWide,
}

impl Scope {
    /// Scope from the operator's room number, where `0` means every room.
    #[must_use]
    pub fn from_operator(room: u32) -> Self {
        if room == 0 {
            Scope::Broadcast
        } else {
            Scope::Room(RoomId::new(room))
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Room(id) => write!(f, "Room {id}"),
            Scope::Broadcast => f.write_str("All rooms"),
            Scope::SystemWide => f.write_str("Central"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    ToggleLamp1,
    ToggleLamp2,
    ToggleAirConditioner,
    ToggleProjector,
    LampsOn,
    LampsOff,
    AllOn,
    AllOff,
    Arm,
    Disarm,
    BuzzerOn,
    BuzzerOff,
}

impl CommandCode {
    pub const ALL: [CommandCode; 12] = [
        CommandCode::ToggleLamp1,
        CommandCode::ToggleLamp2,
        CommandCode::ToggleAirConditioner,
        CommandCode::ToggleProjector,
        CommandCode::LampsOn,
        CommandCode::LampsOff,
        CommandCode::AllOn,
        CommandCode::AllOff,
        CommandCode::Arm,
        CommandCode::Disarm,
        CommandCode::BuzzerOn,
        CommandCode::BuzzerOff,
    ];

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            CommandCode::ToggleLamp1 => 1,
            CommandCode::ToggleLamp2 => 2,
            CommandCode::ToggleAirConditioner => 3,
            CommandCode::ToggleProjector => 4,
            CommandCode::LampsOn => 5,
            CommandCode::LampsOff => 6,
            CommandCode::AllOn => 7,
            CommandCode::AllOff => 8,
            CommandCode::Arm => 9,
            CommandCode::Disarm => 10,
            CommandCode::BuzzerOn => 11,
            CommandCode::BuzzerOff => 12,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            CommandCode::ToggleLamp1 => "toggle lamp 1",
            CommandCode::ToggleLamp2 => "toggle lamp 2",
            CommandCode::ToggleAirConditioner => "toggle air conditioner",
            CommandCode::ToggleProjector => "toggle projector",
            CommandCode::LampsOn => "all lamps on",
            CommandCode::LampsOff => "all lamps off",
            CommandCode::AllOn => "all devices on",
            CommandCode::AllOff => "all devices off",
            CommandCode::Arm => "arm alarm",
            CommandCode::Disarm => "disarm alarm",
            CommandCode::BuzzerOn => "buzzer on",
            CommandCode::BuzzerOff => "buzzer off",
        }
    }

    /// Whether the code belongs to the alarm subsystem.
    #[must_use]
    pub fn is_alarm(self) -> bool {
        self.code() >= 9
    }

    fn toggled_tag(self) -> Option<&'static str> {
        match self {
            CommandCode::ToggleLamp1 => Some(tags::LAMP_1),
            CommandCode::ToggleLamp2 => Some(tags::LAMP_2),
            CommandCode::ToggleAirConditioner => Some(tags::AIR_CONDITIONER),
            CommandCode::ToggleProjector => Some(tags::PROJECTOR),
            _ => None,
        }
    }

    /// Turn a room command into concrete actions against the room's last
    /// known device values.
    ///
    /// Toggles flip the current value. Bulk codes skip tags the room didn't
    /// declare.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommand` for an alarm code and
    /// `Error::DeviceNotFound` when the room has none of the targeted devices.
    pub fn resolve(self, devices: &DeviceStore) -> Result<ActionSet> {
        if let Some(tag) = self.toggled_tag() {
            let current = devices.value(tag)?;
            return Ok(ActionSet::from([(tag.to_string(), Action::toggle_from(&current))]));
        }

        let (targets, action) = match self {
            CommandCode::LampsOn => (LAMPS, Action::On),
            CommandCode::LampsOff => (LAMPS, Action::Off),
            CommandCode::AllOn => (ALL_OUTPUTS, Action::On),
            CommandCode::AllOff => (ALL_OUTPUTS, Action::Off),
            _ => {
                return Err(Error::InvalidCommand(format!(
                    "code {} is not a room command",
                    self.code()
                )));
            }
        };

        let actions: ActionSet = targets
            .iter()
            .filter(|tag| devices.contains(tag))
            .map(|tag| ((*tag).to_string(), action))
            .collect();

        if actions.is_empty() {
            return Err(Error::DeviceNotFound(targets.join(", ")));
        }
        Ok(actions)
    }
}

impl TryFrom<u32> for CommandCode {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        CommandCode::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| Error::InvalidCommand(format!("unknown code {code}")))
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// A validated operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub scope: Scope,
    pub code: CommandCode,
}

impl Command {
    /// Pair a scope with a code, rejecting combinations that make no sense.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommand` when an alarm code targets rooms or a
    /// room code targets the alarm subsystem.
    pub fn new(scope: Scope, code: CommandCode) -> Result<Self> {
        match (scope, code.is_alarm()) {
            (Scope::SystemWide, false) => Err(Error::InvalidCommand(format!(
                "code {} needs a room",
                code.code()
            ))),
            (Scope::Room(_) | Scope::Broadcast, true) => Err(Error::InvalidCommand(format!(
                "code {} is system-wide and takes no room",
                code.code()
            ))),
            _ => Ok(Self { scope, code }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.code)
    }
}

/// Operator input: `<room> <code>` or a bare alarm `<code>`.
impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| Error::InvalidCommand(format!("not a number: {part}")))
        };

        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [code] => Command::new(Scope::SystemWide, CommandCode::try_from(parse(code)?)?),
            [room, code] => Command::new(
                Scope::from_operator(parse(room)?),
                CommandCode::try_from(parse(code)?)?,
            ),
            _ => Err(Error::InvalidCommand(format!(
                "expected `<room> <code>` or `<code>`, got `{}`",
                s.trim()
            ))),
        }
    }
}
