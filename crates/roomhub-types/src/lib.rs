//! Shared types for roomhub components.
//!
//! This crate provides the device, action and snapshot types used across
//! roomhub-core, roomhub-rpc, roomhub-daemon and the room simulator. All types
//! are serializable for transport over the room link.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known device tags used by the hub's command table and alarm logic.
pub mod tags {
    pub const LAMP_1: &str = "lamp1";
    pub const LAMP_2: &str = "lamp2";
    pub const AIR_CONDITIONER: &str = "air_conditioner";
    pub const PROJECTOR: &str = "multimedia_projector";
    pub const PRESENCE_SENSOR: &str = "presence_sensor";
    pub const WINDOW_SENSOR: &str = "window_sensor";
    pub const DOOR_SENSOR: &str = "door_sensor";
    pub const SMOKE_SENSOR: &str = "smoke_sensor";
    pub const TEMPERATURE_HUMIDITY: &str = "temperature_humidity_sensor";
    pub const PEOPLE_COUNT: &str = "people_count";
    pub const ALARM_SYSTEM: &str = "alarm_system";
    pub const BUZZER: &str = "alarm_bell";
}

/// Deserialize a float that may be null or missing (both become 0.0)
fn deserialize_null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<f64> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Stable room identity assigned by the hub at first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(u32);

impl RoomId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The identity following this one, or `None` past `u32::MAX`.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// Name given to a room the hub has not seen before.
    #[must_use]
    pub fn default_name(self) -> String {
        format!("room_{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RoomId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Device classification. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "output")]
    BinaryOutput,

    #[serde(rename = "input")]
    BinaryInput,

    /// Temperature and humidity sensor (DHT22 on the controllers).
    #[serde(rename = "dth22", alias = "dht22", alias = "sensor")]
    CompositeSensor,
}

impl DeviceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::BinaryOutput => "output",
            DeviceKind::BinaryInput => "input",
            DeviceKind::CompositeSensor => "dth22",
        }
    }

    /// Value a freshly declared device starts with.
    #[must_use]
    pub fn initial_value(self) -> DeviceValue {
        match self {
            DeviceKind::BinaryOutput | DeviceKind::BinaryInput => DeviceValue::Level(0),
            DeviceKind::CompositeSensor => DeviceValue::Reading(SensorReading::default()),
        }
    }

    /// Whether `value` has the shape this kind carries.
    #[must_use]
    pub fn accepts(self, value: &DeviceValue) -> bool {
        matches!(
            (self, value),
            (
                DeviceKind::BinaryOutput | DeviceKind::BinaryInput,
                DeviceValue::Level(_)
            ) | (DeviceKind::CompositeSensor, DeviceValue::Reading(_))
        )
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device declaration as sent in the `register` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub tag: String,
    pub name: String,
    pub kind: DeviceKind,
}

impl DeviceSpec {
    #[must_use]
    pub fn new(tag: impl Into<String>, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Reading of a composite temperature/humidity sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, deserialize_with = "deserialize_null_as_zero")]
    pub temperature: f64,
    #[serde(default, deserialize_with = "deserialize_null_as_zero")]
    pub humidity: f64,
}

/// Current value of a device.
///
/// Binary devices carry an integer level: `0` is off/inactive and any other
/// value is on/active. The people counter is a binary input whose level is the
/// number of people in the room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceValue {
    Level(i64),
    Reading(SensorReading),
}

impl DeviceValue {
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self {
            DeviceValue::Level(level) => *level != 0,
            DeviceValue::Reading(_) => false,
        }
    }

    #[must_use]
    pub fn level(&self) -> Option<i64> {
        match self {
            DeviceValue::Level(level) => Some(*level),
            DeviceValue::Reading(_) => None,
        }
    }
}

impl From<bool> for DeviceValue {
    fn from(on: bool) -> Self {
        DeviceValue::Level(i64::from(on))
    }
}

impl From<SensorReading> for DeviceValue {
    fn from(reading: SensorReading) -> Self {
        DeviceValue::Reading(reading)
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceValue::Level(level) => write!(f, "{level}"),
            DeviceValue::Reading(r) => write!(f, "{:.1} °C / {:.1} %", r.temperature, r.humidity),
        }
    }
}

impl Serialize for DeviceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeviceValue::Level(level) => serializer.serialize_i64(*level),
            DeviceValue::Reading(reading) => reading.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DeviceValue {
    // Controllers report GPIO levels as 0/1, restored state as booleans and
    // sensor readings as objects.
    #[allow(clippy::cast_possible_truncation)] // Float levels are rounded on purpose
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Int(i64),
            Float(f64),
            Reading(SensorReading),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(on) => DeviceValue::from(on),
            Raw::Int(level) => DeviceValue::Level(level),
            Raw::Float(level) => DeviceValue::Level(level.round() as i64),
            Raw::Reading(reading) => DeviceValue::Reading(reading),
        })
    }
}

/// Values keyed by device tag, as carried by `push` and `response` messages.
pub type DeviceValues = BTreeMap<String, DeviceValue>;

/// Requested state for a binary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    On,
    #[serde(alias = "of")]
    Off,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
        }
    }

    /// Action that flips a binary device away from `current`.
    #[must_use]
    pub fn toggle_from(current: &DeviceValue) -> Self {
        if current.is_active() {
            Action::Off
        } else {
            Action::On
        }
    }

    #[must_use]
    pub fn level(self) -> i64 {
        match self {
            Action::On => 1,
            Action::Off => 0,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions keyed by device tag, as carried by `post` messages.
pub type ActionSet = BTreeMap<String, Action>;

/// State of the intrusion alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    #[default]
    Disarmed,
    Armed,
}

impl AlarmStatus {
    #[must_use]
    pub fn is_armed(self) -> bool {
        self == AlarmStatus::Armed
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmStatus::Disarmed => f.write_str("OFF"),
            AlarmStatus::Armed => f.write_str("ON"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub tag: String,
    pub name: String,
    pub kind: DeviceKind,
    pub value: DeviceValue,
}

/// Point-in-time copy of one room, safe to hand to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub name: String,
    /// Name the controller declared when it registered
    pub label: String,
    pub address: String,
    pub connected: bool,
    pub devices: Vec<DeviceSnapshot>,
}

impl RoomSnapshot {
    #[must_use]
    pub fn device(&self, tag: &str) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.tag == tag)
    }

    /// Whether the binary device `tag` reads active. Missing devices read inactive.
    #[must_use]
    pub fn is_active(&self, tag: &str) -> bool {
        self.device(tag).is_some_and(|d| d.value.is_active())
    }

    #[must_use]
    pub fn people_count(&self) -> i64 {
        self.device(tags::PEOPLE_COUNT)
            .and_then(|d| d.value.level())
            .unwrap_or(0)
    }
}

/// Read-only state handed to display collaborators on every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HubSnapshot {
    pub rooms: Vec<RoomSnapshot>,
    pub alarm: AlarmStatus,
    pub people_count: i64,
}

impl HubSnapshot {
    #[must_use]
    pub fn new(rooms: Vec<RoomSnapshot>, alarm: AlarmStatus) -> Self {
        let people_count = rooms.iter().map(RoomSnapshot::people_count).sum();
        Self {
            rooms,
            alarm,
            people_count,
        }
    }

    #[must_use]
    pub fn connected_rooms(&self) -> usize {
        self.rooms.iter().filter(|r| r.connected).count()
    }
}
