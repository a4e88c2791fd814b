//! Room link message types.
//!
//! Every message is a JSON object tagged by `type`. Controllers register once,
//! then push unsolicited device updates and answer each `post` with exactly one
//! `response`. The protocol carries no correlation id: responses match posts by
//! arrival order on the stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use roomhub_types::{ActionSet, DeviceSpec, DeviceValues, RoomId};

/// Payload of the `register` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterData {
    pub name: String,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSpec>,
}

impl RegisterData {
    #[must_use]
    pub fn new(name: impl Into<String>, devices: impl IntoIterator<Item = DeviceSpec>) -> Self {
        Self {
            name: name.into(),
            devices: devices
                .into_iter()
                .map(|spec| (spec.tag.clone(), spec))
                .collect(),
        }
    }
}

/// Hub acknowledgement of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckData {
    pub room_id: RoomId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Error,
}

/// Controller reply to a `post`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub data: DeviceValues,
    #[serde(default)]
    pub message: String,
}

impl CommandResponse {
    #[must_use]
    pub fn accepted(data: DeviceValues) -> Self {
        Self {
            status: ResponseStatus::Accepted,
            data,
            message: "Command applied".to_string(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: DeviceValues::new(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == ResponseStatus::Accepted
    }
}

/// A single frame on the room link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Controller → hub, once per connection
    Register { data: RegisterData },

    /// Hub → controller, reply to `register`
    Ack { data: AckData },

    /// Controller → hub, unsolicited device update
    Push { data: DeviceValues },

    /// Hub → controller, command
    Post { data: ActionSet },

    /// Controller → hub, reply to the last `post`
    Response(CommandResponse),
}

impl Message {
    /// Parse a JSON string into a `Message`.
    ///
    /// Controllers may omit `type` on responses; an object without `type` that
    /// carries a `status` is read as a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or doesn't match any message type.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(json)?;
        if let Value::Object(map) = &mut value
            && !map.contains_key("type")
            && map.contains_key("status")
        {
            map.insert("type".to_string(), Value::from("response"));
        }
        serde_json::from_value(value)
    }

    /// Serialize this message to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message type, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::Ack { .. } => "ack",
            Message::Push { .. } => "push",
            Message::Post { .. } => "post",
            Message::Response(_) => "response",
        }
    }
}
