//! Room link protocol for roomhub.
//!
//! This crate provides the message types, transport codec and controller-side
//! client for communication between the hub and room controllers over TCP.
//!
//! # Architecture
//!
//! - [`protocol`]: message types (`register`, `ack`, `push`, `post`, `response`)
//! - [`transport`]: length-prefixed codec for message framing
//! - [`client`]: controller-side connection helper
//! - [`error`]: malformed-frame errors
//!
//! # Example
//!
//! ```no_run
//! use roomhub_rpc::RoomClient;
//! use roomhub_types::{DeviceKind, DeviceSpec};
//!
//! # async fn example() -> Result<(), roomhub_rpc::ClientError> {
//! let mut client = RoomClient::connect("127.0.0.1:10000".parse().unwrap()).await?;
//! let ack = client
//!     .register("Lab", [DeviceSpec::new("lamp1", "Lamp 1", DeviceKind::BinaryOutput)])
//!     .await?;
//! println!("Registered as room {}", ack.room_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{ClientError, RoomClient};
pub use error::ProtocolError;
pub use protocol::{AckData, CommandResponse, Message, RegisterData, ResponseStatus};
pub use transport::{CodecError, MAX_MESSAGE_SIZE, MessageCodec};
