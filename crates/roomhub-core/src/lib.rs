pub mod alarm;
pub mod audit;
pub mod command;
pub mod config;
pub mod device;
pub mod identity;

mod error;

#[cfg(test)]
mod tests;

pub use alarm::{ActiveSensor, AlarmMachine, ArmRefused, Trigger, TriggerKind, TriggerLatch};
pub use audit::{AuditLog, LogEntry};
pub use command::{Command, CommandCode, Scope};
pub use device::{Device, DeviceStore};
pub use error::{Error, Result};
pub use identity::{IdentityStore, RoomIdentity};

pub use roomhub_types::*;
