//! Roomhub daemon library: the hub that coordinates room controllers.
//!
//! Controllers connect over TCP and register their devices. The operator
//! drives them through the console; the alarm coordinator watches their
//! sensors.

pub mod alarm;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod registry;
pub mod server;
pub mod session;

pub use alarm::{AlarmCoordinator, run_trigger_watch};
pub use dispatcher::{
    Applied, DispatchError, DispatchReport, Outcome, RoomOutcome, broadcast_actions, dispatch,
    execute,
};
pub use error::{DaemonError, Result};
pub use hub::{Hub, wait_for_shutdown};
pub use registry::{Room, SessionRegistry};
pub use server::{run, serve};
pub use session::{CloseReason, CommandError, CommandPermit, RoomSession, SessionId};
