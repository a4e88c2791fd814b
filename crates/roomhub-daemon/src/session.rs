//! Room sessions: one per controller connection.
//!
//! The wire protocol has no correlation id, so a session allows a single
//! outstanding `post` and matches responses to it by arrival order.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use roomhub_rpc::{CommandResponse, Message};
use roomhub_types::{ActionSet, DeviceValues};
use tokio::sync::{MutexGuard, mpsc, oneshot, watch};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a command did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Room is busy with another command")]
    Busy,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Hub is shutting down")]
    ShuttingDown,

    #[error("Room rejected the command: {0}")]
    Rejected(String),
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ConnectionLost,
    ShuttingDown,
}

impl From<CloseReason> for CommandError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::ConnectionLost => CommandError::ConnectionLost,
            CloseReason::ShuttingDown => CommandError::ShuttingDown,
        }
    }
}

type Reply = Result<DeviceValues, CommandError>;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<oneshot::Sender<Reply>>,
    /// Responses still owed for commands that timed out
    stale: usize,
    closed: Option<CloseReason>,
}

/// What the inbound loop should do with a `response` frame.
#[derive(Debug)]
pub enum Claim {
    /// Answers the outstanding command
    Waiting(Waiter),
    /// Late answer to a command that already timed out
    Stale,
    /// Nobody asked
    Unsolicited,
}

/// The caller blocked on the outstanding command.
#[derive(Debug)]
pub struct Waiter(oneshot::Sender<Reply>);

impl Waiter {
    pub fn complete(self, response: CommandResponse) {
        let reply = if response.is_accepted() {
            Ok(response.data)
        } else {
            Err(CommandError::Rejected(response.message))
        };
        // The caller may have timed out in the meantime.
        let _ = self.0.send(reply);
    }
}

#[derive(Debug)]
pub struct RoomSession {
    id: SessionId,
    address: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
    timeout: Duration,
    permit: tokio::sync::Mutex<()>,
    slot: Mutex<Slot>,
    closed_tx: watch::Sender<bool>,
}

impl RoomSession {
    #[must_use]
    pub fn new(
        address: SocketAddr,
        outbound: mpsc::UnboundedSender<Message>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: SessionId::new(),
            address,
            outbound,
            timeout,
            permit: tokio::sync::Mutex::new(()),
            slot: Mutex::new(Slot::default()),
            closed_tx: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_open(&self) -> Result<(), CommandError> {
        match self.slot().closed {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot().closed.is_some()
    }

    /// Queue a frame for the writer task.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::ConnectionLost` once the writer has gone.
    pub fn send(&self, msg: Message) -> Result<(), CommandError> {
        self.outbound
            .send(msg)
            .map_err(|_| CommandError::ConnectionLost)
    }

    /// Wait for this session's command slot, in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns the close reason if the session closes first.
    pub async fn begin(&self) -> Result<CommandPermit<'_>, CommandError> {
        self.check_open()?;
        let guard = self.permit.lock().await;
        self.check_open()?;
        Ok(CommandPermit {
            session: self,
            _guard: guard,
        })
    }

    /// Take the command slot only if it is free.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Busy` while another command is outstanding.
    pub fn try_begin(&self) -> Result<CommandPermit<'_>, CommandError> {
        self.check_open()?;
        let guard = self.permit.try_lock().map_err(|_| CommandError::Busy)?;
        Ok(CommandPermit {
            session: self,
            _guard: guard,
        })
    }

    /// Send `actions` and wait for the room's answer.
    ///
    /// # Errors
    ///
    /// See [`CommandPermit::send`].
    pub async fn send_command(&self, actions: ActionSet) -> Result<DeviceValues, CommandError> {
        self.begin().await?.send(actions).await
    }

    /// Route an inbound `response` frame.
    pub fn claim_response(&self) -> Claim {
        let mut slot = self.slot();
        if slot.stale > 0 {
            slot.stale -= 1;
            return Claim::Stale;
        }
        match slot.pending.take() {
            Some(tx) => Claim::Waiting(Waiter(tx)),
            None => Claim::Unsolicited,
        }
    }

    /// Stop the session and release the waiting caller, if any. Only the
    /// first reason sticks.
    pub fn close(&self, reason: CloseReason) {
        let pending = {
            let mut slot = self.slot();
            if slot.closed.is_some() {
                return;
            }
            slot.closed = Some(reason);
            slot.pending.take()
        };

        if let Some(tx) = pending {
            let _ = tx.send(Err(reason.into()));
        }
        self.closed_tx.send_replace(true);
        debug!("[{}] Session closed: {:?}", self.id, reason);
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Exclusive right to issue one command on a session.
///
/// Holding it across a read of the room's devices and the following `send`
/// keeps toggles consistent with concurrent dispatches.
#[derive(Debug)]
pub struct CommandPermit<'a> {
    session: &'a RoomSession,
    _guard: MutexGuard<'a, ()>,
}

impl CommandPermit<'_> {
    /// Post `actions` and wait for the correlated response.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the room answered with an error status
    /// - `Timeout` if no answer came in time; the late answer is discarded
    /// - `ConnectionLost` / `ShuttingDown` if the session closed meanwhile
    pub async fn send(self, actions: ActionSet) -> Result<DeviceValues, CommandError> {
        let session = self.session;
        let (tx, mut rx) = oneshot::channel();

        {
            let mut slot = session.slot();
            if let Some(reason) = slot.closed {
                return Err(reason.into());
            }
            slot.pending = Some(tx);
        }

        trace!("[{}] post {:?}", session.id, actions);
        if session.send(Message::Post { data: actions }).is_err() {
            session.slot().pending = None;
            return Err(CommandError::ConnectionLost);
        }

        match tokio::time::timeout(session.timeout, &mut rx).await {
            Ok(reply) => reply.unwrap_or(Err(CommandError::ConnectionLost)),
            Err(_) => {
                {
                    let mut slot = session.slot();
                    if slot.pending.take().is_some() {
                        slot.stale += 1;
                        debug!("[{}] Command timed out", session.id);
                        return Err(CommandError::Timeout(session.timeout));
                    }
                }
                // Claimed between the deadline and the lock.
                rx.await.unwrap_or(Err(CommandError::ConnectionLost))
            }
        }
    }
}
