//! TCP server for room controllers.
//!
//! Every connection must open with `register`. After the hub answers with
//! `ack`, the connection becomes a room session: an inbound loop applies
//! pushes and routes responses, and a writer task drains the session's
//! outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, Stream, StreamExt};
use roomhub_rpc::{AckData, CodecError, Message, MessageCodec, ProtocolError, RegisterData};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::error::{DaemonError, Result};
use crate::hub::{Hub, wait_for_shutdown};
use crate::registry::Room;
use crate::session::{Claim, CloseReason, RoomSession};

type Frame = std::result::Result<std::result::Result<Message, ProtocolError>, CodecError>;

/// Bind the configured address and serve until shutdown.
///
/// # Errors
///
/// Returns an error if the bind address is invalid or cannot be bound.
pub async fn run(hub: Arc<Hub>) -> Result<()> {
    let addr = bind_address(&hub.config().bind)?;
    let listener = TcpListener::bind(addr).await?;
    info!("Hub listening on {}", listener.local_addr()?);
    serve(listener, hub).await
}

/// Accept room connections on `listener` until shutdown.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop continues.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> Result<()> {
    let mut shutdown = hub.shutdown_signal();

    info!("Ready to accept rooms");
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, hub).await {
                            warn!("Connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("Accept error: {}", e),
            },
            () = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested, stopping server");
                break;
            }
        }
    }

    Ok(())
}

/// Parse a configured `host:port` bind address.
///
/// # Errors
///
/// Returns `DaemonError::Config` if `bind` is not a socket address.
pub fn bind_address(bind: &str) -> Result<SocketAddr> {
    bind.parse()
        .map_err(|e| DaemonError::Config(format!("invalid bind address {bind:?}: {e}")))
}

async fn await_register<S>(stream: &mut S) -> Result<RegisterData>
where
    S: Stream<Item = Frame> + Unpin,
{
    match stream.next().await {
        Some(Ok(Ok(Message::Register { data }))) => Ok(data),
        Some(Ok(Ok(other))) => Err(DaemonError::Registration(format!(
            "expected register, got {}",
            other.kind()
        ))),
        Some(Ok(Err(e))) => Err(DaemonError::Registration(e.to_string())),
        Some(Err(e)) => Err(e.into()),
        None => Err(DaemonError::Registration(
            "connection closed before register".to_string(),
        )),
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: Arc<Hub>) -> Result<()> {
    let framed = Framed::new(stream, MessageCodec::new());
    let (mut sink, mut stream) = framed.split();

    let data = tokio::time::timeout(
        hub.config().registration_timeout(),
        await_register(&mut stream),
    )
    .await
    .map_err(|_| DaemonError::Registration("timed out waiting for register".to_string()))??;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let session = Arc::new(RoomSession::new(addr, tx, hub.config().command_timeout()));
    let room = hub.registry().register(data, session.clone()).await?;

    // Queued ahead of any post, so the controller always sees it first.
    let _ = session.send(Message::Ack {
        data: AckData {
            room_id: room.id(),
            name: room.name().to_string(),
        },
    });
    hub.publish_snapshot().await;

    let writer_session = session.clone();
    let send_task = tokio::spawn(async move {
        let id = writer_session.id().clone();
        trace!("[{}] send_task started", id);
        while let Some(msg) = rx.recv().await {
            trace!("[{}] send_task: sending {}", id, msg.kind());
            if let Err(e) = sink.send(msg).await {
                warn!("[{}] Failed to send: {}", id, e);
                writer_session.close(CloseReason::ConnectionLost);
                break;
            }
        }
        trace!("[{}] send_task ended", id);
    });

    let mut shutdown = hub.shutdown_signal();
    let result = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            () = session.closed() => break Ok(()),
            () = wait_for_shutdown(&mut shutdown) => break Ok(()),
        };

        match frame {
            Some(Ok(Ok(msg))) => process_message(&hub, &room, &session, msg).await,
            Some(Ok(Err(e))) => warn!("Room {}: dropping malformed frame: {}", room.id(), e),
            Some(Err(e)) => break Err(e.into()),
            None => break Ok(()),
        }
    };

    debug!("Room {}: session {} ended", room.id(), session.id());
    let reason = if hub.is_shutting_down() {
        CloseReason::ShuttingDown
    } else {
        CloseReason::ConnectionLost
    };
    session.close(reason);
    if hub.registry().mark_disconnected(&room, session.id()).await {
        hub.publish_snapshot().await;
    }
    send_task.abort();

    result
}

async fn process_message(hub: &Hub, room: &Room, session: &RoomSession, msg: Message) {
    match msg {
        Message::Push { data } => {
            let applied = room.apply(&data).await;
            debug!("Room {}: push applied {} value(s)", room.id(), applied);
            hub.publish_snapshot().await;
        }
        Message::Response(response) => match session.claim_response() {
            Claim::Waiting(waiter) => {
                if response.is_accepted() {
                    room.apply(&response.data).await;
                }
                waiter.complete(response);
            }
            Claim::Stale => debug!("Room {}: discarding late response", room.id()),
            Claim::Unsolicited => warn!("Room {}: unsolicited response dropped", room.id()),
        },
        other => warn!(
            "Room {}: unexpected {} from controller",
            room.id(),
            other.kind()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use roomhub_types::DeviceValues;

    fn frames(items: Vec<Frame>) -> impl Stream<Item = Frame> + Unpin {
        stream::iter(items)
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(
            bind_address("0.0.0.0:10000").unwrap(),
            "0.0.0.0:10000".parse::<SocketAddr>().unwrap()
        );
        assert!(matches!(
            bind_address("localhost"),
            Err(DaemonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_await_register_accepts_register() {
        let mut s = frames(vec![Ok(Ok(Message::Register {
            data: RegisterData::new("Lab", []),
        }))]);
        let data = await_register(&mut s).await.unwrap();
        assert_eq!(data.name, "Lab");
    }

    #[tokio::test]
    async fn test_await_register_rejects_other_first_message() {
        let mut s = frames(vec![Ok(Ok(Message::Push {
            data: DeviceValues::new(),
        }))]);
        let err = await_register(&mut s).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Registration failed: expected register, got push"
        );
    }

    #[tokio::test]
    async fn test_await_register_on_closed_stream() {
        let mut s = frames(Vec::new());
        assert!(matches!(
            await_register(&mut s).await,
            Err(DaemonError::Registration(_))
        ));
    }

    #[tokio::test]
    async fn test_await_register_codec_error() {
        let mut s = frames(vec![Err(CodecError::MessageTooLarge(usize::MAX))]);
        assert!(matches!(
            await_register(&mut s).await,
            Err(DaemonError::Codec(_))
        ));
    }
}
