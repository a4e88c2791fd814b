//! Controller-side client for the room link.
//!
//! Wraps a framed TCP stream to the hub: registers the room, pushes device
//! updates and answers the hub's posts in order.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomhub_types::{ActionSet, DeviceSpec, DeviceValues, RoomId};
use tokio::net::{TcpSocket, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::protocol::{AckData, CommandResponse, Message, RegisterData};
use crate::transport::{CodecError, MessageCodec};

/// How long `register` waits for the hub's acknowledgement
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur with the room client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Registration timeout")]
    Timeout,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(&'static str),
}

/// Connection from a room controller to the hub
pub struct RoomClient {
    framed: Framed<TcpStream, MessageCodec>,
    ack: Option<AckData>,
}

impl RoomClient {
    /// Connect to the hub at `hub`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the connection fails.
    pub async fn connect(hub: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(hub).await?;
        Ok(Self::from_stream(stream))
    }

    /// Connect from a fixed local address.
    ///
    /// The hub keys room identity on the controller's address, so binding the
    /// same local port keeps the same room id across reconnections.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if binding or connecting fails.
    pub async fn connect_from(local: SocketAddr, hub: SocketAddr) -> Result<Self, ClientError> {
        let socket = if local.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
        let stream = socket.connect(hub).await?;
        Ok(Self::from_stream(stream))
    }

    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, MessageCodec::new()),
            ack: None,
        }
    }

    /// Register this room and wait for the hub's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails, the hub closes the connection, no
    /// acknowledgement arrives in time, or the hub answers with anything else.
    pub async fn register(
        &mut self,
        name: &str,
        devices: impl IntoIterator<Item = DeviceSpec>,
    ) -> Result<AckData, ClientError> {
        let data = RegisterData::new(name, devices);
        self.framed.send(Message::Register { data }).await?;

        let reply = tokio::time::timeout(REGISTER_TIMEOUT, self.recv())
            .await
            .map_err(|_| ClientError::Timeout)??;

        match reply {
            Some(Message::Ack { data }) => {
                debug!("Registered as room {} ({})", data.room_id, data.name);
                self.ack = Some(data.clone());
                Ok(data)
            }
            Some(other) => Err(ClientError::UnexpectedMessage(other.kind())),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Room id assigned by the hub, once registered.
    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        self.ack.as_ref().map(|ack| ack.room_id)
    }

    /// Send an unsolicited device update.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if sending fails.
    pub async fn push(&mut self, data: DeviceValues) -> Result<(), ClientError> {
        self.framed.send(Message::Push { data }).await?;
        Ok(())
    }

    /// Answer the oldest unanswered post.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if sending fails.
    pub async fn respond(&mut self, response: CommandResponse) -> Result<(), ClientError> {
        self.framed.send(Message::Response(response)).await?;
        Ok(())
    }

    /// Receive the next well-formed message, or `None` once the hub closes.
    ///
    /// Malformed frames are logged and skipped. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the stream fails.
    pub async fn recv(&mut self) -> Result<Option<Message>, ClientError> {
        while let Some(frame) = self.framed.next().await {
            match frame? {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => warn!("Dropping malformed frame from hub: {}", e),
            }
        }
        Ok(None)
    }

    /// Receive the next post, skipping anything else the hub sends.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the stream fails.
    pub async fn next_post(&mut self) -> Result<Option<ActionSet>, ClientError> {
        while let Some(msg) = self.recv().await? {
            match msg {
                Message::Post { data } => return Ok(Some(data)),
                other => debug!("Ignoring {} from hub", other.kind()),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_types::{Action, DeviceKind, DeviceValue};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_register_then_answer_post() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hub = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, MessageCodec::new());

            let Some(Ok(Ok(Message::Register { data }))) = framed.next().await else {
                panic!("Expected Register");
            };
            assert!(data.devices.contains_key("lamp1"));
            framed
                .send(Message::Ack {
                    data: AckData {
                        room_id: RoomId::new(1),
                        name: "room_1".to_string(),
                    },
                })
                .await
                .unwrap();

            let mut actions = ActionSet::new();
            actions.insert("lamp1".to_string(), Action::On);
            framed.send(Message::Post { data: actions }).await.unwrap();

            let Some(Ok(Ok(Message::Response(resp)))) = framed.next().await else {
                panic!("Expected Response");
            };
            resp
        });

        let mut client = RoomClient::connect(addr).await.unwrap();
        let ack = client
            .register(
                "Lab",
                [DeviceSpec::new("lamp1", "Lamp 1", DeviceKind::BinaryOutput)],
            )
            .await
            .unwrap();
        assert_eq!(ack.room_id, RoomId::new(1));
        assert_eq!(client.room_id(), Some(RoomId::new(1)));

        let post = client.next_post().await.unwrap().unwrap();
        assert_eq!(post["lamp1"], Action::On);

        let mut data = DeviceValues::new();
        data.insert("lamp1".to_string(), DeviceValue::Level(1));
        client
            .respond(CommandResponse::accepted(data))
            .await
            .unwrap();

        let resp = hub.await.unwrap();
        assert!(resp.is_accepted());
        assert_eq!(resp.data["lamp1"], DeviceValue::Level(1));
    }

    #[tokio::test]
    async fn test_register_fails_when_hub_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = RoomClient::connect(addr).await.unwrap();
        let result = client.register("Lab", []).await;
        assert!(matches!(
            result,
            Err(ClientError::ConnectionClosed | ClientError::Codec(_))
        ));
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(ClientError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(ClientError::Timeout.to_string(), "Registration timeout");
        assert!(
            ClientError::UnexpectedMessage("post")
                .to_string()
                .contains("post")
        );
    }
}
