//! Session registry: the hub's rooms and their identities.
//!
//! Rooms outlive their connections. A room that drops keeps its last known
//! device values and is reused when a controller registers again from the
//! same address.

use std::collections::BTreeMap;
use std::sync::Arc;

use roomhub_core::{DeviceStore, IdentityStore, Scope};
use roomhub_rpc::RegisterData;
use roomhub_types::{DeviceValues, RoomId, RoomSnapshot};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::dispatcher::DispatchError;
use crate::session::{CloseReason, RoomSession, SessionId};

#[derive(Debug)]
struct RoomState {
    label: String,
    devices: DeviceStore,
    connected: bool,
    session: Option<Arc<RoomSession>>,
}

/// One controller's identity and last known state.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    address: String,
    state: RwLock<RoomState>,
}

impl Room {
    #[must_use]
    pub fn id(&self) -> RoomId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    /// Current session, while connected.
    pub async fn session(&self) -> Option<Arc<RoomSession>> {
        let state = self.state.read().await;
        state.session.clone().filter(|_| state.connected)
    }

    /// Run `f` against the device store.
    pub async fn with_devices<T>(&self, f: impl FnOnce(&DeviceStore) -> T) -> T {
        f(&self.state.read().await.devices)
    }

    /// Apply reported values; returns how many were accepted.
    pub async fn apply(&self, values: &DeviceValues) -> usize {
        self.state.write().await.devices.apply(values)
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.read().await;
        RoomSnapshot {
            id: self.id,
            name: self.name.clone(),
            label: state.label.clone(),
            address: self.address.clone(),
            connected: state.connected,
            devices: state.devices.snapshots(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    rooms: BTreeMap<RoomId, Arc<Room>>,
    identities: IdentityStore,
}

#[derive(Debug)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(identities: IdentityStore) -> Self {
        Self {
            inner: RwLock::new(Inner {
                rooms: BTreeMap::new(),
                identities,
            }),
        }
    }

    /// Bind a freshly registered session to its room.
    ///
    /// A known address gets its old id and name back; a new one gets the next
    /// id, persisted before the room is created. Any session previously bound
    /// to the room is superseded and closed.
    ///
    /// # Errors
    ///
    /// Returns `roomhub_core::Error::Persistence` if a new identity can't be
    /// saved. Nothing is registered in that case.
    pub async fn register(
        &self,
        data: RegisterData,
        session: Arc<RoomSession>,
    ) -> roomhub_core::Result<Arc<Room>> {
        let address = session.address().to_string();
        let devices = DeviceStore::from_specs(data.devices.into_values());

        let (room, superseded) = {
            let mut inner = self.inner.write().await;
            let identity = inner.identities.recall_or_assign(&address)?;

            let new_state = RoomState {
                label: data.name,
                devices,
                connected: true,
                session: Some(session),
            };

            if let Some(room) = inner.rooms.get(&identity.id).cloned() {
                let old = {
                    let mut state = room.state.write().await;
                    std::mem::replace(&mut *state, new_state).session
                };
                (room, old)
            } else {
                let room = Arc::new(Room {
                    id: identity.id,
                    name: identity.name,
                    address,
                    state: RwLock::new(new_state),
                });
                inner.rooms.insert(room.id, room.clone());
                (room, None)
            }
        };

        if let Some(old) = superseded
            && !old.is_closed()
        {
            info!("Room {} superseded session {}", room.id, old.id());
            old.close(CloseReason::ConnectionLost);
        }

        info!(
            "Room {} ({}) registered from {}",
            room.id, room.name, room.address
        );
        Ok(room)
    }

    /// Flip a room to disconnected, unless a newer session has taken over.
    /// Returns whether anything changed.
    pub async fn mark_disconnected(&self, room: &Room, session: &SessionId) -> bool {
        let mut state = room.state.write().await;
        let current = state.session.as_ref().is_some_and(|s| s.id() == session);
        if !current {
            debug!("Room {}: stale session {} ended", room.id, session);
            return false;
        }
        state.connected = false;
        state.session = None;
        info!("Room {} disconnected", room.id);
        true
    }

    pub async fn get(&self, id: RoomId) -> Option<Arc<Room>> {
        self.inner.read().await.rooms.get(&id).cloned()
    }

    /// Every room, connected or not, in id order.
    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        self.inner.read().await.rooms.values().cloned().collect()
    }

    /// Connected rooms, in id order.
    pub async fn connected(&self) -> Vec<Arc<Room>> {
        let rooms = self.rooms().await;
        let mut connected = Vec::with_capacity(rooms.len());
        for room in rooms {
            if room.is_connected().await {
                connected.push(room);
            }
        }
        connected
    }

    /// Rooms a command with `scope` targets.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::RoomNotFound` for an unknown or disconnected
    /// room, or when no room is connected at all.
    pub async fn resolve(&self, scope: Scope) -> Result<Vec<Arc<Room>>, DispatchError> {
        let rooms = match scope {
            Scope::Room(id) => match self.get(id).await {
                Some(room) if room.is_connected().await => vec![room],
                _ => Vec::new(),
            },
            Scope::Broadcast | Scope::SystemWide => self.connected().await,
        };

        if rooms.is_empty() {
            return Err(DispatchError::RoomNotFound(scope));
        }
        Ok(rooms)
    }

    /// Consistent copy of every room. Membership is held still while the
    /// copies are taken.
    pub async fn snapshot(&self) -> Vec<RoomSnapshot> {
        let inner = self.inner.read().await;
        let mut rooms = Vec::with_capacity(inner.rooms.len());
        for room in inner.rooms.values() {
            rooms.push(room.snapshot().await);
        }
        rooms
    }

    /// Close every live session with `reason`.
    pub async fn close_all(&self, reason: CloseReason) {
        for room in self.rooms().await {
            if let Some(session) = room.state.read().await.session.clone() {
                session.close(reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_types::{DeviceKind, DeviceSpec, DeviceValue};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session(addr: &str) -> Arc<RoomSession> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = addr.parse().unwrap();
        Arc::new(RoomSession::new(addr, tx, Duration::from_secs(1)))
    }

    fn lamp_room(name: &str) -> RegisterData {
        RegisterData::new(
            name,
            [DeviceSpec::new("lamp1", "Lamp 1", DeviceKind::BinaryOutput)],
        )
    }

    #[tokio::test]
    async fn test_register_assigns_ids_in_order() {
        let registry = SessionRegistry::new(IdentityStore::in_memory());
        let a = registry
            .register(lamp_room("Lab"), session("10.0.0.1:5000"))
            .await
            .unwrap();
        let b = registry
            .register(lamp_room("Hall"), session("10.0.0.2:5000"))
            .await
            .unwrap();

        assert_eq!(a.id(), RoomId::new(1));
        assert_eq!(a.name(), "room_1");
        assert_eq!(b.id(), RoomId::new(2));

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].label, "Lab");
    }

    #[tokio::test]
    async fn test_reregistration_reuses_room_and_closes_old_session() {
        let registry = SessionRegistry::new(IdentityStore::in_memory());
        let first = session("10.0.0.1:5000");
        let room = registry
            .register(lamp_room("Lab"), first.clone())
            .await
            .unwrap();
        room.apply(&DeviceValues::from([(
            "lamp1".to_string(),
            DeviceValue::Level(1),
        )]))
        .await;

        let second = session("10.0.0.1:5000");
        let again = registry
            .register(lamp_room("Lab"), second.clone())
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&room, &again));
        assert!(first.is_closed());
        assert!(!second.is_closed());

        // The superseded session ending must not disconnect its successor.
        assert!(!registry.mark_disconnected(&room, first.id()).await);
        assert!(room.is_connected().await);

        assert!(registry.mark_disconnected(&room, second.id()).await);
        assert!(!room.is_connected().await);
    }

    #[tokio::test]
    async fn test_disconnected_room_keeps_values() {
        let registry = SessionRegistry::new(IdentityStore::in_memory());
        let s = session("10.0.0.1:5000");
        let room = registry.register(lamp_room("Lab"), s.clone()).await.unwrap();
        room.apply(&DeviceValues::from([(
            "lamp1".to_string(),
            DeviceValue::Level(1),
        )]))
        .await;
        registry.mark_disconnected(&room, s.id()).await;

        let snapshot = registry.snapshot().await;
        assert!(!snapshot[0].connected);
        assert!(snapshot[0].is_active("lamp1"));
        assert!(room.session().await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_scopes() {
        let registry = SessionRegistry::new(IdentityStore::in_memory());
        assert!(matches!(
            registry.resolve(Scope::Broadcast).await,
            Err(DispatchError::RoomNotFound(Scope::Broadcast))
        ));

        let s1 = session("10.0.0.1:5000");
        let r1 = registry.register(lamp_room("A"), s1.clone()).await.unwrap();
        registry
            .register(lamp_room("B"), session("10.0.0.2:5000"))
            .await
            .unwrap();
        registry
            .register(lamp_room("C"), session("10.0.0.3:5000"))
            .await
            .unwrap();
        registry.mark_disconnected(&r1, s1.id()).await;

        let ids: Vec<RoomId> = registry
            .resolve(Scope::Broadcast)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![RoomId::new(2), RoomId::new(3)]);

        assert!(registry.resolve(Scope::Room(RoomId::new(1))).await.is_err());
        assert!(registry.resolve(Scope::Room(RoomId::new(9))).await.is_err());
        assert_eq!(
            registry.resolve(Scope::Room(RoomId::new(3))).await.unwrap()[0].id(),
            RoomId::new(3)
        );
    }

    #[tokio::test]
    async fn test_close_all_closes_sessions() {
        let registry = SessionRegistry::new(IdentityStore::in_memory());
        let s = session("10.0.0.1:5000");
        registry.register(lamp_room("Lab"), s.clone()).await.unwrap();

        registry.close_all(CloseReason::ShuttingDown).await;
        assert!(s.is_closed());
    }

    #[tokio::test]
    async fn test_persistence_failure_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.json");
        let registry = SessionRegistry::new(IdentityStore::load(&path).unwrap());
        // A directory where the file should be makes the save fail.
        std::fs::create_dir(&path).unwrap();
        let result = registry
            .register(lamp_room("Lab"), session("10.0.0.1:5000"))
            .await;

        assert!(matches!(
            result,
            Err(roomhub_core::Error::Persistence { .. })
        ));
        assert!(registry.rooms().await.is_empty());
    }
}
