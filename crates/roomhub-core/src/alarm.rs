//! Alarm state machine and trigger detection.
//!
//! Everything here works on room snapshots, so callers decide how the
//! snapshot is taken and what to do with a trigger.

use std::collections::HashSet;
use std::fmt;

use roomhub_types::{AlarmStatus, RoomId, RoomSnapshot, tags};

/// Sensors that block arming and trip the alarm while armed.
pub const INTRUSION_SENSORS: &[&str] = &[
    tags::PRESENCE_SENSOR,
    tags::WINDOW_SENSOR,
    tags::DOOR_SENSOR,
];

/// Sensors that trip the buzzer whatever the alarm state.
pub const FIRE_SENSORS: &[&str] = &[tags::SMOKE_SENSOR];

/// A sensor reading active in a connected room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveSensor {
    pub room_id: RoomId,
    pub room: String,
    pub sensor: String,
}

impl fmt::Display for ActiveSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.sensor, self.room)
    }
}

/// Every active sensor among `sensors` in connected rooms, by room then by
/// the order of `sensors`.
#[must_use]
pub fn active_sensors(rooms: &[RoomSnapshot], sensors: &[&str]) -> Vec<ActiveSensor> {
    let mut connected: Vec<&RoomSnapshot> = rooms.iter().filter(|r| r.connected).collect();
    connected.sort_by_key(|r| r.id);

    connected
        .into_iter()
        .flat_map(|room| {
            sensors
                .iter()
                .filter(|sensor| room.is_active(sensor))
                .map(|sensor| ActiveSensor {
                    room_id: room.id,
                    room: room.name.clone(),
                    sensor: (*sensor).to_string(),
                })
        })
        .collect()
}

/// Arming refused because intrusion sensors are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmRefused {
    pub active: Vec<ActiveSensor>,
}

impl fmt::Display for ArmRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: Vec<String> = self.active.iter().map(ToString::to_string).collect();
        write!(f, "Alarm not armed, active sensors: {}", list.join(", "))
    }
}

#[derive(Debug, Default)]
pub struct AlarmMachine {
    status: AlarmStatus,
}

impl AlarmMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(&self) -> AlarmStatus {
        self.status
    }

    /// Arm unless an intrusion sensor reads active in a connected room.
    ///
    /// Arming an armed system succeeds and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ArmRefused` listing exactly the active sensors; the state is
    /// left as it was.
    pub fn try_arm(&mut self, rooms: &[RoomSnapshot]) -> Result<(), ArmRefused> {
        let active = active_sensors(rooms, INTRUSION_SENSORS);
        if !active.is_empty() {
            return Err(ArmRefused { active });
        }
        self.status = AlarmStatus::Armed;
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.status = AlarmStatus::Disarmed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Fire,
    Intrusion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub sensor: ActiveSensor,
    pub kind: TriggerKind,
}

/// Edge detector for the trigger watch.
///
/// A `(room, sensor)` pair fires once when it becomes active and again only
/// after it has read inactive (or stopped being watched) in between.
#[derive(Debug, Default)]
pub struct TriggerLatch {
    latched: HashSet<(RoomId, String)>,
}

impl TriggerLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newly active triggers since the last scan. Fire sensors are always
    /// watched, intrusion sensors only while `status` is armed.
    pub fn scan(&mut self, rooms: &[RoomSnapshot], status: AlarmStatus) -> Vec<Trigger> {
        let mut active: Vec<Trigger> = active_sensors(rooms, FIRE_SENSORS)
            .into_iter()
            .map(|sensor| Trigger {
                sensor,
                kind: TriggerKind::Fire,
            })
            .collect();

        if status.is_armed() {
            active.extend(
                active_sensors(rooms, INTRUSION_SENSORS)
                    .into_iter()
                    .map(|sensor| Trigger {
                        sensor,
                        kind: TriggerKind::Intrusion,
                    }),
            );
        }

        let now: HashSet<(RoomId, String)> = active
            .iter()
            .map(|t| (t.sensor.room_id, t.sensor.sensor.clone()))
            .collect();

        let fresh = active
            .into_iter()
            .filter(|t| {
                !self
                    .latched
                    .contains(&(t.sensor.room_id, t.sensor.sensor.clone()))
            })
            .collect();

        self.latched = now;
        fresh
    }

    /// Forget latched intrusion sensors, so they fire again on the next
    /// armed scan.
    pub fn release_intrusion(&mut self) {
        self.latched
            .retain(|(_, sensor)| !INTRUSION_SENSORS.contains(&sensor.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_types::{DeviceKind, DeviceSnapshot, DeviceValue};

    fn room(id: u32, connected: bool, active: &[&str]) -> RoomSnapshot {
        let all = [
            tags::PRESENCE_SENSOR,
            tags::WINDOW_SENSOR,
            tags::DOOR_SENSOR,
            tags::SMOKE_SENSOR,
        ];
        RoomSnapshot {
            id: RoomId::new(id),
            name: format!("room_{id}"),
            label: format!("Room {id}"),
            address: format!("10.0.0.{id}:4000"),
            connected,
            devices: all
                .iter()
                .map(|tag| DeviceSnapshot {
                    tag: (*tag).to_string(),
                    name: (*tag).to_string(),
                    kind: DeviceKind::BinaryInput,
                    value: DeviceValue::from(active.contains(tag)),
                })
                .collect(),
        }
    }

    #[test]
    fn test_arm_with_quiet_rooms() {
        let rooms = vec![room(1, true, &[]), room(2, true, &[])];
        let mut machine = AlarmMachine::new();
        machine.try_arm(&rooms).unwrap();
        assert_eq!(machine.status(), AlarmStatus::Armed);
    }

    #[test]
    fn test_arm_refused_lists_exact_sensors() {
        let rooms = vec![
            room(1, true, &[]),
            room(2, true, &[tags::DOOR_SENSOR]),
            room(3, true, &[tags::SMOKE_SENSOR]),
        ];
        let mut machine = AlarmMachine::new();
        let refused = machine.try_arm(&rooms).unwrap_err();

        assert_eq!(
            refused.active,
            vec![ActiveSensor {
                room_id: RoomId::new(2),
                room: "room_2".to_string(),
                sensor: "door_sensor".to_string(),
            }]
        );
        assert_eq!(machine.status(), AlarmStatus::Disarmed);
        assert!(refused.to_string().contains("door_sensor in room_2"));
    }

    #[test]
    fn test_disconnected_rooms_do_not_block_arming() {
        let rooms = vec![room(1, false, &[tags::PRESENCE_SENSOR])];
        let mut machine = AlarmMachine::new();
        assert!(machine.try_arm(&rooms).is_ok());
    }

    #[test]
    fn test_disarm_is_unconditional() {
        let mut machine = AlarmMachine::new();
        machine.try_arm(&[]).unwrap();
        machine.disarm();
        machine.disarm();
        assert_eq!(machine.status(), AlarmStatus::Disarmed);
    }

    #[test]
    fn test_smoke_fires_when_disarmed() {
        let rooms = vec![room(3, true, &[tags::SMOKE_SENSOR])];
        let mut latch = TriggerLatch::new();
        let triggers = latch.scan(&rooms, AlarmStatus::Disarmed);

        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Fire);
        assert_eq!(triggers[0].sensor.sensor, "smoke_sensor");
    }

    #[test]
    fn test_intrusion_only_when_armed() {
        let rooms = vec![room(1, true, &[tags::WINDOW_SENSOR])];
        let mut latch = TriggerLatch::new();
        assert!(latch.scan(&rooms, AlarmStatus::Disarmed).is_empty());

        let triggers = latch.scan(&rooms, AlarmStatus::Armed);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Intrusion);
    }

    #[test]
    fn test_latch_fires_once_per_activation() {
        let mut latch = TriggerLatch::new();
        let hot = vec![room(1, true, &[tags::SMOKE_SENSOR])];
        let cold = vec![room(1, true, &[])];

        assert_eq!(latch.scan(&hot, AlarmStatus::Disarmed).len(), 1);
        assert!(latch.scan(&hot, AlarmStatus::Disarmed).is_empty());
        assert!(latch.scan(&cold, AlarmStatus::Disarmed).is_empty());
        assert_eq!(latch.scan(&hot, AlarmStatus::Disarmed).len(), 1);
    }

    #[test]
    fn test_release_intrusion_keeps_fire_latched() {
        let mut latch = TriggerLatch::new();
        let rooms = vec![room(1, true, &[tags::DOOR_SENSOR, tags::SMOKE_SENSOR])];
        assert_eq!(latch.scan(&rooms, AlarmStatus::Armed).len(), 2);

        latch.release_intrusion();
        let again = latch.scan(&rooms, AlarmStatus::Armed);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].sensor.sensor, tags::DOOR_SENSOR);
    }
}
