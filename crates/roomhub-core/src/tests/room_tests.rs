//! Register, command and alarm paths against in-memory rooms

use std::collections::BTreeMap;

use roomhub_types::{
    Action, AlarmStatus, DeviceKind, DeviceValue, DeviceValues, HubSnapshot, tags,
};

use super::fixtures::{classroom, classroom_specs, snapshot};
use crate::alarm::{AlarmMachine, TriggerKind, TriggerLatch};
use crate::audit::{AuditLog, LogEntry};
use crate::command::{Command, CommandCode, Scope};
use crate::device::DeviceStore;
use crate::identity::IdentityStore;

#[test]
fn test_register_payload_roundtrips_kinds() {
    let specs = classroom_specs();
    let store = DeviceStore::from_specs(specs.clone());

    let declared: BTreeMap<String, DeviceKind> =
        specs.into_iter().map(|s| (s.tag, s.kind)).collect();
    let stored: BTreeMap<String, DeviceKind> = store
        .specs()
        .into_iter()
        .map(|(tag, spec)| (tag, spec.kind))
        .collect();

    assert_eq!(declared, stored);
}

#[test]
fn test_toggle_command_then_response_updates_store() {
    let mut room = classroom();
    let cmd: Command = "1 1".parse().unwrap();
    assert_eq!(cmd.scope, Scope::Room(1.into()));

    let actions = cmd.code.resolve(&room).unwrap();
    assert_eq!(actions[tags::LAMP_1], Action::On);

    let mut reply = DeviceValues::new();
    reply.insert(tags::LAMP_1.to_string(), DeviceValue::Level(1));
    assert_eq!(room.apply(&reply), 1);

    let next = CommandCode::ToggleLamp1.resolve(&room).unwrap();
    assert_eq!(next[tags::LAMP_1], Action::Off);
}

#[test]
fn test_command_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("commands.log")).unwrap();
    let room = classroom();

    let actions = CommandCode::LampsOn.resolve(&room).unwrap();
    log.append(&LogEntry::new(Scope::Room(1.into()).to_string(), &actions))
        .unwrap();

    let content = std::fs::read_to_string(log.path()).unwrap();
    assert!(content.starts_with("Room 1, lamp1 on lamp2 on, "));
}

#[test]
fn test_arm_refused_by_open_door_in_room_two() {
    let quiet = classroom();
    let mut open_door = classroom();
    open_door
        .set(tags::DOOR_SENSOR, DeviceValue::Level(1))
        .unwrap();

    let rooms = vec![snapshot(1, &quiet), snapshot(2, &open_door)];
    let mut alarm = AlarmMachine::new();
    let refused = alarm.try_arm(&rooms).unwrap_err();

    let pairs: Vec<(&str, &str)> = refused
        .active
        .iter()
        .map(|a| (a.room.as_str(), a.sensor.as_str()))
        .collect();
    assert_eq!(pairs, vec![("room_2", "door_sensor")]);
    assert_eq!(alarm.status(), AlarmStatus::Disarmed);
}

#[test]
fn test_smoke_push_trips_watch_while_armed() {
    let mut rooms = vec![classroom(), classroom(), classroom()];
    let mut alarm = AlarmMachine::new();
    let mut latch = TriggerLatch::new();

    let snapshots = |rooms: &[DeviceStore]| -> Vec<_> {
        rooms
            .iter()
            .zip(1..)
            .map(|(store, id)| snapshot(id, store))
            .collect()
    };

    alarm.try_arm(&snapshots(&rooms)).unwrap();
    assert!(latch.scan(&snapshots(&rooms), alarm.status()).is_empty());

    let mut push = DeviceValues::new();
    push.insert(tags::SMOKE_SENSOR.to_string(), DeviceValue::Level(1));
    rooms[2].apply(&push);

    let triggers = latch.scan(&snapshots(&rooms), alarm.status());
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].kind, TriggerKind::Fire);
    assert_eq!(triggers[0].sensor.room, "room_3");
    assert_eq!(triggers[0].sensor.sensor, tags::SMOKE_SENSOR);
}

#[test]
fn test_people_count_sums_rooms() {
    let mut a = classroom();
    let mut b = classroom();
    a.set(tags::PEOPLE_COUNT, DeviceValue::Level(12)).unwrap();
    b.set(tags::PEOPLE_COUNT, DeviceValue::Level(5)).unwrap();

    let hub = HubSnapshot::new(vec![snapshot(1, &a), snapshot(2, &b)], AlarmStatus::Armed);
    assert_eq!(hub.people_count, 17);
    assert_eq!(hub.connected_rooms(), 2);
}

#[test]
fn test_reconnect_keeps_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rooms.json");

    let first = IdentityStore::load(&path)
        .unwrap()
        .recall_or_assign("192.168.0.20:40000")
        .unwrap();
    let again = IdentityStore::load(&path)
        .unwrap()
        .recall_or_assign("192.168.0.20:40000")
        .unwrap();

    assert_eq!(first, again);
}
