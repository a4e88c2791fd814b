//! Alarm coordinator: arming, disarming, buzzer control and the trigger
//! watch.

use std::sync::Arc;

use roomhub_core::{AlarmMachine, LogEntry, Scope, Trigger, TriggerKind, TriggerLatch};
use roomhub_types::{Action, ActionSet, AlarmStatus, tags};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchError, DispatchReport, Outcome, broadcast_actions};
use crate::hub::{Hub, wait_for_shutdown};

#[derive(Debug, Default)]
pub struct AlarmCoordinator {
    machine: Mutex<AlarmMachine>,
    latch: Mutex<TriggerLatch>,
}

impl AlarmCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self) -> AlarmStatus {
        self.machine.lock().await.status()
    }

    /// Arm unless an intrusion sensor is active in a connected room, then
    /// switch every room's `alarm_system` on.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Persistence` if the command log write fails.
    /// A refusal is an `Ok(Outcome::ArmRefused)`.
    pub async fn arm(&self, hub: &Hub) -> Result<Outcome, DispatchError> {
        {
            let mut machine = self.machine.lock().await;
            let rooms = hub.registry().snapshot().await;
            if let Err(refused) = machine.try_arm(&rooms) {
                info!("{}", refused);
                return Ok(Outcome::ArmRefused(refused));
            }
        }
        info!("Alarm armed");

        let actions = ActionSet::from([(tags::ALARM_SYSTEM.to_string(), Action::On)]);
        announce(hub, &actions).await.map(Outcome::Applied)
    }

    /// Disarm and silence every room. Intrusion sensors still active fire
    /// again once the system is re-armed.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Persistence` if the command log write fails.
    pub async fn disarm(&self, hub: &Hub) -> Result<DispatchReport, DispatchError> {
        {
            // Latch before machine, as in `check_triggers`: a watch pass in
            // flight finishes before the state flips.
            let mut latch = self.latch.lock().await;
            self.machine.lock().await.disarm();
            latch.release_intrusion();
        }
        info!("Alarm disarmed");

        let actions = ActionSet::from([
            (tags::ALARM_SYSTEM.to_string(), Action::Off),
            (hub.config().buzzer_tag.clone(), Action::Off),
        ]);
        announce(hub, &actions).await
    }

    /// Switch the buzzer in every room.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Persistence` if the command log write fails.
    #[allow(clippy::unused_self)] // Kept next to arm/disarm as the alarm command surface
    pub async fn buzzer(&self, hub: &Hub, on: bool) -> Result<DispatchReport, DispatchError> {
        let action = if on { Action::On } else { Action::Off };
        let actions = ActionSet::from([(hub.config().buzzer_tag.clone(), action)]);
        announce(hub, &actions).await
    }

    /// One pass of the trigger watch. Newly active triggers sound the buzzer
    /// everywhere and are logged against the room they came from.
    ///
    /// The latch is held for the whole pass, so `disarm` cannot slip in
    /// between reading the alarm state and acting on it.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Persistence` if a trigger could not be logged.
    /// Every trigger is still announced and the remaining entries written.
    pub async fn check_triggers(&self, hub: &Hub) -> Result<Vec<Trigger>, DispatchError> {
        let mut latch = self.latch.lock().await;
        let status = self.machine.lock().await.status();
        let rooms = hub.registry().snapshot().await;
        let triggers = latch.scan(&rooms, status);
        if triggers.is_empty() {
            return Ok(triggers);
        }

        for trigger in &triggers {
            match trigger.kind {
                TriggerKind::Fire => warn!("Fire alarm: {}", trigger.sensor),
                TriggerKind::Intrusion => warn!("Intrusion alarm: {}", trigger.sensor),
            }
        }

        let buzzer = ActionSet::from([(hub.config().buzzer_tag.clone(), Action::On)]);
        let report = broadcast_actions(hub, &buzzer).await;
        if !report.is_success() {
            warn!("Buzzer did not sound everywhere:\n{}", report);
        }

        let mut failure = None;
        for trigger in &triggers {
            let entry = LogEntry::new(Scope::Room(trigger.sensor.room_id).to_string(), &buzzer)
                .with(&trigger.sensor.sensor, "on");
            if let Err(e) = hub.record(&entry) {
                failure.get_or_insert(e);
            }
        }
        drop(latch);

        hub.publish_snapshot().await;
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(triggers),
        }
    }
}

/// Send a system-wide action set to every room and log it once as `Central`.
async fn announce(hub: &Hub, actions: &ActionSet) -> Result<DispatchReport, DispatchError> {
    let report = broadcast_actions(hub, actions).await;
    hub.record(&LogEntry::new(Scope::SystemWide.to_string(), actions))?;
    hub.publish_snapshot().await;
    Ok(report)
}

/// Poll sensors on the configured interval until shutdown. Never disarms.
pub async fn run_trigger_watch(hub: Arc<Hub>) {
    let mut interval = tokio::time::interval(hub.config().watch_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = hub.shutdown_signal();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = wait_for_shutdown(&mut shutdown) => break,
        }
        if let Err(e) = hub.alarm().check_triggers(&hub).await {
            warn!("Trigger watch pass incomplete: {}", e);
        }
    }

    debug!("Trigger watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RoomSession;
    use roomhub_core::config::HubConfig;
    use roomhub_core::{AuditLog, IdentityStore};
    use roomhub_rpc::RegisterData;
    use roomhub_types::{DeviceKind, DeviceSpec, DeviceValue, DeviceValues};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_arm_and_disarm_without_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("commands.log");
        let hub = Hub::new(
            HubConfig::default(),
            IdentityStore::in_memory(),
            AuditLog::open(&log_path).unwrap(),
        );

        let outcome = hub.alarm().arm(&hub).await.unwrap();
        assert!(matches!(outcome, Outcome::Applied(ref r) if r.outcomes.is_empty()));
        assert_eq!(hub.alarm().status().await, AlarmStatus::Armed);

        hub.alarm().disarm(&hub).await.unwrap();
        assert_eq!(hub.alarm().status().await, AlarmStatus::Disarmed);

        let log = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Central, alarm_system on, "));
        assert!(lines[1].starts_with("Central, alarm_bell off alarm_system off, "));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(Hub::new(
            HubConfig {
                watch_interval_ms: 10,
                ..HubConfig::default()
            },
            IdentityStore::in_memory(),
            AuditLog::open(dir.path().join("commands.log")).unwrap(),
        ));

        let watch = tokio::spawn(run_trigger_watch(hub.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        hub.shutdown().await;

        tokio::time::timeout(std::time::Duration::from_secs(1), watch)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_disarm_waits_for_watch_pass_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("commands.log");
        let hub = Arc::new(Hub::new(
            HubConfig::default(),
            IdentityStore::in_memory(),
            AuditLog::open(&log_path).unwrap(),
        ));

        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(RoomSession::new(
            "10.0.0.1:4000".parse().unwrap(),
            tx,
            Duration::from_secs(1),
        ));
        let data = RegisterData::new(
            "Lab",
            [DeviceSpec::new(tags::DOOR_SENSOR, "Door", DeviceKind::BinaryInput)],
        );
        let room = hub.registry().register(data, session).await.unwrap();

        hub.alarm().arm(&hub).await.unwrap();
        room.apply(&DeviceValues::from([(
            tags::DOOR_SENSOR.to_string(),
            DeviceValue::Level(1),
        )]))
        .await;

        let latch = hub.alarm().latch.lock().await;
        let watch = tokio::spawn({
            let hub = hub.clone();
            async move { hub.alarm().check_triggers(&hub).await }
        });
        tokio::task::yield_now().await;
        let disarm = tokio::spawn({
            let hub = hub.clone();
            async move { hub.alarm().disarm(&hub).await }
        });
        tokio::task::yield_now().await;

        // The queued disarm has not touched the state yet.
        assert_eq!(hub.alarm().status().await, AlarmStatus::Armed);
        drop(latch);

        let triggers = watch.await.unwrap().unwrap();
        disarm.await.unwrap().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Intrusion);
        assert_eq!(hub.alarm().status().await, AlarmStatus::Disarmed);

        let log = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Room 1, alarm_bell on door_sensor on, "));
        assert!(lines[2].starts_with("Central, alarm_bell off alarm_system off, "));

        // Door still open, but disarmed: nothing fires.
        assert!(hub.alarm().check_triggers(&hub).await.unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_watch_pass_reports_log_failure() {
        // Every write to /dev/full fails with ENOSPC.
        let hub = Hub::new(
            HubConfig::default(),
            IdentityStore::in_memory(),
            AuditLog::open("/dev/full").unwrap(),
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(RoomSession::new(
            "10.0.0.1:4000".parse().unwrap(),
            tx,
            Duration::from_secs(1),
        ));
        let data = RegisterData::new(
            "Lab",
            [DeviceSpec::new(tags::SMOKE_SENSOR, "Smoke", DeviceKind::BinaryInput)],
        );
        let room = hub.registry().register(data, session).await.unwrap();
        room.apply(&DeviceValues::from([(
            tags::SMOKE_SENSOR.to_string(),
            DeviceValue::Level(1),
        )]))
        .await;

        let result = hub.alarm().check_triggers(&hub).await;
        assert!(matches!(result, Err(DispatchError::Persistence(_))));
    }
}
