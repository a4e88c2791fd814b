//! The hub aggregate shared by every task.

use roomhub_core::config::{Directories, HubConfig};
use roomhub_core::{AuditLog, IdentityStore, LogEntry};
use roomhub_types::HubSnapshot;
use tokio::sync::watch;
use tracing::{error, info};

use crate::alarm::AlarmCoordinator;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::CloseReason;

#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    registry: SessionRegistry,
    alarm: AlarmCoordinator,
    audit: AuditLog,
    snapshot_tx: watch::Sender<HubSnapshot>,
    shutdown_tx: watch::Sender<bool>,
}

impl Hub {
    #[must_use]
    pub fn new(config: HubConfig, identities: IdentityStore, audit: AuditLog) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(identities),
            alarm: AlarmCoordinator::new(),
            audit,
            snapshot_tx: watch::Sender::new(HubSnapshot::default()),
            shutdown_tx: watch::Sender::new(false),
        }
    }

    /// Build a hub from config, loading identities and opening the command
    /// log at their configured or default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity map is unreadable or the command
    /// log cannot be opened.
    pub fn open(config: HubConfig, dirs: &Directories) -> Result<Self> {
        let identity_path = config.identity_path(dirs);
        let audit_path = config.audit_log_path(dirs);

        let identities = IdentityStore::load(&identity_path)?;
        let audit = AuditLog::open(&audit_path)?;
        info!(
            "Identities: {}, command log: {}",
            identity_path.display(),
            audit_path.display()
        );

        Ok(Self::new(config, identities, audit))
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn alarm(&self) -> &AlarmCoordinator {
        &self.alarm
    }

    /// Append to the command log. Failures are logged and returned; they
    /// never take the hub down.
    ///
    /// # Errors
    ///
    /// Returns `roomhub_core::Error::Persistence` if the write fails.
    pub fn record(&self, entry: &LogEntry) -> roomhub_core::Result<()> {
        self.audit.append(entry).inspect_err(|e| {
            error!("Failed to record command: {}", e);
        })
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        let rooms = self.registry.snapshot().await;
        HubSnapshot::new(rooms, self.alarm.status().await)
    }

    /// Publish the current state to display subscribers.
    pub async fn publish_snapshot(&self) {
        let snapshot = self.snapshot().await;
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HubSnapshot> {
        self.snapshot_tx.subscribe()
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signal every loop to stop and release blocked callers.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Shutting down");
        self.registry.close_all(CloseReason::ShuttingDown).await;
    }
}

/// Resolves once `signal` reads true (or its sender is gone).
pub async fn wait_for_shutdown(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> (Hub, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("commands.log")).unwrap();
        (
            Hub::new(HubConfig::default(), IdentityStore::in_memory(), audit),
            dir,
        )
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let (hub, _dir) = hub();
        let snapshot = hub.snapshot().await;
        assert!(snapshot.rooms.is_empty());
        assert_eq!(snapshot.people_count, 0);
        assert!(!snapshot.alarm.is_armed());
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (hub, _dir) = hub();
        let mut signal = hub.shutdown_signal();
        assert!(!hub.is_shutting_down());

        hub.shutdown().await;
        hub.shutdown().await;

        wait_for_shutdown(&mut signal).await;
        assert!(hub.is_shutting_down());
    }

    #[test]
    fn test_open_uses_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = Directories::with_base(dir.path().join("default"));
        let config = HubConfig {
            audit_log_file: Some(dir.path().join("custom.log")),
            ..HubConfig::default()
        };

        Hub::open(config, &dirs).unwrap();
        assert!(dir.path().join("custom.log").exists());
    }
}
