//! Append-only command log.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use roomhub_types::ActionSet;
use tracing::debug;

use crate::{Error, Result};

/// One applied action set.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub scope_label: String,
    pub actions: BTreeMap<String, String>,
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    #[must_use]
    pub fn new(scope_label: impl Into<String>, actions: &ActionSet) -> Self {
        Self {
            scope_label: scope_label.into(),
            actions: actions
                .iter()
                .map(|(tag, action)| (tag.clone(), action.to_string()))
                .collect(),
            timestamp: Local::now(),
        }
    }

    /// Add an extra `tag value` pair, such as the sensor behind a trigger.
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.actions.insert(tag.into(), value.into());
        self
    }

    /// `{place}, {tag action ...}, {timestamp}`
    #[must_use]
    pub fn to_line(&self) -> String {
        let actions: Vec<String> = self
            .actions
            .iter()
            .map(|(tag, action)| format!("{tag} {action}"))
            .collect();
        format!(
            "{}, {}, {}",
            self.scope_label,
            actions.join(" "),
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Single-writer append-only log file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) the log for appending.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if the file or its directory cannot be
    /// created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::persistence(&path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::persistence(&path, e))?;

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry; it is on disk when this returns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if writing or syncing fails.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = entry.to_line();
        let mut file = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        writeln!(file, "{line}")
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|e| Error::persistence(&self.path, e))?;

        debug!("Audit: {}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_types::Action;

    #[test]
    fn test_line_shape() {
        let actions = ActionSet::from([
            ("lamp1".to_string(), Action::On),
            ("lamp2".to_string(), Action::Off),
        ]);
        let line = LogEntry::new("Room 1", &actions).to_line();

        assert!(line.starts_with("Room 1, lamp1 on lamp2 off, "));
        assert_eq!(line.split(", ").count(), 3);
    }

    #[test]
    fn test_with_adds_trigger_sensor() {
        let actions = ActionSet::from([("alarm_bell".to_string(), Action::On)]);
        let entry = LogEntry::new("Room 3", &actions).with("smoke_sensor", "on");

        assert!(entry.to_line().contains("alarm_bell on smoke_sensor on"));
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("commands.log");
        let log = AuditLog::open(&path).unwrap();

        for room in 1..=3 {
            let actions = ActionSet::from([("lamp1".to_string(), Action::On)]);
            log.append(&LogEntry::new(format!("Room {room}"), &actions))
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let places: Vec<&str> = content
            .lines()
            .map(|l| l.split(", ").next().unwrap())
            .collect();
        assert_eq!(places, vec!["Room 1", "Room 2", "Room 3"]);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.log");
        let actions = ActionSet::from([("lamp1".to_string(), Action::Off)]);

        AuditLog::open(&path)
            .unwrap()
            .append(&LogEntry::new("Central", &actions))
            .unwrap();
        AuditLog::open(&path)
            .unwrap()
            .append(&LogEntry::new("Central", &actions))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = AuditLog::open(dir.path());
        assert!(matches!(result, Err(Error::Persistence { .. })));
    }
}
