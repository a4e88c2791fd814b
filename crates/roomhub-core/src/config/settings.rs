use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    /// Address the room listener binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// How long a command waits for the room's response
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// How long a new connection has to send `register`
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_ms: u64,

    /// Trigger watch polling interval
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,

    /// Device tag driven by buzzer commands and alarm triggers
    #[serde(default = "default_buzzer_tag")]
    pub buzzer_tag: String,

    /// Overrides the identity map location in the data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,

    /// Overrides the command log location in the data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_file: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:10000".to_string()
}
fn default_command_timeout() -> u64 {
    5000
}
fn default_registration_timeout() -> u64 {
    10_000
}
fn default_watch_interval() -> u64 {
    500
}
fn default_buzzer_tag() -> String {
    roomhub_types::tags::BUZZER.to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            command_timeout_ms: default_command_timeout(),
            registration_timeout_ms: default_registration_timeout(),
            watch_interval_ms: default_watch_interval(),
            buzzer_tag: default_buzzer_tag(),
            identity_file: None,
            audit_log_file: None,
        }
    }
}

impl HubConfig {
    /// Load config from file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid JSON or
    /// sets a zero interval.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.watch_interval_ms == 0 {
            return Err(crate::Error::Config(
                "watchIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "commandTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    #[must_use]
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Identity map path, falling back to the data dir.
    #[must_use]
    pub fn identity_path(&self, dirs: &super::Directories) -> PathBuf {
        self.identity_file
            .clone()
            .unwrap_or_else(|| dirs.identity_file.clone())
    }

    /// Command log path, falling back to the data dir.
    #[must_use]
    pub fn audit_log_path(&self, dirs: &super::Directories) -> PathBuf {
        self.audit_log_file
            .clone()
            .unwrap_or_else(|| dirs.audit_log_file.clone())
    }
}
