//! Config validation - warns about unknown fields

use serde_json::Value;
use tracing::warn;

const KNOWN_FIELDS: &[&str] = &[
    "bind",
    "commandTimeoutMs",
    "registrationTimeoutMs",
    "watchIntervalMs",
    "buzzerTag",
    "identityFile",
    "auditLogFile",
];

/// Warn about top-level fields `HubConfig` doesn't know. Returns them for tests.
pub fn warn_unknown_fields(content: &str, config_name: &str) -> Vec<String> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let unknowns: Vec<String> = obj
        .keys()
        .filter(|key| !KNOWN_FIELDS.contains(&key.as_str()))
        .cloned()
        .collect();

    for key in &unknowns {
        warn!("Unknown config field in {config_name}: {key}");
    }
    unknowns
}
