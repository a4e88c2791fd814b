//! Per-room device store.
//!
//! Devices are keyed by tag. A device's kind is fixed when the room registers;
//! only its value changes afterwards.

use std::collections::BTreeMap;

use roomhub_types::{DeviceKind, DeviceSnapshot, DeviceSpec, DeviceValue, DeviceValues};
use tracing::warn;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    spec: DeviceSpec,
    value: DeviceValue,
}

impl Device {
    #[must_use]
    pub fn new(spec: DeviceSpec) -> Self {
        let value = spec.kind.initial_value();
        Self { spec, value }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.spec.tag
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.spec.kind
    }

    #[must_use]
    pub fn value(&self) -> DeviceValue {
        self.value
    }

    #[must_use]
    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    /// Replace the value, rejecting one whose shape doesn't match the kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidValue` on a shape mismatch.
    pub fn set_value(&mut self, value: DeviceValue) -> Result<()> {
        if !self.spec.kind.accepts(&value) {
            return Err(Error::InvalidValue {
                tag: self.spec.tag.clone(),
                kind: self.spec.kind,
            });
        }
        self.value = value;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            tag: self.spec.tag.clone(),
            name: self.spec.name.clone(),
            kind: self.spec.kind,
            value: self.value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStore {
    devices: BTreeMap<String, Device>,
}

impl DeviceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a room's declared devices. Devices are keyed by
    /// their own tag; a repeated tag keeps the last declaration.
    pub fn from_specs(specs: impl IntoIterator<Item = DeviceSpec>) -> Self {
        let devices = specs
            .into_iter()
            .map(|spec| (spec.tag.clone(), Device::new(spec)))
            .collect();
        Self { devices }
    }

    /// Look up a device.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceNotFound` if the room never declared `tag`.
    pub fn get(&self, tag: &str) -> Result<&Device> {
        self.devices
            .get(tag)
            .ok_or_else(|| Error::DeviceNotFound(tag.to_string()))
    }

    /// Current value of a device.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceNotFound` if the room never declared `tag`.
    pub fn value(&self, tag: &str) -> Result<DeviceValue> {
        self.get(tag).map(Device::value)
    }

    /// Set one device's value.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceNotFound` for an unknown tag and
    /// `Error::InvalidValue` on a shape mismatch.
    pub fn set(&mut self, tag: &str, value: DeviceValue) -> Result<()> {
        self.devices
            .get_mut(tag)
            .ok_or_else(|| Error::DeviceNotFound(tag.to_string()))?
            .set_value(value)
    }

    /// Apply a batch of reported values, device by device.
    ///
    /// Entries for unknown tags or with the wrong shape are skipped with a
    /// warning; the rest still apply. Returns how many were applied.
    pub fn apply(&mut self, values: &DeviceValues) -> usize {
        let mut applied = 0;
        for (tag, value) in values {
            match self.set(tag, *value) {
                Ok(()) => applied += 1,
                Err(e) => warn!("Skipping reported value for {}: {}", tag, e),
            }
        }
        applied
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.devices.contains_key(tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Re-serialize the store as the declarations it was built from.
    #[must_use]
    pub fn specs(&self) -> BTreeMap<String, DeviceSpec> {
        self.devices
            .iter()
            .map(|(tag, device)| (tag.clone(), device.spec().clone()))
            .collect()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.devices.values().map(Device::snapshot).collect()
    }
}
