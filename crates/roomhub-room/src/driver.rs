//! Device access for a room controller.

use std::collections::BTreeMap;

use roomhub_types::{
    Action, DeviceKind, DeviceSpec, DeviceValue, DeviceValues, SensorReading, tags,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("{0} is not an output")]
    NotAnOutput(String),

    #[error("{tag} does not take that value (kind {kind})")]
    InvalidValue { tag: String, kind: DeviceKind },
}

/// Hardware behind the room's declared devices.
pub trait DeviceDriver {
    /// Devices this driver controls, as declared at registration.
    fn devices(&self) -> Vec<DeviceSpec>;

    /// Level of a binary input, or `None` if `tag` is not one.
    fn read_input(&self, tag: &str) -> Option<i64>;

    /// Drive a binary output and return the level it now reads.
    ///
    /// # Errors
    ///
    /// Returns an error if `tag` is unknown or not an output.
    fn write_output(&mut self, tag: &str, action: Action) -> Result<i64, DriverError>;

    /// Latest reading of a composite sensor, or `None` if `tag` is not one.
    fn read_sensor(&self, tag: &str) -> Option<SensorReading>;
}

/// In-memory devices for simulation and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    specs: BTreeMap<String, DeviceSpec>,
    values: DeviceValues,
}

impl MemoryDriver {
    #[must_use]
    pub fn new(specs: impl IntoIterator<Item = DeviceSpec>) -> Self {
        let mut driver = Self::default();
        for spec in specs {
            driver
                .values
                .insert(spec.tag.clone(), spec.kind.initial_value());
            driver.specs.insert(spec.tag.clone(), spec);
        }
        driver
    }

    /// A fully equipped classroom with a comfortable climate reading.
    #[must_use]
    pub fn default_room() -> Self {
        let output = |tag: &str, name: &str| DeviceSpec::new(tag, name, DeviceKind::BinaryOutput);
        let input = |tag: &str, name: &str| DeviceSpec::new(tag, name, DeviceKind::BinaryInput);

        let mut driver = Self::new([
            output(tags::LAMP_1, "Lamp 1"),
            output(tags::LAMP_2, "Lamp 2"),
            output(tags::AIR_CONDITIONER, "Air conditioner"),
            output(tags::PROJECTOR, "Projector"),
            output(tags::ALARM_SYSTEM, "Alarm system"),
            output(tags::BUZZER, "Buzzer"),
            input(tags::PRESENCE_SENSOR, "Presence sensor"),
            input(tags::SMOKE_SENSOR, "Smoke sensor"),
            input(tags::WINDOW_SENSOR, "Window sensor"),
            input(tags::DOOR_SENSOR, "Door sensor"),
            input(tags::PEOPLE_COUNT, "People"),
            DeviceSpec::new(
                tags::TEMPERATURE_HUMIDITY,
                "Temperature and humidity",
                DeviceKind::CompositeSensor,
            ),
        ]);
        driver.values.insert(
            tags::TEMPERATURE_HUMIDITY.to_string(),
            DeviceValue::Reading(SensorReading {
                temperature: 22.0,
                humidity: 45.0,
            }),
        );
        driver
    }

    #[must_use]
    pub fn value(&self, tag: &str) -> Option<DeviceValue> {
        self.values.get(tag).copied()
    }

    #[must_use]
    pub fn values(&self) -> &DeviceValues {
        &self.values
    }

    /// Change a device as the physical world would: a person walks in, a
    /// window opens, someone flips a switch by hand.
    ///
    /// # Errors
    ///
    /// Returns an error if `tag` is unknown or `value` has the wrong shape.
    pub fn set(&mut self, tag: &str, value: DeviceValue) -> Result<(), DriverError> {
        let spec = self
            .specs
            .get(tag)
            .ok_or_else(|| DriverError::UnknownDevice(tag.to_string()))?;
        if !spec.kind.accepts(&value) {
            return Err(DriverError::InvalidValue {
                tag: tag.to_string(),
                kind: spec.kind,
            });
        }
        self.values.insert(tag.to_string(), value);
        Ok(())
    }

    fn kind(&self, tag: &str) -> Option<DeviceKind> {
        self.specs.get(tag).map(|spec| spec.kind)
    }
}

impl DeviceDriver for MemoryDriver {
    fn devices(&self) -> Vec<DeviceSpec> {
        self.specs.values().cloned().collect()
    }

    fn read_input(&self, tag: &str) -> Option<i64> {
        match self.kind(tag)? {
            DeviceKind::BinaryInput => self.values.get(tag)?.level(),
            _ => None,
        }
    }

    fn write_output(&mut self, tag: &str, action: Action) -> Result<i64, DriverError> {
        match self.kind(tag) {
            Some(DeviceKind::BinaryOutput) => {
                self.values
                    .insert(tag.to_string(), DeviceValue::Level(action.level()));
                Ok(action.level())
            }
            Some(_) => Err(DriverError::NotAnOutput(tag.to_string())),
            None => Err(DriverError::UnknownDevice(tag.to_string())),
        }
    }

    fn read_sensor(&self, tag: &str) -> Option<SensorReading> {
        match self.values.get(tag)? {
            DeviceValue::Reading(reading) => Some(*reading),
            DeviceValue::Level(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_room_declares_every_device() {
        let driver = MemoryDriver::default_room();
        let devices = driver.devices();
        assert_eq!(devices.len(), 12);
        assert!(devices.iter().any(|d| d.tag == tags::BUZZER));
        assert_eq!(
            driver.read_sensor(tags::TEMPERATURE_HUMIDITY),
            Some(SensorReading {
                temperature: 22.0,
                humidity: 45.0
            })
        );
    }

    #[test]
    fn test_write_output() {
        let mut driver = MemoryDriver::default_room();
        assert_eq!(driver.write_output(tags::LAMP_1, Action::On), Ok(1));
        assert_eq!(driver.value(tags::LAMP_1), Some(DeviceValue::Level(1)));

        // Off twice leaves it off.
        assert_eq!(driver.write_output(tags::LAMP_1, Action::Off), Ok(0));
        assert_eq!(driver.write_output(tags::LAMP_1, Action::Off), Ok(0));
        assert_eq!(driver.value(tags::LAMP_1), Some(DeviceValue::Level(0)));
    }

    #[test]
    fn test_write_output_rejects_inputs_and_unknown_tags() {
        let mut driver = MemoryDriver::default_room();
        assert_eq!(
            driver.write_output(tags::DOOR_SENSOR, Action::On),
            Err(DriverError::NotAnOutput(tags::DOOR_SENSOR.to_string()))
        );
        assert_eq!(
            driver.write_output("lamp9", Action::On),
            Err(DriverError::UnknownDevice("lamp9".to_string()))
        );
    }

    #[test]
    fn test_set_and_read_input() {
        let mut driver = MemoryDriver::default_room();
        assert_eq!(driver.read_input(tags::PEOPLE_COUNT), Some(0));

        driver.set(tags::PEOPLE_COUNT, DeviceValue::Level(17)).unwrap();
        assert_eq!(driver.read_input(tags::PEOPLE_COUNT), Some(17));
        assert_eq!(driver.read_input(tags::LAMP_1), None);
    }

    #[test]
    fn test_set_checks_shape() {
        let mut driver = MemoryDriver::default_room();
        assert!(matches!(
            driver.set(tags::TEMPERATURE_HUMIDITY, DeviceValue::Level(1)),
            Err(DriverError::InvalidValue { .. })
        ));
        assert!(matches!(
            driver.set("nope", DeviceValue::Level(1)),
            Err(DriverError::UnknownDevice(_))
        ));
    }
}
