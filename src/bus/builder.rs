use crate::constants::{DEFAULT_DEVICE_NUM, MAX_DEVICE_NUM, MIN_DEVICE_NUM};
use crate::line::{Delay, Pins, Port};
use crate::{Bus, Error};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Bus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// The device number this device answers to on the bus
    pub device_number: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device_number: DEFAULT_DEVICE_NUM,
        }
    }
}

/// A builder pattern for creating [`Bus`] instances from a set of [`Pins`]
/// and a [`Delay`] source.
///
/// # Examples
///
/// ## A simple example
///
/// ```
/// use iec_device::BusBuilder;
/// use iec_device::line::sim::SimBus;
///
/// // Builds a device 8 on a simulated bus
/// let sim = SimBus::new();
/// let bus = BusBuilder::new()
///     .build(sim.device_pins(), sim.clock())
///     .unwrap();
/// assert_eq!(bus.device_number(), 8);
/// ```
///
/// ## Choosing a device number
///
/// ```
/// use iec_device::BusBuilder;
/// use iec_device::line::sim::SimBus;
///
/// let sim = SimBus::new();
/// let bus = BusBuilder::new()
///     .device_number(9)
///     .build(sim.device_pins(), sim.clock())
///     .unwrap();
/// assert_eq!(bus.device_number(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BusBuilder {
    device_number: Option<u8>,
}

impl BusBuilder {
    /// Creates a new [`BusBuilder`] instance with default values.
    ///
    /// # Returns
    /// * [`BusBuilder`] - new builder instance with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and returns a new [`Bus`] instance using the configured
    /// parameters.  All lines are released before the [`Bus`] is returned.
    ///
    /// # Args:
    /// * pins - access to the bus wires
    /// * delay - the microsecond delay source
    ///
    /// # Returns
    /// * `Ok(Bus)` - the constructed Bus instance if successful
    /// * `Err(Error::Args)` - if the device number is out of range
    ///
    /// # Notes:
    /// Uses [`DEFAULT_DEVICE_NUM`] if no device number was set
    pub fn build<P: Pins, D: Delay>(&mut self, pins: P, delay: D) -> Result<Bus<P, D>, Error> {
        let device_number = self.device_number.unwrap_or(DEFAULT_DEVICE_NUM);
        Self::validate(device_number)?;

        trace!("Creating bus for device {device_number}");
        Ok(Bus::new(Port::new(pins, delay), device_number))
    }

    /// Sets the device number to answer to.
    ///
    /// # Args:
    /// * device_number - between [`MIN_DEVICE_NUM`] and [`MAX_DEVICE_NUM`]
    ///
    /// # Returns
    /// * `&mut Self` - builder instance for method chaining
    ///
    /// # Note:
    /// The device number is checked by [`BusBuilder::build`], not here
    pub fn device_number(&mut self, device_number: u8) -> &mut Self {
        self.device_number = Some(device_number);
        self
    }

    /// Takes settings from a [`BusConfig`], overriding anything already set
    pub fn config(&mut self, config: &BusConfig) -> &mut Self {
        self.device_number(config.device_number)
    }

    fn validate(device_number: u8) -> Result<(), Error> {
        trace!("BusBuilder::validate: device {device_number}");

        if device_number < MIN_DEVICE_NUM {
            trace!("Device {device_number} below minimum {MIN_DEVICE_NUM}");
            Err(Error::Args {
                message: format!(
                    "Device number {device_number} is less than minimum {MIN_DEVICE_NUM}"
                ),
            })
        } else if device_number > MAX_DEVICE_NUM {
            trace!("Device {device_number} above maximum {MAX_DEVICE_NUM}");
            Err(Error::Args {
                message: format!(
                    "Device number {device_number} is greater than maximum {MAX_DEVICE_NUM}"
                ),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::sim::SimBus;
    use crate::line::{Level, Line};

    #[test]
    fn test_default_device() {
        let sim = SimBus::new();
        let bus = BusBuilder::new()
            .build(sim.device_pins(), sim.clock())
            .unwrap();
        assert_eq!(bus.device_number(), DEFAULT_DEVICE_NUM);
        assert_eq!(sim.level(Line::Clock), Level::Released);
        assert_eq!(sim.level(Line::Data), Level::Released);
    }

    #[test]
    fn test_config() {
        let sim = SimBus::new();
        let config = BusConfig { device_number: 11 };
        let bus = BusBuilder::new()
            .config(&config)
            .build(sim.device_pins(), sim.clock())
            .unwrap();
        assert_eq!(bus.device_number(), 11);
    }

    #[test]
    fn test_device_number_range() {
        let sim = SimBus::new();
        for (device, ok) in [(3, false), (4, true), (30, true), (31, false)] {
            let result = BusBuilder::new()
                .device_number(device)
                .build(sim.device_pins(), sim.clock());
            assert_eq!(result.is_ok(), ok, "device {device}");
        }

        let err = BusBuilder::new()
            .device_number(31)
            .build(sim.device_pins(), sim.clock())
            .unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
    }
}
