//! BCM GPIO pin bank on the Raspberry Pi, built on `rppal`.

use std::collections::HashMap;

use rppal::gpio::{Gpio, OutputPin};
use tankos_types::{Backend, TankError};
use tracing::info;

use crate::motor::{Level, PinBank};

fn gpio_fault(pin: Option<u8>, e: rppal::gpio::Error) -> TankError {
    TankError::HardwareFault {
        component: pin.map_or_else(|| "gpio".to_string(), |p| format!("gpio{p}")),
        details: e.to_string(),
    }
}

/// Output lines claimed from `/dev/gpiomem`.
pub struct GpioPinBank {
    outputs: HashMap<u8, OutputPin>,
}

impl GpioPinBank {
    /// Claim every pin in `pins` as an output, driven low.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::HardwareFault`] if the GPIO peripheral cannot be
    /// opened or a pin is already in use.
    pub fn open(pins: &[u8]) -> Result<Self, TankError> {
        let gpio = Gpio::new().map_err(|e| gpio_fault(None, e))?;
        let mut outputs = HashMap::with_capacity(pins.len());
        for &pin in pins {
            let mut output = gpio
                .get(pin)
                .map_err(|e| gpio_fault(Some(pin), e))?
                .into_output();
            output.set_low();
            outputs.insert(pin, output);
        }
        info!(?pins, "gpio outputs claimed");
        Ok(Self { outputs })
    }
}

impl PinBank for GpioPinBank {
    fn backend(&self) -> Backend {
        Backend::Real
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), TankError> {
        let output = self
            .outputs
            .get_mut(&pin)
            .ok_or_else(|| TankError::HardwareFault {
                component: format!("gpio{pin}"),
                details: "pin was not claimed as an output".to_string(),
            })?;
        match level {
            Level::High => output.set_high(),
            Level::Low => output.set_low(),
        }
        Ok(())
    }
}
