// /src/peripherals.rs
//! Collaborator interfaces the controller consumes.
//!
//! The modem TX link is any `embedded_io_async::Write`, and every delay goes
//! through `embedded_hal_async::delay::DelayNs`; the rest of the board is
//! described here.

use crate::error::NvmError;

/// Byte-addressable non-volatile storage.
pub trait Nvm {
    fn read_byte(&mut self, address: u16) -> Result<u8, NvmError>;
    fn write_byte(&mut self, address: u16, byte: u8) -> Result<(), NvmError>;
}

/// Character display, rows and columns counted from zero.
pub trait Display {
    fn clear(&mut self);
    fn write_at(&mut self, row: u8, col: u8, text: &str);
}

pub trait Buzzer {
    fn on(&mut self);
    fn off(&mut self);
}

/// Gas sensor with a digital threshold comparator and an analog channel.
pub trait CoSensor {
    /// State of the comparator pin; `true` above the threshold.
    fn threshold_exceeded(&mut self) -> bool;
    /// Current concentration estimate in parts per million.
    fn read_ppm(&mut self) -> u16;
}

/// Analog side of the gas sensor.
#[allow(async_fn_in_trait)]
pub trait GasSampler {
    /// Sensor resistance in load-resistor units, scaled by 100.
    async fn sample_resistance(&mut self) -> u32;
}

/// Which device the shared UART (and so the inbox) is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartRoute {
    Gsm,
    Gps,
}

/// Relay that switches the UART between the modem and the GPS receiver.
pub trait UartSwitch {
    fn route(&mut self, route: UartRoute);
}
