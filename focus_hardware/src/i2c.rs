//! Zoom-lens controller on I2C (Arducam PTZ style register map).
//!
//! Registers are 16-bit words transmitted big-endian, hence the `_swapped`
//! SMBus calls.
use std::time::Duration;

use focus_traits::Focuser;
use rppal::i2c::I2c;

use crate::error::{HwError, Result};
use crate::util::wait_until_idle;

const REG_ZOOM: u8 = 0x00;
const REG_FOCUS: u8 = 0x01;
const REG_BUSY: u8 = 0x04;

fn bus_err(e: rppal::i2c::Error) -> HwError {
    HwError::Bus(e.to_string())
}

pub struct I2cFocuser {
    i2c: I2c,
    range: (i32, i32),
}

impl I2cFocuser {
    pub fn new(bus: u8, addr: u16, range: (i32, i32)) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(bus_err)?;
        i2c.set_slave_address(addr).map_err(bus_err)?;
        tracing::info!(bus, addr = format_args!("{addr:#04x}"), ?range, "i2c focuser opened");
        Ok(Self { i2c, range })
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16> {
        self.i2c.smbus_read_word_swapped(reg).map_err(bus_err)
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<()> {
        tracing::trace!(reg, value, "i2c write");
        self.i2c.smbus_write_word_swapped(reg, value).map_err(bus_err)
    }

    /// Current zoom step as reported by the controller.
    pub fn zoom(&mut self) -> Result<u32> {
        self.read_reg(REG_ZOOM).map(u32::from)
    }

    fn is_busy(&mut self) -> Result<bool> {
        Ok(self.read_reg(REG_BUSY)? & 0x01 != 0)
    }

    fn write_focus(&mut self, position: i32) -> Result<()> {
        let (min, max) = self.range;
        if !(min..=max).contains(&position) {
            return Err(HwError::OutOfRange { position, min, max });
        }
        let value = u16::try_from(position).map_err(|_| HwError::OutOfRange {
            position,
            min,
            max,
        })?;
        self.write_reg(REG_FOCUS, value)
    }

    /// Move to `position` and block until the controller reports idle.
    ///
    /// Backs the `park` command; the autofocus loop uses the non-blocking
    /// `Focuser::set`.
    pub fn park(&mut self, position: i32, timeout: Duration) -> Result<()> {
        self.write_focus(position)?;
        wait_until_idle(|| self.is_busy(), timeout, Duration::from_millis(2))
    }
}

impl Focuser for I2cFocuser {
    fn get(&mut self) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(i32::from(self.read_reg(REG_FOCUS)?))
    }

    fn set(
        &mut self,
        position: i32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_focus(position).map_err(|e| {
            tracing::error!(position, error = %e, "i2c focus write failed");
            e.into()
        })
    }

    fn range(&self) -> (i32, i32) {
        self.range
    }
}
