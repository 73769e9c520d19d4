//! MCP4461 quad digital potentiometer (I2C)
//!
//! Four 257-step wipers, each with a volatile register (the live position)
//! and a non-volatile EEPROM register loaded at power-up.
//!
//! # Command Format
//!
//! Every command starts with one byte:
//! - Bits 7-4: memory address
//! - Bits 3-2: command (00 = write, 11 = read)
//! - Bits 1-0: data bits 9-8
//!
//! A write sends one more byte with data bits 7-0. A read returns two bytes,
//! the 9-bit value right-aligned across them.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use kiln_core::traits::DigitalPot;

/// Default address with A0-A2 tied low
pub const DEFAULT_ADDRESS: u8 = 0x2C;

/// Address used by the expansion board
pub const EXPANSION_ADDRESS: u8 = 0x2E;

/// Full-scale wiper position
pub const FULL_SCALE: u16 = 0x100;

/// EEPROM write cycle time (datasheet max)
const EEPROM_WRITE_MS: u32 = 10;

/// Memory addresses
pub mod reg {
    /// Volatile wiper registers, W0-W3
    pub const VOLATILE: [u8; 4] = [0x00, 0x01, 0x06, 0x07];
    /// Non-volatile wiper registers, W0-W3
    pub const NON_VOLATILE: [u8; 4] = [0x02, 0x03, 0x08, 0x09];
}

const CMD_WRITE: u8 = 0b00 << 2;
const CMD_READ: u8 = 0b11 << 2;

/// MCP4461 errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mcp4461Error<E> {
    /// I2C transfer failed
    Bus(E),
    /// Wiper index above 3
    InvalidWiper,
}

/// Build the two-byte write command for `register`
pub fn write_command(register: u8, value: u16) -> [u8; 2] {
    let value = value.min(FULL_SCALE);
    [
        (register << 4) | CMD_WRITE | ((value >> 8) as u8 & 0x03),
        value as u8,
    ]
}

/// Build the read command for `register`
pub fn read_command(register: u8) -> u8 {
    (register << 4) | CMD_READ
}

/// Extract the 9-bit wiper value from a read response
pub fn parse_read_response(response: [u8; 2]) -> u16 {
    ((response[0] as u16 & 0x01) << 8) | response[1] as u16
}

/// MCP4461 on an I2C bus
pub struct Mcp4461<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Mcp4461<I2C, D> {
    /// Create a driver for the device at `address`
    ///
    /// `delay` waits out EEPROM write cycles.
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, delay, address }
    }

    /// Device address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Release the bus and delay
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn register(bank: &[u8; 4], wiper: u8) -> Result<u8, Mcp4461Error<I2C::Error>> {
        bank.get(wiper as usize)
            .copied()
            .ok_or(Mcp4461Error::InvalidWiper)
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<(), Mcp4461Error<I2C::Error>> {
        self.i2c
            .write(self.address, &write_command(register, value))
            .map_err(Mcp4461Error::Bus)
    }

    fn read_register(&mut self, register: u8) -> Result<u16, Mcp4461Error<I2C::Error>> {
        let mut response = [0u8; 2];
        self.i2c
            .write_read(self.address, &[read_command(register)], &mut response)
            .map_err(Mcp4461Error::Bus)?;
        Ok(parse_read_response(response))
    }

    /// Read the live position of `wiper`
    pub fn volatile_wiper(&mut self, wiper: u8) -> Result<u16, Mcp4461Error<I2C::Error>> {
        let register = Self::register(&reg::VOLATILE, wiper)?;
        self.read_register(register)
    }
}

impl<I2C: I2c, D: DelayNs> DigitalPot for Mcp4461<I2C, D> {
    type Error = Mcp4461Error<I2C::Error>;

    fn set_volatile_wiper(&mut self, wiper: u8, value: u16) -> Result<(), Self::Error> {
        let register = Self::register(&reg::VOLATILE, wiper)?;
        self.write_register(register, value)
    }

    fn set_non_volatile_wiper(&mut self, wiper: u8, value: u16) -> Result<(), Self::Error> {
        let register = Self::register(&reg::NON_VOLATILE, wiper)?;
        self.write_register(register, value)?;
        // The device NAKs everything until the EEPROM cycle ends
        self.delay.delay_ms(EEPROM_WRITE_MS);
        Ok(())
    }

    fn non_volatile_wiper(&mut self, wiper: u8) -> Result<u16, Self::Error> {
        let register = Self::register(&reg::NON_VOLATILE, wiper)?;
        self.read_register(register)
    }
}
