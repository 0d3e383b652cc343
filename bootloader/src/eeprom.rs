// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! AT24C-class I2C EEPROM backing the persisted update state.

use embassy_stm32::dma::NoDma;
use embassy_stm32::i2c::{Error as I2cError, I2c};
use embassy_stm32::peripherals::I2C1;
use embassy_time::{block_for, Duration};
use ota_core::NvStore;

const DEVICE_ADDR: u8 = 0x50;
const PAGE_SIZE: usize = 32;
/// Datasheet worst-case self-timed write cycle.
const WRITE_CYCLE: Duration = Duration::from_millis(5);

pub struct Eeprom {
    i2c: I2c<'static, I2C1, NoDma, NoDma>,
}

impl Eeprom {
    pub fn new(i2c: I2c<'static, I2C1, NoDma, NoDma>) -> Self {
        Self { i2c }
    }
}

impl NvStore for Eeprom {
    type Error = I2cError;

    fn read_bytes(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), I2cError> {
        let addr = (offset as u16).to_be_bytes();
        self.i2c.blocking_write_read(DEVICE_ADDR, &addr, buf)
    }

    fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<(), I2cError> {
        let mut offset = offset as usize;
        let mut data = data;
        while !data.is_empty() {
            // a write cycle must not cross an EEPROM page boundary
            let room = PAGE_SIZE - offset % PAGE_SIZE;
            let take = room.min(data.len());
            let mut frame = [0u8; 2 + PAGE_SIZE];
            frame[..2].copy_from_slice(&(offset as u16).to_be_bytes());
            frame[2..2 + take].copy_from_slice(&data[..take]);
            self.i2c.blocking_write(DEVICE_ADDR, &frame[..2 + take])?;
            block_for(WRITE_CYCLE);
            offset += take;
            data = &data[take..];
        }
        Ok(())
    }
}
