// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! W25Q64 SPI NOR flash, blocking, exposed through `embedded-storage`.

use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::SPI1;
use embassy_stm32::spi::{Error as SpiError, Spi};
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_READ_STATUS1: u8 = 0x05;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_SECTOR_ERASE: u8 = 0x20;
const CMD_READ_DATA: u8 = 0x03;
const STATUS_BUSY: u8 = 0x01;

const PAGE_SIZE: usize = 256;
const SECTOR_SIZE: usize = 4096;
/// W25Q64: 64 Mbit.
const CAPACITY: usize = 8 * 1024 * 1024;

pub struct W25q64 {
    spi: Spi<'static, SPI1, NoDma, NoDma>,
    cs: Output<'static, AnyPin>,
}

impl W25q64 {
    pub fn new(spi: Spi<'static, SPI1, NoDma, NoDma>, cs: Output<'static, AnyPin>) -> Self {
        Self { spi, cs }
    }

    fn command(&mut self, frame: &[u8]) -> Result<(), SpiError> {
        self.cs.set_low();
        let res = self.spi.blocking_write(frame);
        self.cs.set_high();
        res
    }

    fn write_enable(&mut self) -> Result<(), SpiError> {
        self.command(&[CMD_WRITE_ENABLE])
    }

    /// Poll the status register until the part finishes its program/erase
    /// cycle.
    fn wait_idle(&mut self) -> Result<(), SpiError> {
        loop {
            let mut frame = [CMD_READ_STATUS1, 0];
            self.cs.set_low();
            let res = self.spi.blocking_transfer_in_place(&mut frame);
            self.cs.set_high();
            res?;
            if frame[1] & STATUS_BUSY == 0 {
                return Ok(());
            }
        }
    }

    fn addr_bytes(offset: u32) -> [u8; 3] {
        [(offset >> 16) as u8, (offset >> 8) as u8, offset as u8]
    }
}

impl ErrorType for W25q64 {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for W25q64 {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), NorFlashErrorKind> {
        if offset as usize + bytes.len() > CAPACITY {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        let a = Self::addr_bytes(offset);
        self.cs.set_low();
        let mut res = self.spi.blocking_write(&[CMD_READ_DATA, a[0], a[1], a[2]]);
        if res.is_ok() {
            res = self.spi.blocking_read(bytes);
        }
        self.cs.set_high();
        res.map_err(|_| NorFlashErrorKind::Other)
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl NorFlash for W25q64 {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), NorFlashErrorKind> {
        if from % SECTOR_SIZE as u32 != 0 || to % SECTOR_SIZE as u32 != 0 || from > to {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if to as usize > CAPACITY {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        let mut addr = from;
        while addr < to {
            self.write_enable().map_err(|_| NorFlashErrorKind::Other)?;
            let a = Self::addr_bytes(addr);
            self.command(&[CMD_SECTOR_ERASE, a[0], a[1], a[2]])
                .map_err(|_| NorFlashErrorKind::Other)?;
            self.wait_idle().map_err(|_| NorFlashErrorKind::Other)?;
            addr += SECTOR_SIZE as u32;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), NorFlashErrorKind> {
        if offset as usize + bytes.len() > CAPACITY {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        let mut offset = offset;
        let mut bytes = bytes;
        while !bytes.is_empty() {
            // a program cycle must not cross a page boundary
            let room = PAGE_SIZE - offset as usize % PAGE_SIZE;
            let take = room.min(bytes.len());
            self.write_enable().map_err(|_| NorFlashErrorKind::Other)?;
            let a = Self::addr_bytes(offset);
            self.cs.set_low();
            let mut res = self.spi.blocking_write(&[CMD_PAGE_PROGRAM, a[0], a[1], a[2]]);
            if res.is_ok() {
                res = self.spi.blocking_write(&bytes[..take]);
            }
            self.cs.set_high();
            res.map_err(|_| NorFlashErrorKind::Other)?;
            self.wait_idle().map_err(|_| NorFlashErrorKind::Other)?;
            offset += take as u32;
            bytes = &bytes[take..];
        }
        Ok(())
    }
}
