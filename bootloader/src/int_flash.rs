// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Internal flash adapter for the verified commit path.
//!
//! The STM32F4 bank has non-uniform erase sectors (4 x 16 KiB, 1 x 64 KiB,
//! then 128 KiB). The committer works in uniform 16 KiB erase units and this
//! adapter widens each erase range to the end of the physical sector it
//! lands in, which is always legal inside the application window.

use embassy_stm32::flash::{Blocking, Error as FlashError, Flash, FLASH_SIZE};
use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};

pub struct AppFlash {
    flash: Flash<'static, Blocking>,
}

impl AppFlash {
    pub fn new(flash: Flash<'static, Blocking>) -> Self {
        Self { flash }
    }
}

/// End of the physical erase sector at or after `addr`.
fn sector_end(addr: u32) -> u32 {
    if addr <= 0x1_0000 {
        (addr + 0x3FFF) & !0x3FFF
    } else if addr <= 0x2_0000 {
        0x2_0000
    } else {
        (addr + 0x1_FFFF) & !0x1_FFFF
    }
}

impl ErrorType for AppFlash {
    type Error = FlashError;
}

impl ReadNorFlash for AppFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        self.flash.blocking_read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}

impl NorFlash for AppFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 0x4000;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        self.flash.blocking_erase(from, sector_end(to))
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        self.flash.blocking_write(offset, bytes)
    }
}
