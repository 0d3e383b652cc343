// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Memory-layout and update-process constants shared between the bootloader,
//! the update core and the host-side image packager.

#![no_std]

/// Base address of the internal flash device.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Offset of the application window within internal flash.
/// The bootloader occupies the two 16 KiB sectors below it, so the
/// application vector table sits at `FLASH_BASE + APP_OFFSET` = 0x0800_8000.
pub const APP_OFFSET: u32 = 0x8000;

/// Absolute address of the application vector table.
pub const APP_ADDRESS: u32 = FLASH_BASE + APP_OFFSET;

/// Capacity of the application window in bytes.
/// Two 16 KiB sectors plus the 64 KiB sector, ending on the 128 KiB
/// boundary. Update images announcing a larger size are rejected before any
/// flash is touched.
pub const MAX_APP_SIZE: u32 = 0x1_8000;

/// Offset of the 48-byte provisioning block inside the bootloader partition:
/// the 32-byte AES-256 update key followed by the 16-byte CBC IV.
/// Written once during manufacturing; an unprovisioned device reads all 0xFF
/// here and cannot decrypt update images.
pub const PROVISION_OFFSET: u32 = 0x7FC0;

/// Absolute address of the provisioning block.
pub const PROVISION_ADDRESS: u32 = FLASH_BASE + PROVISION_OFFSET;

/// Erase-sector size of the external staging flash (W25Q64 class).
/// One sector is 16 program pages and is the unit buffered in RAM by the
/// region store before being programmed.
pub const EXT_SECTOR_SIZE: usize = 4096;

/// Program-page size of the external staging flash.
pub const EXT_PAGE_SIZE: usize = 256;

/// Size of each staging region in external flash.
/// Region `n` starts at byte offset `n * REGION_SIZE`; two regions are used,
/// one for the incoming encrypted image / previous-app backup and one for the
/// decrypted image awaiting commit.
pub const REGION_SIZE: u32 = 0x2_0000;

/// Persisted byte-store offset of the one-byte OTA state value.
pub const STATE_OFFSET: u32 = 0x00;

/// Persisted byte-store offset of the staged image size (4 bytes,
/// little-endian): the total encrypted byte count written to the staging
/// region, header block included.
pub const STAGED_SIZE_OFFSET: u32 = 0x01;

/// Persisted byte-store offset of the currently-running application size
/// (4 bytes, little-endian), consulted when backing the application up
/// before a commit.
pub const APP_SIZE_OFFSET: u32 = 0x05;

/// How long a freshly committed application gets to confirm itself before
/// the independent watchdog forces a reset back into the bootloader.
pub const WATCHDOG_TIMEOUT_MS: u32 = 8_000;
