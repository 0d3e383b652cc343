// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::crypto::BLOCK_LEN;
use crate::Error;

/// First plaintext block of an update image.
///
/// Bytes 0..12 carry a free-form tag (the packager writes a version string,
/// zero-padded); bytes 12..16 the application size in bytes, little-endian.
/// The application binary follows, zero-padded to whole cipher blocks.
#[derive(Debug, Clone, Copy)]
pub struct ImageHeader {
    tag: [u8; Self::TAG_LEN],
    app_size: u32,
}

impl ImageHeader {
    pub const TAG_LEN: usize = 12;
    pub const SIZE_OFFSET: usize = 12;

    pub fn parse(block: &[u8; BLOCK_LEN]) -> Self {
        let mut tag = [0u8; Self::TAG_LEN];
        tag.copy_from_slice(&block[..Self::TAG_LEN]);
        let app_size =
            u32::from_le_bytes(block[Self::SIZE_OFFSET..].try_into().expect("4 bytes"));
        Self { tag, app_size }
    }

    /// The announced application size in bytes.
    pub fn app_size(&self) -> u32 {
        self.app_size
    }

    /// The free-form header tag.
    pub fn tag(&self) -> &[u8; Self::TAG_LEN] {
        &self.tag
    }

    /// Reject sizes the application window cannot hold, before any flash is
    /// touched. A wrong key or corrupted staging decrypts to a random size
    /// field and is caught here.
    pub fn checked_size(&self, max_app_size: u32) -> Result<u32, Error> {
        if self.app_size == 0 || self.app_size > max_app_size {
            return Err(Error::ImageTooLarge {
                size: self.app_size,
            });
        }
        Ok(self.app_size)
    }
}
