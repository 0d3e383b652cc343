// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::Error;
use consts::{APP_SIZE_OFFSET, STAGED_SIZE_OFFSET, STATE_OFFSET};

/// Persisted byte store (EEPROM class) backing the OTA state fields.
pub trait NvStore {
    type Error;

    fn read_bytes(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error>;
}

/// Where the update process is, durably.
///
/// The single source of truth across resets: each boot re-reads this value
/// and nothing else. Every transition that precedes a destructive flash
/// operation is written before that operation begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OtaState {
    /// No update in progress; boot the application if one is present.
    NoUpdate = 0x00,
    /// A transfer was started and may be incomplete.
    Downloading = 0x01,
    /// An encrypted image is fully staged in external flash.
    DownloadComplete = 0x02,
    /// A new application was committed and must prove itself on first boot.
    FirstCheckStart = 0x03,
    /// The first boot is in flight; seen again only after a watchdog reset.
    FirstChecking = 0x04,
}

impl From<u8> for OtaState {
    /// Unknown bytes (a blank store reads 0xFF) decode to `NoUpdate`.
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Downloading,
            0x02 => Self::DownloadComplete,
            0x03 => Self::FirstCheckStart,
            0x04 => Self::FirstChecking,
            _ => Self::NoUpdate,
        }
    }
}

/// Typed access to the persisted state layout.
pub struct PersistedState<S> {
    store: S,
}

impl<S: NvStore> PersistedState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn state(&mut self) -> Result<OtaState, Error> {
        let mut b = [0u8; 1];
        self.store
            .read_bytes(STATE_OFFSET, &mut b)
            .map_err(|_| Error::StateStore)?;
        Ok(OtaState::from(b[0]))
    }

    /// Durably record a transition.
    pub fn set_state(&mut self, state: OtaState) -> Result<(), Error> {
        self.store
            .write_bytes(STATE_OFFSET, &[state as u8])
            .map_err(|_| Error::StateStore)
    }

    /// Total encrypted bytes staged in the landing region, header included.
    pub fn staged_size(&mut self) -> Result<u32, Error> {
        self.read_u32(STAGED_SIZE_OFFSET)
    }

    pub fn set_staged_size(&mut self, size: u32) -> Result<(), Error> {
        self.write_u32(STAGED_SIZE_OFFSET, size)
    }

    /// Size of the currently-running application, used to size its backup.
    pub fn app_size(&mut self) -> Result<u32, Error> {
        self.read_u32(APP_SIZE_OFFSET)
    }

    pub fn set_app_size(&mut self, size: u32) -> Result<(), Error> {
        self.write_u32(APP_SIZE_OFFSET, size)
    }

    fn read_u32(&mut self, offset: u32) -> Result<u32, Error> {
        let mut b = [0u8; 4];
        self.store
            .read_bytes(offset, &mut b)
            .map_err(|_| Error::StateStore)?;
        Ok(u32::from_le_bytes(b))
    }

    fn write_u32(&mut self, offset: u32, value: u32) -> Result<(), Error> {
        self.store
            .write_bytes(offset, &value.to_le_bytes())
            .map_err(|_| Error::StateStore)
    }
}
