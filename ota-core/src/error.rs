// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Errors produced by the update core.
///
/// Every variant funnels back into one of two recoveries: "wait for a new
/// image" or "reset and retry". None of them halts the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The external staging flash failed to read.
    StagingRead,
    /// The external staging flash failed to erase or program.
    StagingWrite,
    /// The internal application flash failed to read.
    AppRead,
    /// The internal application flash failed to erase before programming.
    Erase,
    /// Programming a word of the application flash failed outright.
    Program { offset: u32 },
    /// Read-back after programming a word did not match what was written.
    /// Window content beyond this offset is undefined.
    Verify { offset: u32 },
    /// The decrypted header announces a size the application window cannot
    /// hold (or zero). The usual symptom of a wrong key or corrupt staging.
    ImageTooLarge { size: u32 },
    /// The staged image ended before the announced application size.
    ImageTruncated,
    /// The image transfer failed or delivered no data.
    Transfer,
    /// The persisted state store could not be read or written.
    StateStore,
    /// No valid application vector table at the boot address.
    NoValidApp,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StagingRead => write!(f, "staging flash read failed"),
            Self::StagingWrite => write!(f, "staging flash erase/program failed"),
            Self::AppRead => write!(f, "application flash read failed"),
            Self::Erase => write!(f, "application flash erase failed"),
            Self::Program { offset } => {
                write!(f, "application flash program failed at {offset:#x}")
            }
            Self::Verify { offset } => {
                write!(f, "read-back mismatch at {offset:#x}")
            }
            Self::ImageTooLarge { size } => {
                write!(f, "image size {size:#x} exceeds the application window")
            }
            Self::ImageTruncated => write!(f, "staged image shorter than announced"),
            Self::Transfer => write!(f, "image transfer failed"),
            Self::StateStore => write!(f, "persisted state store unreachable"),
            Self::NoValidApp => write!(f, "no valid application vector table"),
        }
    }
}
