// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Crash-safe OTA update core.
//!
//! Everything the bootloader does between reset and application handoff lives
//! here: staging an encrypted image stream into external flash, decrypting it
//! block by block into a second region, committing it to the internal
//! application window with per-word verification, and sequencing the whole
//! process through a persisted state machine that survives a reset at any
//! point.
//!
//! The crate is `no_std` and hardware-free. Flash devices enter through
//! `embedded_storage::nor_flash` traits; the persisted byte store, the image
//! transport, reset/watchdog control and the register-level application
//! handoff enter through the [`NvStore`], [`ImageTransport`], [`Platform`]
//! and [`Launcher`] traits, so the full update flow runs under test on a
//! host.

#![no_std]

mod committer;
mod crypto;
mod error;
mod image;
mod launch;
mod machine;
mod region;
mod state;


pub use committer::{CommitSource, FlashCommitter, RegionSource, SliceSource, WORD};
pub use crypto::{ImageCipher, BLOCK_LEN, KEY_LEN};
pub use error::Error;
pub use image::ImageHeader;
pub use launch::{stack_pointer_valid, Launcher, VectorTable, STACK_MASK, STACK_PATTERN};
pub use machine::{BootOutcome, ImageTransport, Platform, UpdateConfig, UpdateManager};
pub use region::{Region, RegionStore};
pub use state::{NvStore, OtaState, PersistedState};
