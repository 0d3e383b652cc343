// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The persisted-state-driven update orchestrator.
//!
//! Each boot makes exactly one pass: read the persisted state, act on it,
//! and end in either a launch attempt or a reset request. The machine never
//! loops back internally; forward progress across passes happens only
//! through the persisted state, so a reset at any point resumes correctly.

use embedded_storage::nor_flash::NorFlash;

use crate::committer::{FlashCommitter, RegionSource};
use crate::crypto::{ImageCipher, BLOCK_LEN, KEY_LEN};
use crate::image::ImageHeader;
use crate::launch::{stack_pointer_valid, Launcher, VectorTable};
use crate::region::{Region, RegionStore};
use crate::state::{NvStore, OtaState, PersistedState};
use crate::Error;
use consts::EXT_SECTOR_SIZE;

/// Reset and watchdog control.
pub trait Platform {
    /// Full system reset.
    ///
    /// Never returns on hardware. A mock may return so the surrounding pass
    /// can be observed under test; the machine treats the call as final and
    /// only unwinds bookkeeping after it.
    fn reset(&mut self);

    /// Arm the independent watchdog. Once armed it cannot be stopped; only
    /// the application's own confirmation path outruns it.
    fn start_watchdog(&mut self, timeout_ms: u32);
}

/// Blocking image transfer into a caller buffer.
///
/// The link-layer framing behind this is out of scope for the core; see the
/// `host-protocol` crate for the wire messages the reference transport
/// speaks.
pub trait ImageTransport {
    type Error;

    /// Receive the next run of image bytes; `Ok(0)` ends the transfer.
    fn receive_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Fixed addresses and injected secrets for one device.
pub struct UpdateConfig {
    /// AES-256 key provisioned for update images.
    pub key: [u8; KEY_LEN],
    /// CBC initialization vector paired with the key.
    pub iv: [u8; BLOCK_LEN],
    /// Application window offset within the internal flash device.
    pub app_offset: u32,
    /// Capacity of the application window in bytes.
    pub max_app_size: u32,
    /// First-boot confirmation deadline.
    pub watchdog_timeout_ms: u32,
}

/// What a boot-time pass decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootOutcome {
    /// Every launch attempt fell through; wait for an operator-triggered
    /// transfer. Carries the error that ended the pass.
    NoValidApp { error: Option<Error> },
    /// The persisted state advanced and a system reset was requested. On
    /// hardware `Platform::reset` does not return and this value is never
    /// observed.
    Reset,
}

pub struct UpdateManager<XF, AF, S, P, L> {
    pub(crate) regions: RegionStore<XF>,
    pub(crate) committer: FlashCommitter<AF>,
    pub(crate) state: PersistedState<S>,
    pub(crate) platform: P,
    pub(crate) launcher: L,
    cipher: ImageCipher,
    config: UpdateConfig,
    buf: [u8; EXT_SECTOR_SIZE],
}

impl<XF, AF, S, P, L> UpdateManager<XF, AF, S, P, L>
where
    XF: NorFlash,
    AF: NorFlash,
    S: NvStore,
    P: Platform,
    L: Launcher,
{
    pub fn new(
        regions: RegionStore<XF>,
        committer: FlashCommitter<AF>,
        store: S,
        platform: P,
        launcher: L,
        config: UpdateConfig,
    ) -> Self {
        let cipher = ImageCipher::new(&config.key);
        Self {
            regions,
            committer,
            state: PersistedState::new(store),
            platform,
            launcher,
            cipher,
            config,
            buf: [0; EXT_SECTOR_SIZE],
        }
    }

    /// Boot entry: dispatch on the persisted state.
    ///
    /// Called once per power-up. Passes that advance the process end in a
    /// reset request so the next pass re-reads persisted state instead of
    /// trusting anything in RAM.
    pub fn resume<T: ImageTransport>(&mut self, transport: &mut T) -> BootOutcome {
        let state = match self.state.state() {
            Ok(state) => state,
            Err(e) => return BootOutcome::NoValidApp { error: Some(e) },
        };
        match state {
            OtaState::NoUpdate => {
                let error = self.try_launch().err();
                BootOutcome::NoValidApp { error }
            }
            OtaState::Downloading => {
                // an earlier transfer never finished; the old application
                // may still be intact, so try it before re-downloading
                let _ = self.try_launch();
                self.start_update(transport)
            }
            OtaState::DownloadComplete => {
                let staged = match self.state.staged_size() {
                    Ok(size) => size,
                    Err(e) => return BootOutcome::NoValidApp { error: Some(e) },
                };
                self.regions.restore(Region::Backup, staged);
                match self.install_staged() {
                    Ok(()) => self.confirm_and_reset(),
                    // the staged ciphertext is untouched by these failures:
                    // keep the state so the next boot retries the commit
                    Err(Error::Erase)
                    | Err(Error::Program { .. })
                    | Err(Error::Verify { .. }) => {
                        self.platform.reset();
                        BootOutcome::Reset
                    }
                    Err(_) => self.revert_and_reset(),
                }
            }
            OtaState::FirstCheckStart => {
                // persist FirstChecking BEFORE jumping: if the new
                // application hangs, the watchdog reset lands there
                if let Err(e) = self.state.set_state(OtaState::FirstChecking) {
                    return BootOutcome::NoValidApp { error: Some(e) };
                }
                self.platform.start_watchdog(self.config.watchdog_timeout_ms);
                let _ = self.try_launch();
                // not even a valid vector table: the commit produced garbage
                self.revert_and_reset()
            }
            OtaState::FirstChecking => {
                // the watchdog caught a first boot that never confirmed
                self.revert_and_reset()
            }
        }
    }

    /// Operator-triggered update: receive, stage, install, confirm-boot.
    ///
    /// Also the re-download path for an interrupted `Downloading` state. On
    /// failure the persisted state reverts to `NoUpdate` and whatever is in
    /// the application window gets a best-effort launch.
    pub fn start_update<T: ImageTransport>(&mut self, transport: &mut T) -> BootOutcome {
        let result = self
            .stage_incoming(transport)
            .and_then(|()| self.install_staged());
        match result {
            Ok(()) => self.confirm_and_reset(),
            Err(e) => {
                let _ = self.state.set_state(OtaState::NoUpdate);
                let _ = self.try_launch();
                BootOutcome::NoValidApp { error: Some(e) }
            }
        }
    }

    /// Validate the vector table at the application window and hand off.
    ///
    /// Returns only when there is no valid application to run; an invalid
    /// stack pointer returns without any side effect.
    pub fn try_launch(&mut self) -> Result<(), Error> {
        let mut words = [0u8; 8];
        self.committer.read(self.config.app_offset, &mut words)?;
        let vt = VectorTable::parse(&words);
        if !stack_pointer_valid(vt.initial_sp) {
            return Err(Error::NoValidApp);
        }
        self.launcher.handoff(&vt);
        // a handoff that came back is a failed launch
        Err(Error::NoValidApp)
    }

    /// Stream the incoming transfer into the landing region and persist the
    /// staged size, advancing `Downloading` -> `DownloadComplete`.
    fn stage_incoming<T: ImageTransport>(&mut self, transport: &mut T) -> Result<(), Error> {
        self.state.set_state(OtaState::Downloading)?;
        self.regions.erase(Region::Backup);
        let mut total: u32 = 0;
        loop {
            let n = transport
                .receive_chunk(&mut self.buf)
                .map_err(|_| Error::Transfer)?;
            if n == 0 {
                break;
            }
            self.regions.write(Region::Backup, &self.buf[..n])?;
            total += n as u32;
        }
        if total == 0 {
            return Err(Error::Transfer);
        }
        self.regions.write_end(Region::Backup)?;
        self.state
            .set_staged_size(self.regions.stored_size(Region::Backup))?;
        self.state.set_state(OtaState::DownloadComplete)
    }

    /// Decrypt-relay, back up the running application, commit.
    ///
    /// Requires the Backup region bookkeeping to describe the staged
    /// ciphertext (fresh from `stage_incoming` or rebuilt by `restore`).
    /// The transfer is over before this runs, so no interrupt-driven
    /// reception is in flight while the internal flash stalls the bus.
    fn install_staged(&mut self) -> Result<(), Error> {
        let app_size = self.decrypt_relay()?;
        self.backup_current()?;
        let mut source = RegionSource::new(&mut self.regions, Region::Staging);
        self.committer
            .commit(self.config.app_offset, app_size, &mut source)?;
        self.state.set_app_size(app_size)
    }

    /// Stream the staged ciphertext through the cipher into the Staging
    /// region, returning the application size announced by the header block.
    /// Zero padding past the announced size is trimmed.
    fn decrypt_relay(&mut self) -> Result<u32, Error> {
        self.regions.erase(Region::Staging);
        let mut iv = self.config.iv;
        let mut header: Option<ImageHeader> = None;
        let mut remaining: u32 = 0;
        'relay: loop {
            let n = match self.regions.read(Region::Backup, &mut self.buf)? {
                Some(n) => n,
                None => break,
            };
            if n % BLOCK_LEN != 0 {
                // ciphertext is always a whole number of blocks
                return Err(Error::ImageTruncated);
            }
            let mut off = 0;
            while off < n {
                let mut block = [0u8; BLOCK_LEN];
                block.copy_from_slice(&self.buf[off..off + BLOCK_LEN]);
                self.cipher.decrypt_block(&mut iv, &mut block);
                off += BLOCK_LEN;
                match header {
                    None => {
                        let parsed = ImageHeader::parse(&block);
                        remaining = parsed.checked_size(self.config.max_app_size)?;
                        header = Some(parsed);
                    }
                    Some(_) => {
                        let take = remaining.min(BLOCK_LEN as u32) as usize;
                        self.regions.write(Region::Staging, &block[..take])?;
                        remaining -= take as u32;
                        if remaining == 0 {
                            break 'relay;
                        }
                    }
                }
            }
        }
        let header = header.ok_or(Error::ImageTruncated)?;
        if remaining != 0 {
            return Err(Error::ImageTruncated);
        }
        self.regions.write_end(Region::Staging)?;
        Ok(header.app_size())
    }

    /// Copy the running application into the Backup region, sized by the
    /// persisted current-application size. Skipped when that size is zero or
    /// implausible (fresh device, lost store): there is nothing credible to
    /// copy.
    fn backup_current(&mut self) -> Result<(), Error> {
        let current = self.state.app_size()?;
        if current == 0 || current > self.config.max_app_size {
            return Ok(());
        }
        self.regions.erase(Region::Backup);
        let mut offset: u32 = 0;
        while offset < current {
            let take = (current - offset).min(EXT_SECTOR_SIZE as u32) as usize;
            self.committer
                .read(self.config.app_offset + offset, &mut self.buf[..take])?;
            self.regions.write(Region::Backup, &self.buf[..take])?;
            offset += take as u32;
        }
        self.regions.write_end(Region::Backup)
    }

    /// A verified commit is in place: schedule the first-boot check and
    /// reset so the next pass runs from persisted state alone.
    fn confirm_and_reset(&mut self) -> BootOutcome {
        if let Err(e) = self.state.set_state(OtaState::FirstCheckStart) {
            return BootOutcome::NoValidApp { error: Some(e) };
        }
        self.platform.reset();
        BootOutcome::Reset
    }

    /// Abandon the update: force a clean re-download on the next boot.
    fn revert_and_reset(&mut self) -> BootOutcome {
        let _ = self.state.set_state(OtaState::NoUpdate);
        self.platform.reset();
        BootOutcome::Reset
    }
}
