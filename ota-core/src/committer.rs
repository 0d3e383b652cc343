// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verified programming of the internal application window.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::region::{Region, RegionStore};
use crate::Error;
use consts::EXT_SECTOR_SIZE;

/// Bytes programmed and verified per step.
pub const WORD: usize = 4;

/// Supplies the bytes to commit, in stream order.
pub trait CommitSource {
    /// Fill `buf` with the next run of bytes; `Ok(0)` once exhausted.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

/// Contiguous in-memory source.
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl CommitSource for SliceSource<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let take = self.data.len().min(buf.len());
        buf[..take].copy_from_slice(&self.data[..take]);
        self.data = &self.data[take..];
        Ok(take)
    }
}

/// Streamed source draining a staged region.
pub struct RegionSource<'a, F> {
    store: &'a mut RegionStore<F>,
    region: Region,
}

impl<'a, F: NorFlash> RegionSource<'a, F> {
    pub fn new(store: &'a mut RegionStore<F>, region: Region) -> Self {
        Self { store, region }
    }
}

impl<F: NorFlash> CommitSource for RegionSource<'_, F> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(self.store.read(self.region, buf)?.unwrap_or(0))
    }
}

/// Erases and reprograms the application window, verifying every word by
/// read-back.
pub struct FlashCommitter<F> {
    pub(crate) flash: F,
    buf: [u8; EXT_SECTOR_SIZE],
}

impl<F: NorFlash> FlashCommitter<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            buf: [0; EXT_SECTOR_SIZE],
        }
    }

    /// Read back a run of the application flash.
    pub fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.flash.read(offset, buf).map_err(|_| Error::AppRead)
    }

    /// Erase `[dest, dest + total_len)` (rounded up to the erase granularity)
    /// and program `total_len` bytes from `source`, one word at a time,
    /// reading each word back and comparing it against what was written.
    ///
    /// A failed erase aborts before anything is programmed. On
    /// [`Error::Verify`] the window content beyond the failing word is
    /// undefined; the caller must not advance its persisted state.
    pub fn commit<S: CommitSource>(
        &mut self,
        dest: u32,
        total_len: u32,
        source: &mut S,
    ) -> Result<(), Error> {
        if total_len == 0 {
            return Err(Error::ImageTruncated);
        }
        let erase_len = round_up(total_len, F::ERASE_SIZE as u32);
        self.flash
            .erase(dest, dest + erase_len)
            .map_err(|_| Error::Erase)?;

        let mut written: u32 = 0;
        while written < total_len {
            let n = source.fill(&mut self.buf)?;
            if n == 0 {
                return Err(Error::ImageTruncated);
            }
            let take = (n as u32).min(total_len - written) as usize;
            let mut off = 0;
            while off < take {
                // a trailing partial word is padded with 0xFF, matching the
                // erased state of the uncovered bytes
                let mut word = [0xFFu8; WORD];
                let m = WORD.min(take - off);
                word[..m].copy_from_slice(&self.buf[off..off + m]);
                let addr = dest + written + off as u32;
                self.flash
                    .write(addr, &word)
                    .map_err(|_| Error::Program { offset: addr })?;
                let mut check = [0u8; WORD];
                self.flash
                    .read(addr, &mut check)
                    .map_err(|_| Error::AppRead)?;
                if check != word {
                    return Err(Error::Verify { offset: addr });
                }
                off += WORD;
            }
            written += take as u32;
        }
        Ok(())
    }
}

fn round_up(n: u32, to: u32) -> u32 {
    n.div_ceil(to) * to
}
