// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte-stream staging over two external-flash regions.
//!
//! A region is written as a stream: bytes accumulate in a RAM buffer of one
//! erase sector, and every full sector is erased and programmed page by page.
//! Reads hand back one sector at a time until the stream is exhausted.
//! Physical erase is lazy; resetting a region only rewinds its cursors.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::Error;
use consts::{EXT_PAGE_SIZE, EXT_SECTOR_SIZE, REGION_SIZE};

const SECTORS_PER_REGION: u32 = REGION_SIZE / EXT_SECTOR_SIZE as u32;

/// One of the two staging windows in external flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    /// Landing zone for the incoming encrypted image; re-used for the
    /// previous-application backup once installation starts.
    Backup = 0,
    /// Decrypted application staged for the internal-flash commit.
    Staging = 1,
}

impl Region {
    fn base(self) -> u32 {
        self as u32 * REGION_SIZE
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Write/read bookkeeping for one region.
///
/// Invariant: `read_cursor <= write_cursor`; the region is exhausted for
/// reading when they are equal.
pub(crate) struct RegionDescriptor {
    buf: [u8; EXT_SECTOR_SIZE],
    /// Offset of the next free byte in `buf`.
    pub(crate) buf_offset: usize,
    /// Total bytes flushed to flash, including the partial remainder once
    /// `write_end` ran.
    pub(crate) write_cursor: u32,
    /// Next erase sector to program.
    pub(crate) write_sector: u32,
    pub(crate) read_cursor: u32,
    pub(crate) read_sector: u32,
}

impl RegionDescriptor {
    const fn new() -> Self {
        Self {
            buf: [0; EXT_SECTOR_SIZE],
            buf_offset: 0,
            write_cursor: 0,
            write_sector: 0,
            read_cursor: 0,
            read_sector: 0,
        }
    }

    fn reset(&mut self) {
        self.buf_offset = 0;
        self.write_cursor = 0;
        self.write_sector = 0;
        self.read_cursor = 0;
        self.read_sector = 0;
    }
}

/// Streamed writer/reader over the two staging regions.
pub struct RegionStore<F> {
    pub(crate) flash: F,
    pub(crate) regions: [RegionDescriptor; 2],
}

impl<F: NorFlash> RegionStore<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            regions: [RegionDescriptor::new(), RegionDescriptor::new()],
        }
    }

    /// Append `data` to the region stream.
    ///
    /// Every time the staging buffer fills to exactly one sector the sector
    /// is erased and programmed immediately, within this call.
    pub fn write(&mut self, region: Region, mut data: &[u8]) -> Result<(), Error> {
        while !data.is_empty() {
            let r = &mut self.regions[region.index()];
            let take = (EXT_SECTOR_SIZE - r.buf_offset).min(data.len());
            r.buf[r.buf_offset..r.buf_offset + take].copy_from_slice(&data[..take]);
            r.buf_offset += take;
            let full = r.buf_offset == EXT_SECTOR_SIZE;
            data = &data[take..];
            if full {
                self.flush_sector(region, EXT_SECTOR_SIZE)?;
            }
        }
        Ok(())
    }

    /// Flush the partial sector left after the final `write` of a stream.
    ///
    /// Programs only the pages needed to cover the remainder, ending with a
    /// sub-page write of the exact tail length. Call exactly once per stream.
    pub fn write_end(&mut self, region: Region) -> Result<(), Error> {
        let len = self.regions[region.index()].buf_offset;
        if len != 0 {
            self.flush_sector(region, len)?;
        }
        Ok(())
    }

    /// Read the next unread run of the region stream into `buf`.
    ///
    /// Returns one full sector while more than a sector remains unread, the
    /// exact remainder for the final run, and `None` once
    /// `read_cursor == write_cursor`. `buf` must hold at least one sector.
    pub fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let (len, addr) = {
            let r = &self.regions[region.index()];
            if r.read_cursor >= r.write_cursor {
                return Ok(None);
            }
            let addr = region.base() + r.read_sector * EXT_SECTOR_SIZE as u32;
            if r.write_sector > r.read_sector {
                (EXT_SECTOR_SIZE, addr)
            } else {
                ((r.write_cursor - r.read_cursor) as usize, addr)
            }
        };
        self.flash
            .read(addr, &mut buf[..len])
            .map_err(|_| Error::StagingRead)?;
        let r = &mut self.regions[region.index()];
        if len == EXT_SECTOR_SIZE {
            r.read_sector += 1;
        }
        r.read_cursor += len as u32;
        Ok(Some(len))
    }

    /// Rewind the region to empty. Physical erase happens lazily when each
    /// sector is next written.
    pub fn erase(&mut self, region: Region) {
        self.regions[region.index()].reset();
    }

    /// Bytes currently staged in the region.
    pub fn stored_size(&self, region: Region) -> u32 {
        self.regions[region.index()].write_cursor
    }

    /// Rebuild the write bookkeeping from a persisted stream size so that a
    /// stream staged before a reset can be read back. The RAM buffer content
    /// is gone; only the cursors matter for reading.
    pub fn restore(&mut self, region: Region, size: u32) {
        let r = &mut self.regions[region.index()];
        r.write_cursor = size;
        r.write_sector = size / EXT_SECTOR_SIZE as u32;
        r.buf_offset = size as usize % EXT_SECTOR_SIZE;
        r.read_cursor = 0;
        r.read_sector = 0;
    }

    /// Erase the target sector and program the first `len` buffered bytes,
    /// page by page. Advances to the next sector only on a full flush.
    fn flush_sector(&mut self, region: Region, len: usize) -> Result<(), Error> {
        let sector = self.regions[region.index()].write_sector;
        if sector >= SECTORS_PER_REGION {
            return Err(Error::StagingWrite);
        }
        let sector_addr = region.base() + sector * EXT_SECTOR_SIZE as u32;
        self.flash
            .erase(sector_addr, sector_addr + EXT_SECTOR_SIZE as u32)
            .map_err(|_| Error::StagingWrite)?;

        let full_pages = len / EXT_PAGE_SIZE;
        for page in 0..full_pages {
            let off = page * EXT_PAGE_SIZE;
            self.flash
                .write(
                    sector_addr + off as u32,
                    &self.regions[region.index()].buf[off..off + EXT_PAGE_SIZE],
                )
                .map_err(|_| Error::StagingWrite)?;
        }
        let tail = len % EXT_PAGE_SIZE;
        if tail != 0 {
            let off = full_pages * EXT_PAGE_SIZE;
            self.flash
                .write(
                    sector_addr + off as u32,
                    &self.regions[region.index()].buf[off..off + tail],
                )
                .map_err(|_| Error::StagingWrite)?;
        }

        let r = &mut self.regions[region.index()];
        r.write_cursor += len as u32;
        if len == EXT_SECTOR_SIZE {
            r.write_sector += 1;
        }
        r.buf_offset = 0;
        Ok(())
    }
}
