// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host to bootloader communication protocol.
//!
//! The host streams an encrypted update image to the device over a serial
//! link. Messages are `postcard`-encoded and COBS-framed; every image block
//! is acknowledged with its index and CRC32 so the host can retry or rewind.

#![no_std]

use serde::{Deserialize, Serialize};

/// Maximum supported message size to be serialized or deserialized by
/// `postcard`. Messages larger than this will be rejected.
pub const COBS_MAX_MSG_SIZE: usize = 1088;

/// Largest image block payload a single message may carry.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Image-transfer messages for staging a new application image.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum Updater<'a> {
    /// Announce a transfer of `total_size` encrypted bytes
    StartTransfer { total_size: u32 },
    /// Accept the announced transfer
    AckStartTransfer,
    /// Refuse a transfer that would not fit the staging region
    TransferOutOfBounds { total_size: u32 },
    /// Sequential image block
    ImageBlock { block_idx: u32, block_data: &'a [u8] },
    /// Positive acknowledgment of a block with its CRC32
    AckWithIdxCrc { block_idx: u32, crc: u32 },
    /// Negative acknowledgment of a block
    NackWithIdx { block_idx: u32 },
    /// End of transfer
    FinishTransfer,
    /// Acknowledge completion with the total byte count staged
    AckFinishTransfer { total_size: u32 },
    /// Abandon the transfer in progress
    AbortTransfer,
    /// Request bootloader version
    BootloaderVersion,
    /// Response with bootloader version string
    AckBootloaderVersion { version: &'a str },
}

/// Top-level message types exchanged on the update link.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum HostMessage<'a> {
    /// Image transfer and bootloader control
    Updater(#[serde(borrow)] Updater<'a>),
    /// Request device reset
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use postcard::accumulator::{CobsAccumulator, FeedResult};
    use postcard::{from_bytes, to_slice, to_slice_cobs};

    #[test]
    fn block_message_roundtrip() {
        let payload = [0xA5u8; 64];
        let msg = HostMessage::Updater(Updater::ImageBlock {
            block_idx: 7,
            block_data: &payload,
        });
        let mut buf = [0u8; COBS_MAX_MSG_SIZE];
        let used = to_slice(&msg, &mut buf).unwrap();
        let parsed: HostMessage = from_bytes(used).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn cobs_framed_roundtrip() {
        let msg = HostMessage::Updater(Updater::AckWithIdxCrc {
            block_idx: 3,
            crc: 0xDEAD_BEEF,
        });
        let mut buf = [0u8; COBS_MAX_MSG_SIZE];
        let framed = to_slice_cobs(&msg, &mut buf).unwrap();

        let mut acc: CobsAccumulator<COBS_MAX_MSG_SIZE> = CobsAccumulator::new();
        match acc.feed_ref::<HostMessage>(framed) {
            FeedResult::Success { data, remaining } => {
                assert_eq!(data, msg);
                assert!(remaining.is_empty());
            }
            _ => panic!("message did not decode"),
        }
    }

    #[test]
    fn largest_block_fits_the_frame() {
        let payload = [0x5Au8; MAX_BLOCK_SIZE];
        let msg = HostMessage::Updater(Updater::ImageBlock {
            block_idx: u32::MAX,
            block_data: &payload,
        });
        let mut buf = [0u8; COBS_MAX_MSG_SIZE];
        assert!(to_slice_cobs(&msg, &mut buf).is_ok());
    }
}
