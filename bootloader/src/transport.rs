// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! COBS/postcard image transfer over the UART link.
//!
//! The host drives the transfer and waits for the ack of each block before
//! sending the next one, so at most one message is in flight at a time.

use crc::{Crc, CRC_32_ISCSI};
use defmt::{info, warn};
use embassy_stm32::peripherals::USART1;
use embassy_stm32::usart::{BufferedUartRx, BufferedUartTx};
use embedded_io::{Read, Write};
use host_protocol::{HostMessage, Updater, COBS_MAX_MSG_SIZE};
use ota_core::ImageTransport;
use postcard::accumulator::{CobsAccumulator, FeedResult};
use postcard::to_slice_cobs;

use consts::REGION_SIZE;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The host abandoned the transfer.
    Aborted,
    /// The transfer would overflow the staging region.
    OutOfBounds,
    /// The serial link failed.
    Link,
}

pub struct UartTransport {
    rx: BufferedUartRx<'static, USART1>,
    tx: BufferedUartTx<'static, USART1>,
    acc: CobsAccumulator<COBS_MAX_MSG_SIZE>,
    /// Bytes accepted so far in the running transfer.
    staged: u32,
}

impl UartTransport {
    pub fn new(rx: BufferedUartRx<'static, USART1>, tx: BufferedUartTx<'static, USART1>) -> Self {
        Self {
            rx,
            tx,
            acc: CobsAccumulator::new(),
            staged: 0,
        }
    }
}

fn send(tx: &mut BufferedUartTx<'static, USART1>, msg: &HostMessage<'_>) {
    let mut buf = [0u8; COBS_MAX_MSG_SIZE];
    if let Ok(framed) = to_slice_cobs(msg, &mut buf) {
        let _ = tx.write_all(framed);
        let _ = tx.flush();
    }
}

impl ImageTransport for UartTransport {
    type Error = TransportError;

    fn receive_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut raw = [0u8; 64];
        loop {
            let n = self.rx.read(&mut raw).map_err(|_| TransportError::Link)?;
            if n == 0 {
                return Err(TransportError::Link);
            }
            let Self {
                ref mut tx,
                ref mut acc,
                ref mut staged,
                ..
            } = *self;
            let mut window = &raw[..n];
            'cobs: while !window.is_empty() {
                window = match acc.feed_ref::<HostMessage>(window) {
                    FeedResult::Consumed => break 'cobs,
                    FeedResult::OverFull(rest) | FeedResult::DeserError(rest) => rest,
                    FeedResult::Success { data, remaining } => {
                        match data {
                            HostMessage::Updater(Updater::StartTransfer { total_size }) => {
                                if total_size > REGION_SIZE {
                                    send(
                                        tx,
                                        &HostMessage::Updater(Updater::TransferOutOfBounds {
                                            total_size,
                                        }),
                                    );
                                    return Err(TransportError::OutOfBounds);
                                }
                                info!("transfer of {} bytes announced", total_size);
                                *staged = 0;
                                send(tx, &HostMessage::Updater(Updater::AckStartTransfer));
                            }
                            HostMessage::Updater(Updater::ImageBlock {
                                block_idx,
                                block_data,
                            }) => {
                                if block_data.len() > buf.len()
                                    || *staged + block_data.len() as u32 > REGION_SIZE
                                {
                                    send(
                                        tx,
                                        &HostMessage::Updater(Updater::NackWithIdx { block_idx }),
                                    );
                                    return Err(TransportError::OutOfBounds);
                                }
                                buf[..block_data.len()].copy_from_slice(block_data);
                                *staged += block_data.len() as u32;
                                let crc = CRC.checksum(block_data);
                                send(
                                    tx,
                                    &HostMessage::Updater(Updater::AckWithIdxCrc {
                                        block_idx,
                                        crc,
                                    }),
                                );
                                return Ok(block_data.len());
                            }
                            HostMessage::Updater(Updater::FinishTransfer) => {
                                info!("transfer finished, {} bytes staged", *staged);
                                send(
                                    tx,
                                    &HostMessage::Updater(Updater::AckFinishTransfer {
                                        total_size: *staged,
                                    }),
                                );
                                return Ok(0);
                            }
                            HostMessage::Updater(Updater::AbortTransfer) => {
                                warn!("host aborted the transfer");
                                return Err(TransportError::Aborted);
                            }
                            HostMessage::Updater(Updater::BootloaderVersion) => {
                                send(
                                    tx,
                                    &HostMessage::Updater(Updater::AckBootloaderVersion {
                                        version: env!("CARGO_PKG_VERSION"),
                                    }),
                                );
                            }
                            HostMessage::Reset => {
                                cortex_m::peripheral::SCB::sys_reset();
                            }
                            _ => (),
                        };
                        remaining
                    }
                };
            }
        }
    }
}
