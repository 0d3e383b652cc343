// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot-time OTA bootloader for the STM32F407 target.
//!
//! Runs with no scheduler and no enabled interrupts beyond the buffered UART:
//! one pass of the persisted update state machine at reset, then a
//! key-triggered fall-through loop waiting for a new image transfer.

#![no_std]
#![no_main]

mod eeprom;
mod ext_flash;
mod int_flash;
mod jump_app;
mod transport;

use cortex_m_rt::entry;
use defmt::{error, info, warn};
use defmt_rtt as _;
use panic_probe as _;

use embassy_stm32::dma::NoDma;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{AnyPin, Input, Level, Output, Pin, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::peripherals;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{self, BufferedUart};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::bind_interrupts;
use embassy_time::{block_for, Duration};
use static_cell::StaticCell;

use consts::{
    APP_OFFSET, MAX_APP_SIZE, PROVISION_ADDRESS, WATCHDOG_TIMEOUT_MS,
};
use ota_core::{
    BootOutcome, FlashCommitter, Platform, RegionStore, UpdateConfig, UpdateManager, BLOCK_LEN,
    KEY_LEN,
};

use crate::eeprom::Eeprom;
use crate::ext_flash::W25q64;
use crate::int_flash::AppFlash;
use crate::jump_app::JumpToApp;
use crate::transport::UartTransport;

bind_interrupts!(struct Irqs {
    USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

static UART_RX_BUF: StaticCell<[u8; 1024]> = StaticCell::new();
static UART_TX_BUF: StaticCell<[u8; 512]> = StaticCell::new();

type Manager = UpdateManager<W25q64, AppFlash, Eeprom, BoardPlatform, JumpToApp>;
static MANAGER: StaticCell<Manager> = StaticCell::new();
static TRANSPORT: StaticCell<UartTransport> = StaticCell::new();

/// Reset and watchdog control over the SCB and IWDG.
struct BoardPlatform {
    iwdg: Option<peripherals::IWDG>,
}

impl Platform for BoardPlatform {
    fn reset(&mut self) {
        cortex_m::peripheral::SCB::sys_reset();
    }

    fn start_watchdog(&mut self, timeout_ms: u32) {
        if let Some(iwdg) = self.iwdg.take() {
            let mut wdg = IndependentWatchdog::new(iwdg, timeout_ms * 1000);
            wdg.unleash();
        }
    }
}

#[entry]
fn main() -> ! {
    let p = embassy_stm32::init(Default::default());
    info!("bootloader {}", env!("CARGO_PKG_VERSION"));

    // UART link to the host
    let usart_config = {
        let mut config = usart::Config::default();
        config.baudrate = 115_200;
        config
    };
    let (tx, rx) = BufferedUart::new(
        p.USART1,
        Irqs,
        p.PA10,
        p.PA9,
        UART_TX_BUF.init([0; 512]),
        UART_RX_BUF.init([0; 1024]),
        usart_config,
    )
    .unwrap()
    .split();

    // external staging flash on SPI1
    let spi_config = {
        let mut config = spi::Config::default();
        config.frequency = Hertz(8_000_000);
        config
    };
    let spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);
    let cs = Output::new(p.PA4.degrade(), Level::High, Speed::VeryHigh);
    let ext = W25q64::new(spi, cs);

    // persisted state EEPROM on I2C1
    let i2c = I2c::new(
        p.I2C1,
        p.PB6,
        p.PB7,
        Irqs,
        NoDma,
        NoDma,
        Hertz(100_000),
        Default::default(),
    );
    let store = Eeprom::new(i2c);

    let app_flash = AppFlash::new(Flash::new_blocking(p.FLASH));

    let (key, iv) = read_provisioning();
    let config = UpdateConfig {
        key,
        iv,
        app_offset: APP_OFFSET,
        max_app_size: MAX_APP_SIZE,
        watchdog_timeout_ms: WATCHDOG_TIMEOUT_MS,
    };

    let manager = MANAGER.init(UpdateManager::new(
        RegionStore::new(ext),
        FlashCommitter::new(app_flash),
        store,
        BoardPlatform { iwdg: Some(p.IWDG) },
        JumpToApp,
        config,
    ));
    let transport = TRANSPORT.init(UartTransport::new(rx, tx));

    match manager.resume(transport) {
        // on hardware the reset already happened; nothing to do
        BootOutcome::Reset => {}
        BootOutcome::NoValidApp { error } => {
            if let Some(e) = error {
                warn!("boot pass ended: {}", e);
            }
        }
    }

    // operator fall-through: wait for the key, then take a transfer
    let key_in = Input::new(p.PC13.degrade(), Pull::Up);
    info!("no valid application, press the key and transfer a new image");
    loop {
        if key_pressed(&key_in) {
            info!("starting image transfer");
            match manager.start_update(transport) {
                BootOutcome::Reset => {}
                BootOutcome::NoValidApp { error } => {
                    if let Some(e) = error {
                        error!("update failed: {}", e);
                    }
                    info!("press the key to retry");
                }
            }
        }
        block_for(Duration::from_millis(50));
    }
}

fn key_pressed(key: &Input<'static, AnyPin>) -> bool {
    if key.is_low() {
        block_for(Duration::from_millis(10));
        return key.is_low();
    }
    false
}

/// Read the per-device update key and IV from the provisioning block at the
/// tail of the bootloader partition. Written once at manufacturing; never
/// compiled into the firmware.
fn read_provisioning() -> ([u8; KEY_LEN], [u8; BLOCK_LEN]) {
    let block = unsafe {
        core::slice::from_raw_parts(PROVISION_ADDRESS as *const u8, KEY_LEN + BLOCK_LEN)
    };
    if block.iter().all(|&b| b == 0xFF) {
        warn!("provisioning block is blank; update images will not decrypt");
    }
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; BLOCK_LEN];
    key.copy_from_slice(&block[..KEY_LEN]);
    iv.copy_from_slice(&block[KEY_LEN..]);
    (key, iv)
}
