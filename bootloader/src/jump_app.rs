// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::APP_ADDRESS;
use cortex_m::peripheral::SCB;
use defmt::info;
use ota_core::{Launcher, VectorTable};

/// Register-level handoff into the application image.
pub struct JumpToApp;

impl Launcher for JumpToApp {
    fn handoff(&mut self, vt: &VectorTable) {
        info!(
            "msp = {=u32:x}, rv = {=u32:x}",
            vt.initial_sp, vt.reset_vector
        );
        unsafe { jump_to_app(vt.initial_sp, vt.reset_vector) }
    }
}

/// Boots the application at the head of the application window.
///
/// # Safety
///
/// This modifies the stack pointer and vector table and runs code placed in
/// the application window. There is no way back short of a reset.
unsafe fn jump_to_app(msp: u32, reset_vector: u32) -> ! {
    cortex_m::interrupt::disable();

    // back to power-on clock configuration so the application starts its own
    // init from a known state
    let rcc = embassy_stm32::pac::RCC;
    rcc.cr().modify(|w| w.set_hsion(true));
    while !rcc.cr().read().hsirdy() {}
    rcc.cfgr().write(|_| {});
    rcc.cr().modify(|w| {
        w.set_hseon(false);
        w.set_pllon(false);
    });

    // the application's vector table replaces ours
    (*SCB::PTR).vtor.write(APP_ADDRESS);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    // These instructions perform the following operations:
    //
    // * Initialize the main stack pointer from the application's word 0
    // * Set link register to not return (0xFF)
    // * Jump to the application reset vector
    core::arch::asm!(
        "msr MSP, {msp}",
        "mov lr, {new_lr}",
        "bx {rv}",
        new_lr = in(reg) 0xFFFFFFFFu32,
        msp = in(reg) msp,
        rv = in(reg) reset_vector,
        options(noreturn),
    );
}
