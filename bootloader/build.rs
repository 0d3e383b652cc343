// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! This build script generates the `memory.x` file describing the bootloader
//! flash partition and places it where the linker can find it. The partition
//! runs from the start of flash up to the application window, with the last
//! 64 bytes reserved for the key provisioning block.

use consts::{APP_OFFSET, FLASH_BASE, PROVISION_OFFSET};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let memory_x_content = format!(
        r##"
        MEMORY
        {{
            /* Bootloader partition: flash below the application window,
               minus the provisioning block at its tail */
            FLASH (rx) : ORIGIN = {:#X}, LENGTH = {:#X}
            RAM (rwx)  : ORIGIN = 0x20000000, LENGTH = 128K
        }}
        "##,
        FLASH_BASE, PROVISION_OFFSET
    );

    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    // APP_OFFSET bounds the partition; rebuild if the layout crate changes it
    let _ = APP_OFFSET;
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
