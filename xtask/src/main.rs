// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use clap::{Parser, Subcommand};
use ota_core::{ImageCipher, ImageHeader, BLOCK_LEN, KEY_LEN};
use std::path::PathBuf;
use std::process::exit;
use std::{fs, str};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Package an application binary into an encrypted update image:
    /// a 16-byte header block (12-byte tag + little-endian size),
    /// the application zero-padded to whole blocks,
    /// AES-256-CBC over the lot with the device key and IV
    #[command(verbatim_doc_comment)]
    BuildImage {
        /// Path to the raw application binary
        app: PathBuf,
        /// AES-256 key, 64 hex characters
        #[arg(long)]
        key: String,
        /// CBC initialization vector, 32 hex characters
        #[arg(long)]
        iv: String,
        /// Output image path
        #[arg(short, long)]
        out: PathBuf,
        /// Tag written into the header, truncated to 12 bytes
        #[arg(long, default_value = "dev")]
        tag: String,
    },

    /// Decrypt an image and print its header fields
    Inspect {
        /// Path to an encrypted update image
        image: PathBuf,
        /// AES-256 key, 64 hex characters
        #[arg(long)]
        key: String,
        /// CBC initialization vector, 32 hex characters
        #[arg(long)]
        iv: String,
    },
}

fn main() {
    let args = XtaskArgs::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match args.command {
        Commands::BuildImage {
            app,
            key,
            iv,
            out,
            tag,
        } => {
            let key = parse_key(&key);
            let iv = parse_iv(&iv);
            let binary = read_file(&app);
            let image = build_image(&key, &iv, tag.as_bytes(), &binary);
            tracing::info!(
                "packaged {} application bytes into {} image bytes",
                binary.len(),
                image.len()
            );
            if let Err(err) = fs::write(&out, &image) {
                tracing::error!("writing {} failed: {err}", out.display());
                exit(-1);
            }
        }
        Commands::Inspect { image, key, iv } => {
            let key = parse_key(&key);
            let iv = parse_iv(&iv);
            let data = read_file(&image);
            inspect_image(&key, &iv, &data);
        }
    }
}

fn read_file(path: &PathBuf) -> Vec<u8> {
    match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::error!("reading {} failed: {err}", path.display());
            exit(-1);
        }
    }
}

fn parse_key(hex_key: &str) -> [u8; KEY_LEN] {
    match hex::decode(hex_key).ok().and_then(|k| k.try_into().ok()) {
        Some(key) => key,
        None => {
            tracing::error!("the key must be {} hex characters", KEY_LEN * 2);
            exit(-1);
        }
    }
}

fn parse_iv(hex_iv: &str) -> [u8; BLOCK_LEN] {
    match hex::decode(hex_iv).ok().and_then(|iv| iv.try_into().ok()) {
        Some(iv) => iv,
        None => {
            tracing::error!("the IV must be {} hex characters", BLOCK_LEN * 2);
            exit(-1);
        }
    }
}

/// Header block + zero-padded application, AES-256-CBC encrypted.
fn build_image(key: &[u8; KEY_LEN], iv: &[u8; BLOCK_LEN], tag: &[u8], app: &[u8]) -> Vec<u8> {
    let mut plain = vec![0u8; BLOCK_LEN];
    let tag_len = tag.len().min(ImageHeader::TAG_LEN);
    plain[..tag_len].copy_from_slice(&tag[..tag_len]);
    plain[ImageHeader::SIZE_OFFSET..BLOCK_LEN].copy_from_slice(&(app.len() as u32).to_le_bytes());
    plain.extend_from_slice(app);
    while plain.len() % BLOCK_LEN != 0 {
        plain.push(0);
    }

    let aes = Aes256::new(GenericArray::from_slice(key));
    let mut chain = *iv;
    for block in plain.chunks_mut(BLOCK_LEN) {
        for (b, c) in block.iter_mut().zip(chain.iter()) {
            *b ^= c;
        }
        aes.encrypt_block(GenericArray::from_mut_slice(block));
        chain.copy_from_slice(block);
    }
    plain
}

fn inspect_image(key: &[u8; KEY_LEN], iv: &[u8; BLOCK_LEN], data: &[u8]) {
    if data.len() < BLOCK_LEN || data.len() % BLOCK_LEN != 0 {
        tracing::error!("not an update image: {} bytes", data.len());
        exit(-1);
    }
    let cipher = ImageCipher::new(key);
    let mut chain = *iv;
    let mut block: [u8; BLOCK_LEN] = data[..BLOCK_LEN].try_into().unwrap();
    cipher.decrypt_block(&mut chain, &mut block);
    let header = ImageHeader::parse(&block);

    let tag = header.tag();
    let tag_end = tag.iter().position(|&b| b == 0).unwrap_or(tag.len());
    tracing::info!(
        "tag: {:?}",
        str::from_utf8(&tag[..tag_end]).unwrap_or("<not utf-8>")
    );
    tracing::info!("application size: {} bytes", header.app_size());
    let payload_blocks = (data.len() - BLOCK_LEN) / BLOCK_LEN;
    let expected = (header.app_size() as usize).div_ceil(BLOCK_LEN);
    if payload_blocks != expected {
        tracing::warn!(
            "image carries {payload_blocks} payload blocks, header announces {expected}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x11; KEY_LEN];
    const IV: [u8; BLOCK_LEN] = [0x22; BLOCK_LEN];

    #[test]
    fn built_image_decrypts_with_the_core_cipher() {
        let app: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let image = build_image(&KEY, &IV, b"5.0.1", &app);
        assert_eq!(image.len() % BLOCK_LEN, 0);

        let cipher = ImageCipher::new(&KEY);
        let mut chain = IV;
        let mut plain = Vec::new();
        for chunk in image.chunks(BLOCK_LEN) {
            let mut block: [u8; BLOCK_LEN] = chunk.try_into().unwrap();
            cipher.decrypt_block(&mut chain, &mut block);
            plain.extend_from_slice(&block);
        }

        let header = ImageHeader::parse(&plain[..BLOCK_LEN].try_into().unwrap());
        assert_eq!(header.app_size(), app.len() as u32);
        assert_eq!(&header.tag()[..5], b"5.0.1");
        assert_eq!(&plain[BLOCK_LEN..BLOCK_LEN + app.len()], &app[..]);
        // zero padding past the application
        assert!(plain[BLOCK_LEN + app.len()..].iter().all(|&b| b == 0));
    }
}
