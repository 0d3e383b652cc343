// SPDX-FileCopyrightText: 2025 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes256;

/// Cipher block length; also the granularity of the update image format.
pub const BLOCK_LEN: usize = 16;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// AES-256-CBC block decryptor for staged update images.
///
/// The key and IV are provisioned per device and injected by the caller;
/// nothing cryptographic is compiled into this crate.
pub struct ImageCipher {
    aes: Aes256,
}

impl ImageCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            aes: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    /// Decrypt one block in place.
    ///
    /// `iv` threads the CBC chain: it is XORed into the decrypted block and
    /// then replaced with the consumed ciphertext. Feeding blocks out of
    /// stream order therefore produces garbage plaintext. Given the same
    /// `iv` and `block` the output is identical on every call.
    pub fn decrypt_block(&self, iv: &mut [u8; BLOCK_LEN], block: &mut [u8; BLOCK_LEN]) {
        let ciphertext = *block;
        self.aes.decrypt_block(GenericArray::from_mut_slice(&mut block[..]));
        for (out, prev) in block.iter_mut().zip(iv.iter()) {
            *out ^= prev;
        }
        *iv = ciphertext;
    }
}
