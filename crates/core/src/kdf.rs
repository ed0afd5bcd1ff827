//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Content key derivation.
//!
//! The 256-bit content key is a pure function of the device identifier:
//! `PBKDF2-HMAC-SHA256(password = DevId, salt = S, iters = 10_000)`.
//! The salt is a fixed 17-byte constant reconstructed at runtime from an
//! XOR-obfuscated literal. The obfuscation only keeps the salt out of
//! `strings(1)` output; it is not a security boundary, and the salt value
//! must never change or every existing container becomes unreadable.

use crate::hwid::DeviceId;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 iteration count fixed by the container format.
pub const PBKDF2_ROUNDS: u32 = 10_000;

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

const SALT_LEN: usize = 17;
const SALT_XOR_KEY: u8 = 0x55;

// Salt literal XORed with 0x55, assembled at runtime.
const OBFUSCATED_SALT: [u8; SALT_LEN] = [
    0x05, 0x1c, 0x07, 0x14, 0x18, 0x1c, 0x11, 0x0a, 0x06, 0x14, 0x19, 0x01, 0x0a, 0x67, 0x65,
    0x67, 0x61,
];

fn salt() -> [u8; SALT_LEN] {
    let mut out = [0u8; SALT_LEN];
    for (dst, src) in out.iter_mut().zip(OBFUSCATED_SALT.iter()) {
        *dst = src ^ SALT_XOR_KEY;
    }
    out
}

/// The 256-bit content key bound to one device.
///
/// Derived deterministically from the [`DeviceId`], never persisted, and
/// zeroized when dropped. The raw bytes stay inside this crate; callers
/// hand the key to the decryptor or encoder and nothing else.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_LEN]);

impl ContentKey {
    /// Derive the content key for a device.
    pub fn derive(device: &DeviceId) -> Self {
        let mut salt = salt();
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(device.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key);
        salt.zeroize();
        Self(key)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex SHA-256 fingerprint of the key, safe to print for
    /// provisioning checks (the key itself is never exposed).
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deobfuscated_salt_matches_format_constant() {
        assert_eq!(&salt(), b"PIRAMID_SALT_2024");
    }

    #[test]
    fn derivation_is_deterministic() {
        let device = DeviceId::from("MACHINE_abc");
        let a = ContentKey::derive(&device);
        let b = ContentKey::derive(&device);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_devices_get_different_keys() {
        let a = ContentKey::derive(&DeviceId::from("MACHINE_a"));
        let b = ContentKey::derive(&DeviceId::from("MACHINE_b"));
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn fingerprint_is_stable_and_not_the_key() {
        let key = ContentKey::derive(&DeviceId::from("MACHINE_abc"));
        let fp = key.fingerprint();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, key.fingerprint());
        assert_ne!(fp.as_bytes(), key.as_bytes().as_slice());
    }
}
