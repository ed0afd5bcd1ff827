//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Per-chunk AEAD primitive: AES-256-GCM, 96-bit nonce, 128-bit detached tag.
//!
//! Every chunk is sealed with a fresh random nonce so ciphertext length
//! equals plaintext length and chunks remain independently decryptable.
//! No associated data is used. Nonce reuse under one key breaks GCM, so
//! the only nonce source is the CSPRNG draw inside [`seal_chunk`].

use crate::error::ContainerError;
use crate::kdf::ContentKey;

use aes_gcm::aead::OsRng;
use aes_gcm::{AeadInPlace, Aes256Gcm, Key, KeyInit, Nonce, Tag};
use rand_core::RngCore;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

fn cipher(key: &ContentKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt one chunk under a fresh random nonce.
///
/// Returns `(nonce, tag, ciphertext)` with
/// `ciphertext.len() == plaintext.len()`.
pub fn seal_chunk(
    key: &ContentKey,
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], [u8; TAG_LEN], Vec<u8>), ContainerError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buf = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buf)
        .map_err(|_| ContainerError::EncryptFailed)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);
    Ok((nonce, tag_bytes, buf))
}

/// Decrypt one chunk, verifying its authentication tag.
///
/// Returns [`ContainerError::AuthFailed`] when the tag does not verify,
/// which means either the container was bound to a different device or
/// the record was tampered with. No plaintext escapes in that case.
pub fn open_chunk(
    key: &ContentKey,
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ContainerError> {
    let mut buf = ciphertext.to_vec();
    cipher(key)
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buf,
            Tag::from_slice(tag),
        )
        .map_err(|_| ContainerError::AuthFailed)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwid::DeviceId;

    fn key() -> ContentKey {
        ContentKey::derive(&DeviceId::from("MACHINE_test"))
    }

    #[test]
    fn seal_open_round_trip() {
        let key = key();
        let plain = b"one second of audio, morally speaking";

        let (nonce, tag, ct) = seal_chunk(&key, plain).unwrap();
        assert_eq!(ct.len(), plain.len());

        let opened = open_chunk(&key, &nonce, &tag, &ct).unwrap();
        assert_eq!(opened, plain);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let (nonce, tag, ct) = seal_chunk(&key(), b"bound to one device").unwrap();

        let other = ContentKey::derive(&DeviceId::from("MACHINE_other"));
        assert!(matches!(
            open_chunk(&other, &nonce, &tag, &ct),
            Err(ContainerError::AuthFailed)
        ));
    }

    #[test]
    fn flipped_ciphertext_bit_fails_authentication() {
        let key = key();
        let (nonce, tag, mut ct) = seal_chunk(&key, b"integrity matters").unwrap();
        ct[0] ^= 0x01;

        assert!(matches!(
            open_chunk(&key, &nonce, &tag, &ct),
            Err(ContainerError::AuthFailed)
        ));
    }

    #[test]
    fn flipped_tag_bit_fails_authentication() {
        let key = key();
        let (nonce, mut tag, ct) = seal_chunk(&key, b"integrity matters").unwrap();
        tag[TAG_LEN - 1] ^= 0x80;

        assert!(matches!(
            open_chunk(&key, &nonce, &tag, &ct),
            Err(ContainerError::AuthFailed)
        ));
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = key();
        let (a, _, _) = seal_chunk(&key, b"x").unwrap();
        let (b, _, _) = seal_chunk(&key, b"x").unwrap();
        assert_ne!(a, b);
    }
}
