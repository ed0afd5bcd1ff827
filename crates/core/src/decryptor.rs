//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Streaming decryptor: a container reader paired with the device key.
//!
//! The key lives only as long as the handle and is zeroized when the
//! handle drops. An authentication failure is terminal — the handle
//! poisons itself and every later read reports the same error, so a
//! tampered or foreign container can never yield partial plaintext
//! after the first bad chunk.

use crate::aeadbox;
use crate::container::ContainerReader;
use crate::error::ContainerError;
use crate::hwid::DeviceId;
use crate::kdf::ContentKey;

use std::path::Path;

/// One decrypted chunk with its position in the stream.
pub struct DecryptedChunk {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Key-scoped streaming decryptor over one container file.
pub struct StreamDecryptor {
    reader: ContainerReader,
    key: ContentKey,
    poisoned: bool,
}

impl StreamDecryptor {
    /// Open a container for the given device, deriving the content key.
    pub fn open(path: &Path, device: &DeviceId) -> Result<Self, ContainerError> {
        let reader = ContainerReader::open(path)?;
        Ok(Self {
            reader,
            key: ContentKey::derive(device),
            poisoned: false,
        })
    }

    pub fn total_chunks(&self) -> u32 {
        self.reader.total_chunks()
    }

    /// Index of the next chunk [`Self::decrypt_next`] will return.
    pub fn current_chunk(&self) -> u32 {
        self.reader.current_chunk()
    }

    /// Reposition so the next decrypt returns chunk `index`
    /// (`index == total_chunks` means end-of-file).
    pub fn seek(&mut self, index: u32) -> Result<(), ContainerError> {
        if self.poisoned {
            return Err(ContainerError::AuthFailed);
        }
        self.reader.seek_to(index)
    }

    /// Decrypt the next chunk, or `None` at end-of-file.
    pub fn decrypt_next(&mut self) -> Result<Option<DecryptedChunk>, ContainerError> {
        if self.poisoned {
            return Err(ContainerError::AuthFailed);
        }

        let record = match self.reader.read_next()? {
            Some(record) => record,
            None => return Ok(None),
        };

        match aeadbox::open_chunk(&self.key, &record.nonce, &record.tag, &record.ciphertext) {
            Ok(data) => Ok(Some(DecryptedChunk {
                index: record.index,
                data,
            })),
            Err(e) => {
                if e.is_fatal() {
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Close the handle. Dropping has the same effect; the key is
    /// zeroized either way.
    pub fn close(self) {}
}

/// Drain a whole container into memory.
///
/// Used by tools and tests; playback goes through the streaming
/// pipeline instead.
pub fn decrypt_to_memory(path: &Path, device: &DeviceId) -> Result<Vec<u8>, ContainerError> {
    let mut decryptor = StreamDecryptor::open(path, device)?;
    let mut out = Vec::new();
    while let Some(chunk) = decryptor.decrypt_next()? {
        out.extend_from_slice(&chunk.data);
    }
    Ok(out)
}
