//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Error types for container encoding, decoding and streaming.

use thiserror::Error;

/// Errors raised while encoding, opening or reading a container.
///
/// Header validation failures (`BadMagic`, `BadVersion`, `BadChunkSize`,
/// `EmptyContainer`, `Truncated`) surface from [`crate::container::ContainerReader::open`]
/// and leave no usable handle behind.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The file does not start with the `PIRA` magic bytes.
    #[error("invalid container magic (not a PIRA file)")]
    BadMagic,

    /// The container version is not the supported v2.
    #[error("unsupported container version {0} (expected v2)")]
    BadVersion(u8),

    /// The header declares a chunk size other than the fixed format constant.
    #[error("invalid chunk size {0} in header")]
    BadChunkSize(u32),

    /// The header declares zero chunks.
    #[error("container declares no chunks")]
    EmptyContainer,

    /// The file ended before a complete header or chunk record was read,
    /// or the final chunk carries more data than one chunk may hold.
    #[error("container is truncated or malformed")]
    Truncated,

    /// The source handed to the encoder was empty.
    #[error("source data is empty")]
    SourceEmpty,

    /// AES-GCM encryption of a chunk failed.
    #[error("chunk encryption failed")]
    EncryptFailed,

    /// The authentication tag of a chunk did not verify. Either the
    /// container was produced for a different device or the file was
    /// tampered with.
    #[error("chunk authentication failed (wrong device or tampered data)")]
    AuthFailed,

    /// A seek target lies beyond the last chunk.
    #[error("seek to chunk {index} out of range (total {total})")]
    SeekPastEnd { index: u32, total: u32 },

    /// An I/O error from the underlying file.
    #[error("container IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Reports whether the error is fatal for a decryptor handle.
    ///
    /// An authentication failure poisons the handle: every later read
    /// must report the same error instead of returning bytes that were
    /// never verified.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ContainerError::AuthFailed)
    }
}
