//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! The "PIRA" v2 container format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic[4]="PIRA" | version[1]=0x02 | n_chunks[u32] | chunk_size[u32]
//! ( nonce[12] | tag[16] | ciphertext[chunk_size or remainder] ) × n_chunks
//! ```
//!
//! Each chunk holds one second of 44.1 kHz stereo 16-bit PCM-equivalent
//! data (176 400 bytes), though the payload is treated as opaque bytes.
//! Interior chunks are exactly `chunk_size` ciphertext bytes; the final
//! chunk runs to end-of-file and must be between 1 and `chunk_size`
//! bytes. Anything longer is rejected as malformed rather than silently
//! skipped.
//!
//! The format is not a general archive: no patching, no key rotation,
//! one track per file.

use crate::aeadbox::{self, NONCE_LEN, TAG_LEN};
use crate::error::ContainerError;
use crate::hwid::DeviceId;
use crate::kdf::ContentKey;

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"PIRA";
pub const VERSION: u8 = 2;

/// Fixed chunk payload size: one second of 44.1 kHz stereo 16-bit PCM.
pub const CHUNK_SIZE: usize = 176_400;

/// Header length in bytes.
pub const HEADER_LEN: usize = 13;

/// Per-chunk framing overhead (nonce plus tag).
pub const RECORD_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// The fixed 13-byte container header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContainerHeader {
    pub n_chunks: u32,
    pub chunk_size: u32,
}

impl ContainerHeader {
    /// Serialize deterministically to the fixed 13-byte header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(MAGIC);
        out[4] = VERSION;
        out[5..9].copy_from_slice(&self.n_chunks.to_le_bytes());
        out[9..13].copy_from_slice(&self.chunk_size.to_le_bytes());
        out
    }

    /// Parse and validate a header.
    ///
    /// Enforces the format invariants: magic, version 2, at least one
    /// chunk, and the fixed chunk size.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Result<Self, ContainerError> {
        if &bytes[0..4] != MAGIC {
            return Err(ContainerError::BadMagic);
        }
        if bytes[4] != VERSION {
            return Err(ContainerError::BadVersion(bytes[4]));
        }

        let n_chunks = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        let chunk_size = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);

        if n_chunks == 0 {
            return Err(ContainerError::EmptyContainer);
        }
        if chunk_size as usize != CHUNK_SIZE {
            return Err(ContainerError::BadChunkSize(chunk_size));
        }

        Ok(Self { n_chunks, chunk_size })
    }
}

/// One encrypted chunk record as stored on disk.
pub struct ChunkRecord {
    pub index: u32,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `source` into the container format, writing to `out`.
///
/// The source is split into `ceil(len / CHUNK_SIZE)` slices (the last
/// may be short), each sealed under a fresh random nonce. Returns the
/// number of chunks written.
pub fn write_container<W: Write>(
    out: &mut W,
    key: &ContentKey,
    source: &[u8],
) -> Result<u32, ContainerError> {
    if source.is_empty() {
        return Err(ContainerError::SourceEmpty);
    }

    let n_chunks = source.len().div_ceil(CHUNK_SIZE) as u32;
    let header = ContainerHeader {
        n_chunks,
        chunk_size: CHUNK_SIZE as u32,
    };
    out.write_all(&header.to_bytes())?;

    for slice in source.chunks(CHUNK_SIZE) {
        let (nonce, tag, ciphertext) = aeadbox::seal_chunk(key, slice)?;
        out.write_all(&nonce)?;
        out.write_all(&tag)?;
        out.write_all(&ciphertext)?;
    }

    Ok(n_chunks)
}

/// Encrypt a source file into a container bound to `device`.
///
/// Convenience wrapper used by the provider-side encoder tool: reads
/// the whole source, derives the key, writes `dst`.
pub fn encrypt_file(src: &Path, dst: &Path, device: &DeviceId) -> Result<u32, ContainerError> {
    let source = std::fs::read(src)?;
    if source.is_empty() {
        return Err(ContainerError::SourceEmpty);
    }

    let key = ContentKey::derive(device);
    let mut out = BufWriter::new(File::create(dst)?);
    let n_chunks = write_container(&mut out, &key, &source)?;
    out.flush()?;
    Ok(n_chunks)
}

/// Random-access reader over the encrypted chunk records of a container.
///
/// The handle owns the read position; there is no process-wide codec
/// state. Records come back still encrypted — the caller pairs this
/// with a [`ContentKey`] (see [`crate::decryptor::StreamDecryptor`]).
pub struct ContainerReader {
    file: File,
    header: ContainerHeader,
    next_chunk: u32,
}

impl ContainerReader {
    /// Open a container and validate its header.
    ///
    /// A file failing validation never yields a usable handle.
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let mut file = File::open(path)?;

        let mut header_bytes = [0u8; HEADER_LEN];
        read_exact_or_truncated(&mut file, &mut header_bytes)?;
        let header = ContainerHeader::from_bytes(&header_bytes)?;

        Ok(Self {
            file,
            header,
            next_chunk: 0,
        })
    }

    pub fn total_chunks(&self) -> u32 {
        self.header.n_chunks
    }

    /// Index of the next chunk [`Self::read_next`] will return.
    pub fn current_chunk(&self) -> u32 {
        self.next_chunk
    }

    /// Reposition so the next read returns chunk `index`.
    ///
    /// `index == total_chunks` is legal and means end-of-file.
    pub fn seek_to(&mut self, index: u32) -> Result<(), ContainerError> {
        if index > self.header.n_chunks {
            return Err(ContainerError::SeekPastEnd {
                index,
                total: self.header.n_chunks,
            });
        }
        self.next_chunk = index;
        Ok(())
    }

    /// Read the next encrypted chunk record, or `None` at end-of-file.
    ///
    /// Interior chunks must be exactly `chunk_size` ciphertext bytes.
    /// The final chunk runs to end-of-file; a final chunk longer than
    /// `chunk_size` means trailing garbage and is rejected.
    pub fn read_next(&mut self) -> Result<Option<ChunkRecord>, ContainerError> {
        if self.next_chunk >= self.header.n_chunks {
            return Ok(None);
        }

        let index = self.next_chunk;
        let offset = HEADER_LEN as u64
            + index as u64 * (RECORD_OVERHEAD as u64 + self.header.chunk_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut nonce = [0u8; NONCE_LEN];
        read_exact_or_truncated(&mut self.file, &mut nonce)?;
        let mut tag = [0u8; TAG_LEN];
        read_exact_or_truncated(&mut self.file, &mut tag)?;

        let ciphertext = if index + 1 < self.header.n_chunks {
            let mut buf = vec![0u8; self.header.chunk_size as usize];
            read_exact_or_truncated(&mut self.file, &mut buf)?;
            buf
        } else {
            let mut buf = Vec::with_capacity(self.header.chunk_size as usize);
            self.file.read_to_end(&mut buf)?;
            if buf.is_empty() || buf.len() > self.header.chunk_size as usize {
                return Err(ContainerError::Truncated);
            }
            buf
        };

        self.next_chunk = index + 1;
        Ok(Some(ChunkRecord {
            index,
            nonce,
            tag,
            ciphertext,
        }))
    }
}

fn read_exact_or_truncated(file: &mut File, buf: &mut [u8]) -> Result<(), ContainerError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ContainerError::Truncated
        } else {
            ContainerError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn device() -> DeviceId {
        DeviceId::from("MACHINE_container_tests")
    }

    fn write_temp_container(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.pira");
        let key = ContentKey::derive(&device());
        let mut out = Vec::new();
        write_container(&mut out, &key, data).unwrap();
        fs::write(&path, out).unwrap();
        (dir, path)
    }

    #[test]
    fn header_round_trip() {
        let header = ContainerHeader {
            n_chunks: 7,
            chunk_size: CHUNK_SIZE as u32,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(ContainerHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = ContainerHeader {
            n_chunks: 1,
            chunk_size: CHUNK_SIZE as u32,
        }
        .to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(ContainerError::BadMagic)
        ));
    }

    #[test]
    fn header_rejects_wrong_version() {
        let mut bytes = ContainerHeader {
            n_chunks: 1,
            chunk_size: CHUNK_SIZE as u32,
        }
        .to_bytes();
        bytes[4] = 1;
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(ContainerError::BadVersion(1))
        ));
    }

    #[test]
    fn header_rejects_zero_chunks_and_odd_chunk_size() {
        let mut bytes = ContainerHeader {
            n_chunks: 0,
            chunk_size: CHUNK_SIZE as u32,
        }
        .to_bytes();
        // n_chunks already zero
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(ContainerError::EmptyContainer)
        ));

        bytes[5..9].copy_from_slice(&1u32.to_le_bytes());
        bytes[9..13].copy_from_slice(&4096u32.to_le_bytes());
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(ContainerError::BadChunkSize(4096))
        ));
    }

    #[test]
    fn encoder_rejects_empty_source() {
        let key = ContentKey::derive(&device());
        let mut out = Vec::new();
        assert!(matches!(
            write_container(&mut out, &key, &[]),
            Err(ContainerError::SourceEmpty)
        ));
    }

    #[test]
    fn open_rejects_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.pira");
        fs::write(&path, b"PIRA\x02").unwrap();
        assert!(matches!(
            ContainerReader::open(&path),
            Err(ContainerError::Truncated)
        ));
    }

    #[test]
    fn interior_chunks_are_full_size_on_disk() {
        let data = vec![0x42u8; CHUNK_SIZE + 1];
        let (_dir, path) = write_temp_container(&data);

        let expected =
            HEADER_LEN as u64 + 2 * (RECORD_OVERHEAD as u64) + CHUNK_SIZE as u64 + 1;
        assert_eq!(fs::metadata(&path).unwrap().len(), expected);

        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.total_chunks(), 2);
        let first = reader.read_next().unwrap().unwrap();
        assert_eq!(first.ciphertext.len(), CHUNK_SIZE);
        let last = reader.read_next().unwrap().unwrap();
        assert_eq!(last.ciphertext.len(), 1);
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn truncated_interior_chunk_is_detected() {
        let data = vec![0x42u8; CHUNK_SIZE + 10];
        let (_dir, path) = write_temp_container(&data);

        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..HEADER_LEN + RECORD_OVERHEAD + 100]).unwrap();

        let mut reader = ContainerReader::open(&path).unwrap();
        assert!(matches!(
            reader.read_next(),
            Err(ContainerError::Truncated)
        ));
    }

    #[test]
    fn oversized_final_chunk_is_rejected() {
        let data = vec![0x42u8; 100];
        let (_dir, path) = write_temp_container(&data);

        let mut full = fs::read(&path).unwrap();
        full.extend_from_slice(&vec![0u8; CHUNK_SIZE]);
        fs::write(&path, &full).unwrap();

        let mut reader = ContainerReader::open(&path).unwrap();
        assert!(matches!(
            reader.read_next(),
            Err(ContainerError::Truncated)
        ));
    }

    #[test]
    fn seek_to_bounds() {
        let data = vec![1u8; CHUNK_SIZE * 2];
        let (_dir, path) = write_temp_container(&data);

        let mut reader = ContainerReader::open(&path).unwrap();
        reader.seek_to(2).unwrap();
        assert!(reader.read_next().unwrap().is_none());

        assert!(matches!(
            reader.seek_to(3),
            Err(ContainerError::SeekPastEnd { index: 3, total: 2 })
        ));

        reader.seek_to(1).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap().index, 1);
    }

    #[test]
    fn nonces_are_pairwise_distinct_across_a_file() {
        let data = vec![7u8; CHUNK_SIZE * 4 + 123];
        let (_dir, path) = write_temp_container(&data);

        let mut reader = ContainerReader::open(&path).unwrap();
        let mut nonces = Vec::new();
        while let Some(record) = reader.read_next().unwrap() {
            nonces.push(record.nonce);
        }
        assert_eq!(nonces.len(), 5);
        for i in 0..nonces.len() {
            for j in (i + 1)..nonces.len() {
                assert_ne!(nonces[i], nonces[j], "nonce reuse between chunks {i} and {j}");
            }
        }
    }
}
