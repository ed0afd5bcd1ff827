//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! # Abby Core
//!
//! Hardware-bound chunked encryption container ("PIRA" v2) and the
//! streaming decryption pipeline that feeds an audio sink.
//!
//! A content provider encrypts a track for one specific device: the
//! 256-bit content key is derived from the device's stable hardware
//! identifier, and every chunk of the container is independently
//! authenticated with AES-256-GCM. A container produced for one device
//! fails authentication on every other device.
//!
//! ## Architecture
//!
//! - [`hwid`] — stable device identifier probe
//! - [`kdf`] — content key derivation (PBKDF2-HMAC-SHA256)
//! - [`aeadbox`] — per-chunk AES-256-GCM seal/open with detached tag
//! - [`container`] — the on-disk container format and record reader
//! - [`decryptor`] — key-scoped streaming decryptor handle
//! - [`buffer`] — bounded producer/consumer chunk queue
//! - [`reader`] — `Read + Seek` adapter the audio decoder pulls from
//! - [`pipeline`] — producer thread wiring decryptor and buffer
//! - [`resources`] — resource path resolution for catalogs and assets
//!
//! ## Quick start
//!
//! ```no_run
//! use abby_core::container::encrypt_file;
//! use abby_core::decryptor::decrypt_to_memory;
//! use abby_core::hwid::DeviceId;
//!
//! # fn main() -> Result<(), abby_core::ContainerError> {
//! let device = DeviceId::from("MACHINE_abc");
//! encrypt_file("track.mp3".as_ref(), "track.pira".as_ref(), &device)?;
//! let plain = decrypt_to_memory("track.pira".as_ref(), &device)?;
//! # let _ = plain;
//! # Ok(())
//! # }
//! ```

pub mod aeadbox;
pub mod buffer;
pub mod container;
pub mod decryptor;
pub mod error;
pub mod hwid;
pub mod kdf;
pub mod pipeline;
pub mod reader;
pub mod resources;

pub use buffer::{BufferedChunk, RollingBuffer, MAX_BUFFERED_CHUNKS};
pub use container::{ContainerHeader, ContainerReader, CHUNK_SIZE, HEADER_LEN};
pub use decryptor::{decrypt_to_memory, StreamDecryptor};
pub use error::ContainerError;
pub use hwid::DeviceId;
pub use kdf::ContentKey;
pub use pipeline::Pipeline;
pub use reader::ChunkStreamReader;
pub use resources::ResourcePaths;
