//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! # Abby Player
//!
//! Playback daemon for PIRA containers. The daemon owns one
//! [`engine::AudioEngine`] driving the core decryption pipeline into a
//! PCM sink, and answers line commands on a local control socket
//! (`play`, `stop`, `pause`, `resume`, `seek`, `volume`, `status`,
//! `visuals`, `shader`, `quit`).
//!
//! The same binary doubles as the client: every subcommand is sent to
//! the running daemon over the socket via [`client::send_command`].

pub mod client;
pub mod control;
pub mod engine;
pub mod sink;
pub mod visuals;

/// Default control socket path, shared with the connector.
pub const SOCKET_PATH: &str = "/tmp/abby.sock";
