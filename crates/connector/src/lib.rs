//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! # Abby Connector
//!
//! The token-gated command broker in front of the playback daemon.
//! Clients authenticate with a short-lived signed capability token
//! (`AUTH <token>`); only then may they resolve catalog codes and
//! start playback (`PLAY <code>`), which the broker forwards to the
//! player's control socket after checking expiry and permissions.
//!
//! - [`token`] — capability token validation (RSA/ECDSA over SHA-256)
//! - [`catalog`] — the code → track mapping loaded at startup
//! - [`playlist`] — queue with shuffle and repeat modes
//! - [`broker`] — the line protocol, sessions and the authorization gate

pub mod broker;
pub mod catalog;
pub mod playlist;
pub mod token;

/// Default TCP port of the broker socket.
pub const DEFAULT_PORT: u16 = 5000;
