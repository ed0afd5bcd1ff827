//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Line client for the control socket, shared by the CLI subcommands
//! and the connector daemon.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Send one command to the player daemon and return its reply line
/// (without the trailing newline).
pub fn send_command(socket_path: &Path, command: &str) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket_path)?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    stream.set_write_timeout(Some(REPLY_TIMEOUT))?;

    stream.write_all(command.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply)?;
    Ok(reply.trim_end().to_string())
}

/// Whether a daemon reply means the command took effect.
pub fn is_ok(reply: &str) -> bool {
    reply.starts_with("OK") || !reply.starts_with("ERROR")
}
