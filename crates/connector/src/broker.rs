//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! The command broker: line protocol, per-connection sessions and the
//! authorization gate in front of the player.
//!
//! Session state machine: a fresh connection may only `AUTH`; every
//! other command answers `ERROR: Not authenticated` until a token
//! validates. `PLAY <code>` then runs the gate in order — token expiry,
//! catalog resolution, capability check — and only a fully authorized
//! request is forwarded to the player daemon. Authorization failures
//! never disturb ongoing playback, and playback failures never touch
//! the session.

use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::playlist::{Playlist, RepeatMode};
use crate::token::{Claims, TokenValidator};

/// Socket send/receive timeout; a silent peer is disconnected.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Clock used for expiry checks, injectable for tests.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Transport to the player daemon. The broker only ever speaks lines.
pub trait PlayerLink: Send + Sync {
    fn send(&self, command: &str) -> io::Result<String>;
}

/// Production link: the player's unix control socket.
pub struct SocketPlayer {
    socket: PathBuf,
}

impl SocketPlayer {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

impl PlayerLink for SocketPlayer {
    fn send(&self, command: &str) -> io::Result<String> {
        abby_player::client::send_command(&self.socket, command)
    }
}

/// Per-connection authentication state. Never shared between peers.
#[derive(Default)]
pub struct Session {
    claims: Option<Claims>,
}

impl Session {
    fn authenticated(&self) -> bool {
        self.claims.is_some()
    }
}

/// The broker itself: validator, catalog and playlist are shared
/// read-mostly state; sessions stay with their connections.
pub struct Broker {
    validator: TokenValidator,
    catalog: Catalog,
    player: Box<dyn PlayerLink>,
    playlist: Mutex<Playlist>,
    running: Arc<AtomicBool>,
    clock: Clock,
}

impl Broker {
    pub fn new(validator: TokenValidator, catalog: Catalog, player: Box<dyn PlayerLink>) -> Self {
        Self::with_clock(
            validator,
            catalog,
            player,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    pub fn with_clock(
        validator: TokenValidator,
        catalog: Catalog,
        player: Box<dyn PlayerLink>,
        clock: Clock,
    ) -> Self {
        Self {
            validator,
            catalog,
            player,
            playlist: Mutex::new(Playlist::new()),
            running: Arc::new(AtomicBool::new(true)),
            clock,
        }
    }

    pub fn running(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    /// Dispatch one command line to its reply (no trailing newline).
    pub fn handle_command(&self, line: &str, session: &mut Session) -> String {
        let line = line.trim();
        if line.is_empty() {
            return String::new();
        }
        let (command, argument) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match command {
            "AUTH" => self.cmd_auth(argument, session),
            _ if !session.authenticated() => "ERROR: Not authenticated".to_string(),

            "QUIT" => {
                self.running.store(false, Ordering::Release);
                "OK: Shutting down".to_string()
            }
            "PLAY" => self.cmd_play(argument, session),
            "STOP" => self.forward("stop", "OK"),
            "PAUSE" => self.forward("pause", "OK"),
            "RESUME" => self.forward("resume", "OK"),
            "SEEK" => match argument.parse::<f32>() {
                Ok(seconds) => self.forward(&format!("seek {seconds}"), "OK"),
                Err(_) => "ERROR: Invalid seek position".to_string(),
            },
            "VOLUME" => match argument.parse::<f32>() {
                Ok(volume) => self.forward(&format!("volume {volume}"), &format!("OK: Volume {volume}")),
                Err(_) => "ERROR: Invalid volume".to_string(),
            },
            "STATUS" => match self.player.send("status") {
                Ok(reply) => reply,
                Err(_) => "ERROR: Player unavailable".to_string(),
            },

            "PLAYLIST_ADD" => {
                if argument.is_empty() {
                    return "ERROR: Missing track code".to_string();
                }
                self.playlist.lock().unwrap().add(argument);
                format!("OK: Added {argument} to playlist")
            }
            "PLAYLIST_REMOVE" => match argument.parse::<usize>() {
                Ok(index) if self.playlist.lock().unwrap().remove(index) => {
                    format!("OK: Removed track at index {index}")
                }
                Ok(_) => "ERROR: Invalid playlist index".to_string(),
                Err(_) => "ERROR: Invalid playlist index".to_string(),
            },
            "PLAYLIST_CLEAR" => {
                self.playlist.lock().unwrap().clear();
                "OK: Playlist cleared".to_string()
            }
            "PLAYLIST_GET" => self.playlist.lock().unwrap().to_json(),
            "PLAYLIST_NEXT" => {
                let next = self.playlist.lock().unwrap().next_track();
                match next {
                    Some(code) => self.cmd_play(&code, session),
                    None => "OK: End of playlist".to_string(),
                }
            }
            "PLAYLIST_PREV" => {
                let prev = self.playlist.lock().unwrap().prev_track();
                match prev {
                    Some(code) => self.cmd_play(&code, session),
                    None => "OK: Start of playlist".to_string(),
                }
            }
            "PLAYLIST_SHUFFLE" => match argument {
                "on" => {
                    self.playlist.lock().unwrap().set_shuffle(true);
                    "OK: Shuffle enabled".to_string()
                }
                "off" => {
                    self.playlist.lock().unwrap().set_shuffle(false);
                    "OK: Shuffle disabled".to_string()
                }
                _ => "ERROR: Shuffle expects on|off".to_string(),
            },
            "PLAYLIST_REPEAT" => match argument.parse::<RepeatMode>() {
                Ok(mode) => {
                    self.playlist.lock().unwrap().set_repeat(mode);
                    format!("OK: Repeat mode set to {}", mode.as_str())
                }
                Err(()) => "ERROR: Repeat expects none|one|all".to_string(),
            },

            "CATALOG_LIST" => self.catalog.to_json(),

            _ => "ERROR: Unknown command".to_string(),
        }
    }

    fn cmd_auth(&self, token: &str, session: &mut Session) -> String {
        match self.validator.validate_at(token, (self.clock)()) {
            Ok(claims) => {
                let expires = claims
                    .exp()
                    .map(|exp| exp.to_string())
                    .unwrap_or_else(|| "never".to_string());
                session.claims = Some(claims);
                format!("OK: Authenticated. Expires: {expires}")
            }
            Err(e) => {
                session.claims = None;
                format!("ERROR: {e}")
            }
        }
    }

    /// The authorization gate. Order matters: expiry, then resolution,
    /// then capability — and only then does the player hear about it.
    fn cmd_play(&self, code: &str, session: &mut Session) -> String {
        let Some(claims) = session.claims.as_ref() else {
            return "ERROR: Not authenticated".to_string();
        };

        if let Some(exp) = claims.exp() {
            if (self.clock)() > exp {
                return "ERROR: License expired".to_string();
            }
        }

        let Some(track) = self.catalog.resolve(code) else {
            return "ERROR: Track code not found".to_string();
        };

        if let Some(required) = track.required_permission.as_deref() {
            if !claims.has_permission(required) {
                return format!("ERROR: Permission denied for {required}");
            }
        }

        println!("[PLAY] Forwarding to daemon: {}", track.path);
        match self.player.send(&format!("play {}", track.path)) {
            Ok(reply) if reply.starts_with("OK") => format!("OK: Playing {code}"),
            Ok(_) | Err(_) => "ERROR: Failed to start playback".to_string(),
        }
    }

    fn forward(&self, command: &str, ok_reply: &str) -> String {
        match self.player.send(command) {
            Ok(reply) if reply.starts_with("OK") => ok_reply.to_string(),
            Ok(reply) if reply.starts_with("ERROR") => reply,
            Ok(_) => ok_reply.to_string(),
            Err(_) => "ERROR: Player unavailable".to_string(),
        }
    }

    /// Accept loop. One thread per connection; returns after `QUIT` or
    /// an external clear of the running flag.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true)?;
        println!("[SRV] Listening on {}", listener.local_addr()?);

        let mut clients = Vec::new();
        while self.running.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let broker = Arc::clone(&self);
                    clients.push(thread::spawn(move || {
                        match broker.handle_client(stream, peer) {
                            Ok(()) => println!("[SRV] <{peer}> Disconnected"),
                            Err(e) => eprintln!("[WARN] <{peer}> Client error: {e}"),
                        }
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e).context("accept on broker socket"),
            }
        }

        for client in clients {
            let _ = client.join();
        }
        println!("[SRV] Broker stopped");
        Ok(())
    }

    fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        println!("[SRV] <{peer}> Connected");
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
        stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;

        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut session = Session::default();
        let mut line = String::new();

        while self.running.load(Ordering::Acquire) {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // Idle past the receive timeout: drop the peer.
                    break;
                }
                Err(e) => return Err(e),
            }

            let reply = self.handle_command(&line, &mut session);
            writer.write_all(reply.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}
