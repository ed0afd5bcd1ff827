//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Local control socket: one newline-terminated command per connection,
//! one newline-terminated reply.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::engine::AudioEngine;
use crate::visuals::VisualsHandle;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Everything a command handler may touch.
pub struct ControlContext {
    pub engine: Arc<AudioEngine>,
    pub visuals: VisualsHandle,
    pub running: Arc<AtomicBool>,
}

/// Dispatch one command line to its reply (without trailing newline).
pub fn handle_line(line: &str, ctx: &ControlContext) -> String {
    let line = line.trim();
    let (command, argument) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match command {
        "play" => {
            if argument.is_empty() {
                return "ERROR: Missing file path".to_string();
            }
            match ctx.engine.play(Path::new(argument)) {
                Ok(()) => "OK".to_string(),
                Err(e) => {
                    eprintln!("[ERR] play failed: {e:#}");
                    "ERROR: Failed to start playback".to_string()
                }
            }
        }
        "stop" => {
            ctx.engine.stop();
            "OK".to_string()
        }
        "pause" => {
            ctx.engine.pause();
            "OK".to_string()
        }
        "resume" => {
            ctx.engine.resume();
            "OK".to_string()
        }
        "seek" => match argument.parse::<f32>() {
            Ok(seconds) => match ctx.engine.seek(seconds) {
                Ok(()) => "OK".to_string(),
                Err(_) => "ERROR: Seek failed".to_string(),
            },
            Err(_) => "ERROR: Invalid seek position".to_string(),
        },
        "volume" => {
            if argument.is_empty() {
                format!("{}%", (ctx.engine.volume() * 100.0).round() as i32)
            } else {
                match argument.parse::<f32>() {
                    Ok(volume) => {
                        ctx.engine.set_volume(volume);
                        "OK".to_string()
                    }
                    Err(_) => "ERROR: Invalid volume".to_string(),
                }
            }
        }
        "status" => ctx.engine.status(),
        "visuals" => match argument {
            "start" => ctx.visuals.start(),
            "stop" => ctx.visuals.stop(),
            "status" => ctx.visuals.status(),
            _ => "ERROR: visuals expects start|stop|status".to_string(),
        },
        "shader" => ctx.visuals.shader(argument),
        "quit" => {
            ctx.running.store(false, Ordering::Release);
            "SHUTTING DOWN".to_string()
        }
        _ => "UNKNOWN COMMAND".to_string(),
    }
}

/// Accept loop over the unix control socket. Returns when `running`
/// goes false; removes the socket file on the way out.
pub fn serve(socket_path: &Path, ctx: &ControlContext) -> Result<()> {
    // A previous daemon may have left its socket behind.
    let _ = fs::remove_file(socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("bind control socket {}", socket_path.display()))?;
    listener.set_nonblocking(true)?;
    println!("[SRV] Listening on {}", socket_path.display());

    while ctx.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = handle_connection(stream, ctx) {
                    eprintln!("[WARN] control client error: {e}");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => return Err(e).context("accept on control socket"),
        }
    }

    let _ = fs::remove_file(socket_path);
    println!("[SRV] Control socket closed");
    Ok(())
}

fn handle_connection(stream: UnixStream, ctx: &ControlContext) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(());
    }

    let reply = handle_line(&line, ctx);
    let mut stream = reader.into_inner();
    stream.write_all(reply.as_bytes())?;
    stream.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::send_command;
    use crate::sink::NullSink;
    use crate::visuals;
    use abby_core::container::{encrypt_file, CHUNK_SIZE};
    use abby_core::hwid::DeviceId;
    use std::fs;

    fn context() -> ControlContext {
        let engine = AudioEngine::new(
            DeviceId::from("MACHINE_control_tests"),
            NullSink::factory(false),
        );
        let (visuals, _host) = visuals::channel(vec![]);
        ControlContext {
            engine: Arc::new(engine),
            visuals,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    #[test]
    fn unknown_commands_are_reported() {
        let ctx = context();
        assert_eq!(handle_line("dance", &ctx), "UNKNOWN COMMAND");
    }

    #[test]
    fn status_and_volume_queries() {
        let ctx = context();
        assert_eq!(handle_line("status", &ctx), "STOPPED");
        assert_eq!(handle_line("volume", &ctx), "100%");
        assert_eq!(handle_line("volume 0.5", &ctx), "OK");
        assert_eq!(handle_line("volume", &ctx), "50%");
        assert_eq!(handle_line("volume much", &ctx), "ERROR: Invalid volume");
    }

    #[test]
    fn play_validates_arguments_and_paths() {
        let ctx = context();
        assert_eq!(handle_line("play", &ctx), "ERROR: Missing file path");
        assert_eq!(
            handle_line("play /no/such/file.pira", &ctx),
            "ERROR: Failed to start playback"
        );
    }

    #[test]
    fn quit_clears_the_running_flag() {
        let ctx = context();
        assert_eq!(handle_line("quit", &ctx), "SHUTTING DOWN");
        assert!(!ctx.running.load(Ordering::Acquire));
    }

    #[test]
    fn seek_without_track_fails() {
        let ctx = context();
        assert_eq!(handle_line("seek 3.5", &ctx), "ERROR: Seek failed");
        assert_eq!(handle_line("seek soon", &ctx), "ERROR: Invalid seek position");
    }

    #[test]
    fn socket_round_trip_with_real_playback() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("abby-test.sock");

        // A one-second track bound to the test device.
        let src = dir.path().join("plain.bin");
        let track = dir.path().join("track.pira");
        fs::write(&src, vec![1u8; CHUNK_SIZE]).unwrap();
        encrypt_file(&src, &track, &DeviceId::from("MACHINE_control_tests")).unwrap();

        let ctx = context();
        let running = Arc::clone(&ctx.running);
        let server_socket = socket_path.clone();
        let server = thread::spawn(move || serve(&server_socket, &ctx).unwrap());

        // Wait for the socket to appear.
        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(send_command(&socket_path, "status").unwrap(), "STOPPED");
        let play = format!("play {}", track.display());
        assert_eq!(send_command(&socket_path, &play).unwrap(), "OK");
        assert_eq!(send_command(&socket_path, "nonsense").unwrap(), "UNKNOWN COMMAND");

        running.store(false, Ordering::Release);
        server.join().unwrap();
        assert!(!socket_path.exists());
    }
}
