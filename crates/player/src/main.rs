//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Playback daemon and its CLI client in one binary.
//!
//! `abby-player --daemon` starts the service: the control socket runs
//! on a worker thread, the visuals host owns the main thread. Every
//! subcommand (`play`, `stop`, `status`, …) instead connects to the
//! running daemon and prints its reply.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use abby_core::hwid;
use abby_core::resources::ResourcePaths;
use abby_player::control::{self, ControlContext};
use abby_player::engine::AudioEngine;
use abby_player::sink::SinkFactory;
use abby_player::{client, visuals, SOCKET_PATH};

#[derive(Parser, Debug)]
#[command(name = "abby-player", version, about = "Hardware-bound audio player")]
struct Cli {
    /// Start the playback daemon instead of acting as a client.
    #[arg(long)]
    daemon: bool,

    /// Control socket path.
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play an encrypted container file.
    Play { file: PathBuf },
    /// Stop playback.
    Stop,
    /// Pause playback.
    Pause,
    /// Resume paused playback.
    Resume,
    /// Seek to a position in seconds.
    Seek { seconds: f32 },
    /// Set the volume (0.0..1.0), or query it when omitted.
    Volume { level: Option<f32> },
    /// Show playback status.
    Status,
    /// Control the visualizer: start, stop or status.
    Visuals { action: String },
    /// Select a shader: next, prev or a name.
    Shader { action: String },
    /// Shut the daemon down.
    Quit,
}

impl Command {
    fn as_line(&self) -> String {
        match self {
            Command::Play { file } => format!("play {}", file.display()),
            Command::Stop => "stop".to_string(),
            Command::Pause => "pause".to_string(),
            Command::Resume => "resume".to_string(),
            Command::Seek { seconds } => format!("seek {seconds}"),
            Command::Volume { level: Some(v) } => format!("volume {v}"),
            Command::Volume { level: None } => "volume".to_string(),
            Command::Status => "status".to_string(),
            Command::Visuals { action } => format!("visuals {action}"),
            Command::Shader { action } => format!("shader {action}"),
            Command::Quit => "quit".to_string(),
        }
    }
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });

    let result = if cli.daemon {
        run_daemon(&cli)
    } else {
        run_client(&cli)
    };

    if let Err(e) = result {
        eprintln!("[ERR] {e:#}");
        process::exit(1);
    }
}

fn run_client(cli: &Cli) -> Result<()> {
    let command = cli
        .command
        .as_ref()
        .context("no command given; try --daemon or a subcommand (see --help)")?;

    let reply = client::send_command(&cli.socket, &command.as_line())
        .context("cannot reach the player daemon; is it running?")?;
    println!("{reply}");
    Ok(())
}

fn run_daemon(cli: &Cli) -> Result<()> {
    println!("--- Abby Daemon Mode ---");

    let device = hwid::probe();
    println!("[SRV] Device: {device}");

    let engine = Arc::new(AudioEngine::new(device, default_sink_factory()));
    let (visuals_handle, visuals_host) = visuals::channel(discover_shaders());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            eprintln!("[SRV] Caught shutdown signal");
            running.store(false, Ordering::Release);
        })
        .context("install signal handler")?;
    }

    let server = {
        let ctx = ControlContext {
            engine: Arc::clone(&engine),
            visuals: visuals_handle,
            running: Arc::clone(&running),
        };
        let socket = cli.socket.clone();
        thread::spawn(move || {
            if let Err(e) = control::serve(&socket, &ctx) {
                eprintln!("[ERR] control socket: {e:#}");
                ctx.running.store(false, Ordering::Release);
            }
        })
    };

    // The visuals host owns the main thread (a renderer would need it).
    visuals_host.run(&running);

    server.join().ok();
    engine.stop();
    println!("[SRV] Daemon shutting down");
    Ok(())
}

fn default_sink_factory() -> SinkFactory {
    #[cfg(feature = "audio")]
    {
        Box::new(|| {
            let sink = abby_player::sink::cpal_out::CpalSink::open()?;
            Ok(Box::new(sink) as Box<dyn abby_player::sink::PcmSink>)
        })
    }
    #[cfg(not(feature = "audio"))]
    {
        abby_player::sink::NullSink::factory(true)
    }
}

fn discover_shaders() -> Vec<String> {
    let Some(dir) = ResourcePaths::discover().find_dir("shaders") else {
        return Vec::new();
    };

    let mut shaders: Vec<String> = std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let path = entry.path();
                    let ext = path.extension()?.to_str()?;
                    if ext == "frag" || ext == "glsl" {
                        path.file_stem()?.to_str().map(str::to_string)
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    shaders.sort();
    if !shaders.is_empty() {
        println!("[VIS] {} shaders available in {}", shaders.len(), dir.display());
    }
    shaders
}
