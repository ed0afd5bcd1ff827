//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Connector daemon entry point.
//!
//! Loads the catalog and the token public key (explicit paths or the
//! resource search order), connects to the player daemon, then serves
//! the broker protocol over TCP — or an interactive stdin loop with
//! `--debug`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use abby_connector::broker::{Broker, Session, SocketPlayer};
use abby_connector::catalog::Catalog;
use abby_connector::token::TokenValidator;
use abby_connector::DEFAULT_PORT;
use abby_core::resources::ResourcePaths;

#[derive(Parser, Debug)]
#[command(
    name = "abby-connector",
    version,
    about = "Token-gated access broker for the abby player"
)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value_t = default_listen())]
    listen: SocketAddr,

    /// Catalog file; defaults to catalog.json from the resource paths.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// PEM public key for token validation; defaults to keys/public.pem
    /// from the resource paths.
    #[arg(long)]
    public_key: Option<PathBuf>,

    /// Control socket of the player daemon.
    #[arg(long, default_value = abby_player::SOCKET_PATH)]
    player_socket: PathBuf,

    /// Interactive command loop on stdin instead of the TCP server.
    #[arg(long)]
    debug: bool,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn main() {
    let args = Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });

    if let Err(e) = run(args) {
        eprintln!("[ERR] {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    println!("[SRV] AbbyConnector starting...");
    let resources = ResourcePaths::discover();

    let catalog_path = args
        .catalog
        .clone()
        .or_else(|| resources.find_file("catalog.json"))
        .ok_or_else(|| anyhow!("no catalog.json found (set --catalog)"))?;
    let catalog = Catalog::load(&catalog_path)
        .with_context(|| format!("load catalog {}", catalog_path.display()))?;
    println!(
        "[CAT] Loaded {} tracks from {}",
        catalog.len(),
        catalog_path.display()
    );

    let key_path = args
        .public_key
        .clone()
        .or_else(|| resources.find_file("keys/public.pem"))
        .ok_or_else(|| anyhow!("no keys/public.pem found (set --public-key)"))?;
    let validator = TokenValidator::from_pem_file(&key_path)
        .with_context(|| format!("load public key {}", key_path.display()))?;
    println!("[AUTH] Public key: {}", key_path.display());

    let player = SocketPlayer::new(&args.player_socket);
    match abby_player::client::send_command(&args.player_socket, "status") {
        Ok(status) => println!("[SRV] Player daemon reachable ({status})"),
        Err(_) => eprintln!("[WARN] Player daemon not reachable. Is it running?"),
    }

    let broker = Arc::new(Broker::new(validator, catalog, Box::new(player)));

    {
        let running = Arc::clone(broker.running());
        ctrlc::set_handler(move || {
            eprintln!("[SRV] Caught shutdown signal");
            running.store(false, Ordering::Release);
        })
        .context("install signal handler")?;
    }

    if args.debug {
        return run_debug(&broker);
    }

    let listener = TcpListener::bind(args.listen)
        .with_context(|| format!("bind broker socket {}", args.listen))?;
    broker.serve(listener)
}

/// Interactive mode: one session on stdin, replies on stdout.
fn run_debug(broker: &Broker) -> Result<()> {
    println!();
    println!("[SRV] DEBUG MODE - Interactive CLI");
    println!("========================================");
    println!("  AUTH <token>              Authenticate");
    println!("  PLAY <code>               Play a catalog track");
    println!("  STOP / PAUSE / RESUME     Playback control");
    println!("  SEEK <seconds>            Seek");
    println!("  VOLUME <0.0-1.0>          Set volume");
    println!("  STATUS                    Playback status");
    println!("  PLAYLIST_ADD <code>       Queue a track");
    println!("  PLAYLIST_GET              Show the queue");
    println!("  PLAYLIST_NEXT / _PREV     Navigate the queue");
    println!("  PLAYLIST_SHUFFLE on|off   Toggle shuffle");
    println!("  PLAYLIST_REPEAT none|one|all");
    println!("  CATALOG_LIST              List known tracks");
    println!("  quit / exit               Leave debug mode");
    println!("========================================");

    let stdin = io::stdin();
    let mut session = Session::default();

    loop {
        print!("\nabby> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        println!("{}", broker.handle_command(line, &mut session));

        if !broker.running().load(Ordering::Acquire) {
            break;
        }
    }

    println!("[SRV] Leaving debug mode");
    Ok(())
}
