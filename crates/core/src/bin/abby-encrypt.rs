//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Provider-side encoder: wrap a source file into a PIRA v2 container
//! bound to one device.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use abby_core::container::encrypt_file;
use abby_core::hwid::{self, DeviceId};

#[derive(Parser, Debug)]
#[command(
    name = "abby-encrypt",
    version,
    about = "Encrypt an audio file for a specific target device"
)]
struct Args {
    /// Source file (mp3/wav/raw — treated as opaque bytes)
    input: PathBuf,

    /// Output container file (conventionally .pira)
    output: PathBuf,

    /// Target device identifier; defaults to this machine's probe
    #[arg(short, long)]
    device_id: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let device = match args.device_id {
        Some(id) => DeviceId::from(id),
        None => {
            let probed = hwid::probe();
            println!("[KEY] Using local hardware ID: {probed}");
            probed
        }
    };

    let n_chunks = encrypt_file(&args.input, &args.output, &device)
        .with_context(|| format!("encrypt {}", args.input.display()))?;

    println!(
        "[OK] Encrypted {} -> {} ({} chunks) for {}",
        args.input.display(),
        args.output.display(),
        n_chunks,
        device
    );
    Ok(())
}
