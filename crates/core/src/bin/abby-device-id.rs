//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Provisioning helper: print this device's identifier so a provider
//! can encrypt content for it.

use clap::Parser;

use abby_core::hwid;
use abby_core::kdf::ContentKey;

#[derive(Parser, Debug)]
#[command(
    name = "abby-device-id",
    version,
    about = "Print the hardware identifier content is bound to"
)]
struct Args {
    /// Also print a SHA-256 fingerprint of the derived content key
    /// (the key itself is never printed)
    #[arg(long)]
    fingerprint: bool,
}

fn main() {
    let args = Args::parse();
    let device = hwid::probe();

    println!("=== Abby Device Key ===");
    println!("Hardware ID: {device}");
    if args.fingerprint {
        let key = ContentKey::derive(&device);
        println!("Key fingerprint (SHA-256): {}", key.fingerprint());
    }
    println!();
    println!("Encrypt files for this device with:");
    println!("  abby-encrypt input.mp3 output.pira --device-id {device}");
}
