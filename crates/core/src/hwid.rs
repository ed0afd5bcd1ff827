//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Stable device identifier probe.
//!
//! The probe consults a fixed list of sources in order and returns the
//! first non-empty value, prefixed with an origin tag so that the same
//! raw value read from two different sources can never collide.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier returned when every hardware source fails.
///
/// Development convenience only. A fleet of devices falling back to this
/// value would share one content key, so production deployments must
/// treat the fallback as a provisioning error.
pub const FALLBACK_ID: &str = "DEV_HW_ID_123456789";

/// CPU serial value some boards report before the firmware assigns one.
const CPU_SERIAL_SENTINEL: &str = "0000000000000000";

/// A stable per-device identifier string.
///
/// Probed once at process start and immutable afterwards. The content
/// key is a pure function of this value ([`crate::kdf::ContentKey::derive`]).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filesystem locations the probe reads, overridable for tests.
#[derive(Clone, Debug)]
pub struct ProbePaths {
    pub machine_id: PathBuf,
    pub dbus_machine_id: PathBuf,
    pub cpuinfo: PathBuf,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            machine_id: PathBuf::from("/etc/machine-id"),
            dbus_machine_id: PathBuf::from("/var/lib/dbus/machine-id"),
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
        }
    }
}

/// Probe the platform for a stable device identifier.
///
/// Source order: `/etc/machine-id` (`MACHINE_` prefix), the secondary
/// D-Bus machine-id location (`DBUS_`), then the CPU serial field of
/// `/proc/cpuinfo` (`CPU_`, Raspberry Pi class boards). If every source
/// fails a fixed development identifier is returned and a warning is
/// printed to stderr.
pub fn probe() -> DeviceId {
    probe_with(&ProbePaths::default())
}

/// Probe using explicit source locations. See [`probe`].
pub fn probe_with(paths: &ProbePaths) -> DeviceId {
    if let Some(id) = read_first_line(&paths.machine_id) {
        return DeviceId(format!("MACHINE_{id}"));
    }

    if let Some(id) = read_first_line(&paths.dbus_machine_id) {
        return DeviceId(format!("DBUS_{id}"));
    }

    if let Some(serial) = read_cpu_serial(&paths.cpuinfo) {
        return DeviceId(format!("CPU_{serial}"));
    }

    eprintln!("[WARN] hwid: no hardware identifier source available, using development fallback");
    DeviceId(FALLBACK_ID.to_string())
}

fn read_first_line(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

fn read_cpu_serial(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    for line in content.lines() {
        if !line.starts_with("Serial") {
            continue;
        }
        let Some((_, value)) = line.split_once(':') else {
            continue;
        };
        let serial = value.trim();
        if !serial.is_empty() && serial != CPU_SERIAL_SENTINEL {
            return Some(serial.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn paths_in(dir: &Path) -> ProbePaths {
        ProbePaths {
            machine_id: dir.join("machine-id"),
            dbus_machine_id: dir.join("dbus-machine-id"),
            cpuinfo: dir.join("cpuinfo"),
        }
    }

    #[test]
    fn machine_id_wins_over_other_sources() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.machine_id, "abcdef123456\n").unwrap();
        fs::write(&paths.dbus_machine_id, "ignored\n").unwrap();

        assert_eq!(probe_with(&paths).as_str(), "MACHINE_abcdef123456");
    }

    #[test]
    fn dbus_location_is_second_choice() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.dbus_machine_id, "  fedcba654321  \n").unwrap();

        assert_eq!(probe_with(&paths).as_str(), "DBUS_fedcba654321");
    }

    #[test]
    fn cpu_serial_parsed_from_cpuinfo() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(
            &paths.cpuinfo,
            "processor\t: 0\nmodel name\t: ARMv7\nSerial\t\t: 10000000abcd1234\n",
        )
        .unwrap();

        assert_eq!(probe_with(&paths).as_str(), "CPU_10000000abcd1234");
    }

    #[test]
    fn zero_cpu_serial_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.cpuinfo, "Serial\t\t: 0000000000000000\n").unwrap();

        assert_eq!(probe_with(&paths).as_str(), FALLBACK_ID);
    }

    #[test]
    fn empty_sources_fall_back_to_development_id() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.machine_id, "\n").unwrap();

        assert_eq!(probe_with(&paths).as_str(), FALLBACK_ID);
    }

    #[test]
    fn prefixes_prevent_cross_source_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.machine_id, "same-value\n").unwrap();
        let from_machine = probe_with(&paths);

        fs::remove_file(&paths.machine_id).unwrap();
        fs::write(&paths.dbus_machine_id, "same-value\n").unwrap();
        let from_dbus = probe_with(&paths);

        assert_ne!(from_machine, from_dbus);
    }
}
