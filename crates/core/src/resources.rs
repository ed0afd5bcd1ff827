//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Resource path resolution for catalogs, keys and shader assets.
//!
//! Search order: the `ABBY_RESOURCE_PATH` override, directories around
//! the executable (development layouts), system share directories, then
//! per-user configuration. The first existing match wins.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the resource search root.
pub const RESOURCE_PATH_ENV: &str = "ABBY_RESOURCE_PATH";

const SYSTEM_DIRS: [&str; 2] = ["/usr/share/abby", "/usr/local/share/abby"];

/// Ordered set of directories resources are looked up in.
#[derive(Clone, Debug)]
pub struct ResourcePaths {
    search: Vec<PathBuf>,
}

impl ResourcePaths {
    /// Build the search list from the process environment.
    pub fn discover() -> Self {
        let mut search = Vec::new();

        if let Ok(override_path) = env::var(RESOURCE_PATH_ENV) {
            if !override_path.is_empty() {
                search.push(PathBuf::from(override_path));
            }
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(exe_dir) = exe.parent() {
                search.push(exe_dir.to_path_buf());
                // Development layouts keep assets above the build dir.
                search.push(exe_dir.join(".."));
                search.push(exe_dir.join("../.."));
            }
        }

        for dir in SYSTEM_DIRS {
            search.push(PathBuf::from(dir));
        }

        if let Ok(home) = env::var("HOME") {
            search.push(Path::new(&home).join(".config/abby"));
            search.push(Path::new(&home).join(".local/share/abby"));
        }

        Self { search }
    }

    /// A search list rooted at one explicit directory (tests, tools).
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            search: vec![root.into()],
        }
    }

    /// Locate a file by relative name. First hit wins.
    pub fn find_file(&self, relative: &str) -> Option<PathBuf> {
        self.search
            .iter()
            .map(|base| base.join(relative))
            .find(|p| p.is_file())
    }

    /// Locate a directory by relative name. First hit wins.
    pub fn find_dir(&self, relative: &str) -> Option<PathBuf> {
        self.search
            .iter()
            .map(|base| base.join(relative))
            .find(|p| p.is_dir())
    }
}
