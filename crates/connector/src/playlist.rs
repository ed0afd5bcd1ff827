//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Track-code queue with shuffle and repeat modes.

use rand::seq::SliceRandom;
use serde_json::json;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl FromStr for RepeatMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(RepeatMode::None),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            _ => Err(()),
        }
    }
}

/// Ordered queue of catalog codes. When shuffle is on, playback walks
/// a regenerated random permutation instead of the insertion order.
#[derive(Default)]
pub struct Playlist {
    tracks: Vec<String>,
    order: Vec<usize>,
    current: usize,
    shuffle: bool,
    repeat: RepeatMode,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, code: impl Into<String>) {
        self.tracks.push(code.into());
        self.regenerate_order();
    }

    /// Remove by index in insertion order. Out-of-range is a no-op,
    /// mirroring the tolerant queue semantics of the wire protocol.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.tracks.remove(index);
        if self.current >= self.tracks.len() && !self.tracks.is_empty() {
            self.current = self.tracks.len() - 1;
        }
        self.regenerate_order();
        true
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order.clear();
        self.current = 0;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_track(&self) -> Option<&str> {
        if self.tracks.is_empty() {
            return None;
        }
        let index = if self.shuffle {
            self.order[self.current]
        } else {
            self.current
        };
        self.tracks.get(index).map(String::as_str)
    }

    /// Advance and return the new current track. `None` at the end of
    /// the queue (unless repeating).
    pub fn next_track(&mut self) -> Option<String> {
        if self.tracks.is_empty() {
            return None;
        }
        match self.repeat {
            RepeatMode::One => {}
            _ if self.current + 1 < self.tracks.len() => self.current += 1,
            RepeatMode::All => {
                self.current = 0;
                if self.shuffle {
                    self.regenerate_order();
                }
            }
            RepeatMode::None => return None,
        }
        self.current_track().map(str::to_string)
    }

    /// Step back and return the new current track. `None` at the start
    /// of the queue (unless repeating all).
    pub fn prev_track(&mut self) -> Option<String> {
        if self.tracks.is_empty() {
            return None;
        }
        if self.current > 0 {
            self.current -= 1;
        } else if self.repeat == RepeatMode::All {
            self.current = self.tracks.len() - 1;
        } else {
            return None;
        }
        self.current_track().map(str::to_string)
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
        if enabled {
            self.regenerate_order();
        }
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    /// The `PLAYLIST_GET` reply body.
    pub fn to_json(&self) -> String {
        json!({
            "currentIndex": self.current,
            "currentTrack": self.current_track().unwrap_or(""),
            "size": self.tracks.len(),
            "repeat": self.repeat.as_str(),
            "shuffle": self.shuffle,
            "tracks": self.tracks,
        })
        .to_string()
    }

    fn regenerate_order(&mut self) {
        self.order = (0..self.tracks.len()).collect();
        if self.shuffle && self.order.len() > 1 {
            self.order.shuffle(&mut rand::thread_rng());
        }
    }
}
