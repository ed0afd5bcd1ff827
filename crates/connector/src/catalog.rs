//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! The content catalog: code → track path and required capability.
//!
//! Loaded once at startup from a JSON document with a top-level
//! `tracks` list and read-only afterwards. Codes are unique; listing
//! preserves the document order.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Catalog loading failures. Fatal at startup.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate track code \"{0}\"")]
    DuplicateCode(String),
}

/// One catalog entry.
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub required_permission: Option<String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    tracks: Vec<CatalogTrack>,
}

/// In-memory catalog, read-only at runtime.
pub struct Catalog {
    tracks: Vec<CatalogTrack>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;

        let mut seen = HashSet::new();
        for track in &file.tracks {
            if !seen.insert(track.id.as_str()) {
                return Err(CatalogError::DuplicateCode(track.id.clone()));
            }
        }

        Ok(Self {
            tracks: file.tracks,
        })
    }

    /// Look a code up. Linear scan; catalogs are small and load-once.
    pub fn resolve(&self, code: &str) -> Option<&CatalogTrack> {
        self.tracks.iter().find(|t| t.id == code)
    }

    /// All known codes, in document order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The `CATALOG_LIST` reply body.
    pub fn to_json(&self) -> String {
        let tracks: Vec<Value> = self
            .tracks
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "title": t.title.clone().unwrap_or_default(),
                    "path": t.path,
                    "permission": t.required_permission.clone().unwrap_or_default(),
                })
            })
            .collect();
        json!({ "tracks": tracks }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "tracks": [
            { "id": "TRK001", "path": "/media/track1.pira", "title": "First" },
            { "id": "TRK002", "path": "/media/track2.pira",
              "required_permission": "premium" },
            { "id": "TRK003", "path": "/media/track3.pira" }
        ]
    }"#;

    #[test]
    fn resolves_entries_with_and_without_permission() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 3);

        let free = catalog.resolve("TRK001").unwrap();
        assert_eq!(free.path, "/media/track1.pira");
        assert_eq!(free.required_permission, None);

        let gated = catalog.resolve("TRK002").unwrap();
        assert_eq!(gated.required_permission.as_deref(), Some("premium"));

        assert!(catalog.resolve("TRK999").is_none());
    }

    #[test]
    fn listing_preserves_document_order() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let codes: Vec<&str> = catalog.codes().collect();
        assert_eq!(codes, ["TRK001", "TRK002", "TRK003"]);
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let doc = r#"{"tracks":[
            {"id":"A","path":"/a"},
            {"id":"A","path":"/b"}
        ]}"#;
        assert!(matches!(
            Catalog::from_json(doc),
            Err(CatalogError::DuplicateCode(code)) if code == "A"
        ));
    }

    #[test]
    fn malformed_documents_fail_to_load() {
        assert!(matches!(
            Catalog::from_json("{\"songs\": []}"),
            Err(CatalogError::Json(_))
        ));
        assert!(matches!(
            Catalog::from_json("not json"),
            Err(CatalogError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Catalog::load(Path::new("/no/such/catalog.json")),
            Err(CatalogError::Io(_))
        ));
    }

    #[test]
    fn json_listing_round_trips() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let value: Value = serde_json::from_str(&catalog.to_json()).unwrap();
        let tracks = value["tracks"].as_array().unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0]["id"], "TRK001");
        assert_eq!(tracks[1]["permission"], "premium");
        assert_eq!(tracks[2]["title"], "");
    }
}
