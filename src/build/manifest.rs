//! Revision manifests mapping original output paths to fingerprinted ones.
//!
//! One manifest per build category is written to `rev/` during a production
//! build. Keys and values are paths relative to the output root:
//!
//! ```json
//! {
//!   "css/site.css": "css/site-5d41402abc.css",
//!   "css/vendors.css": "css/vendors-7d793037a0.css"
//! }
//! ```
//!
//! Manifests are never updated in place during a build; the next production
//! build deletes the output tree and writes them from scratch.

use crate::build::output::OutputSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directory (relative to the output root) holding manifests.
pub const REV_DIR: &str = "rev";

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error
    #[error("JSON error in {path}: {source}")]
    Json { path: String, source: serde_json::Error },
}

/// Original path to fingerprinted path, sorted by original path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevManifest {
    entries: BTreeMap<String, String>,
}

impl RevManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `original` was emitted as `fingerprinted`.
    pub fn insert(&mut self, original: impl Into<String>, fingerprinted: impl Into<String>) {
        self.entries.insert(original.into(), fingerprinted.into());
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every entry of `other`; later entries win on conflicting keys.
    pub fn merge(&mut self, other: &RevManifest) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Manifest path for a category name, e.g. `rev/css-manifest.json`.
    pub fn path_for(name: &str) -> String {
        format!("{}/{}-manifest.json", REV_DIR, name)
    }

    /// Write this manifest as `rev/<name>-manifest.json`.
    pub fn save(&self, sink: &dyn OutputSink, name: &str) -> Result<String, ManifestError> {
        let path = Self::path_for(name);
        let json = self.to_json().map_err(|source| ManifestError::Json {
            path: path.clone(),
            source,
        })?;
        sink.write(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Load one manifest from the sink.
    pub fn load(sink: &dyn OutputSink, path: &str) -> Result<Option<Self>, ManifestError> {
        let Some(bytes) = sink.read(path)? else {
            return Ok(None);
        };
        let manifest = serde_json::from_slice(&bytes).map_err(|source| ManifestError::Json {
            path: path.to_string(),
            source,
        })?;
        Ok(Some(manifest))
    }

    /// Load and merge every manifest under `rev/`.
    pub fn load_all(sink: &dyn OutputSink) -> Result<Self, ManifestError> {
        let mut merged = RevManifest::new();
        for path in manifest_paths(sink)? {
            if let Some(manifest) = Self::load(sink, &path)? {
                merged.merge(&manifest);
            }
        }
        Ok(merged)
    }
}

/// Every `rev/*.json` path currently in the sink.
pub fn manifest_paths(sink: &dyn OutputSink) -> Result<Vec<String>, ManifestError> {
    let prefix = format!("{}/", REV_DIR);
    Ok(sink
        .list()?
        .into_iter()
        .filter(|p| p.starts_with(&prefix) && p.ends_with(".json"))
        .collect())
}
