//! Published SHA-256 digests for release archives.
//!
//! Two document shapes are understood: the JSON release feed
//! (`[{"files": [{"filename": ..., "sha256": ...}]}]`) and a plain
//! `sha256sum` listing (`<hex>  <filename>` per line).

use crate::fetch::Fetcher;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestLookup {
    Found(String),
    /// The source was reachable but lists no digest for the file.
    Missing,
    /// The source could not be fetched or parsed.
    Unavailable(String),
}

pub trait ChecksumSource {
    fn lookup(&self, filename: &str) -> DigestLookup;
}

pub struct PublishedChecksums<'a> {
    fetcher: &'a dyn Fetcher,
    url: String,
}

impl<'a> PublishedChecksums<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

impl ChecksumSource for PublishedChecksums<'_> {
    fn lookup(&self, filename: &str) -> DigestLookup {
        let body = match self.fetcher.get_text(&self.url) {
            Ok(b) => b,
            Err(e) => return DigestLookup::Unavailable(e.message),
        };
        match parse_digests(&body) {
            Some(map) => match map.get(filename) {
                Some(d) => DigestLookup::Found(d.clone()),
                None => DigestLookup::Missing,
            },
            None => {
                DigestLookup::Unavailable(format!("unrecognized checksum document at {}", self.url))
            }
        }
    }
}

#[derive(Deserialize)]
struct Release {
    #[serde(default)]
    files: Vec<ReleaseFile>,
}

#[derive(Deserialize)]
struct ReleaseFile {
    filename: String,
    #[serde(default)]
    sha256: String,
}

/// filename -> lowercase hex digest. `None` when the body is neither format.
pub fn parse_digests(body: &str) -> Option<HashMap<String, String>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        let releases: Vec<Release> = serde_json::from_str(trimmed)
            .map_err(|e| debug!("checksum feed is not valid JSON: {e}"))
            .ok()?;
        let map = releases
            .into_iter()
            .flat_map(|r| r.files)
            .filter(|f| is_sha256_hex(&f.sha256))
            .map(|f| (f.filename, f.sha256.to_ascii_lowercase()))
            .collect();
        return Some(map);
    }

    let mut map = HashMap::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        let mut parts = line.split_whitespace();
        let (Some(digest), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        if !is_sha256_hex(digest) {
            return None;
        }
        let name = name.trim_start_matches('*');
        map.insert(name.to_string(), digest.to_ascii_lowercase());
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
