//! Remote version catalog.
//!
//! The index is an HTML page whose links name release archives, e.g.
//! `<a href="/dl/go1.21.3.linux-amd64.tar.gz">`. Only links whose file name
//! matches `<prefix><version>.<os>-<arch>.tar.gz` for the requested platform
//! are considered; pre-releases and anything that does not parse as a plain
//! version are dropped. An index that yields nothing is an error rather than an
//! empty catalog.

use crate::errors::{GvsError, Result};
use crate::fetch::Fetcher;
use crate::platform::PlatformKey;
use crate::version::Version;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

const PRERELEASE_MARKERS: [&str; 2] = ["beta", "rc"];

/// A version published for a platform, with the archive name the index used
/// for it (`go1.20.linux-amd64.tar.gz` for 1.20.0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub version: Version,
    pub archive: String,
}

pub struct VersionCatalog<'a> {
    fetcher: &'a dyn Fetcher,
    index_url: String,
    prefix: String,
}

impl<'a> VersionCatalog<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        index_url: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            index_url: index_url.into(),
            prefix: prefix.into(),
        }
    }

    /// All stable versions for `platform`, ascending and deduplicated.
    pub fn fetch_all(&self, platform: PlatformKey) -> Result<Vec<Version>> {
        Ok(self.entries(platform)?.into_iter().map(|e| e.version).collect())
    }

    pub fn entries(&self, platform: PlatformKey) -> Result<Vec<CatalogEntry>> {
        let body = self
            .fetcher
            .get_text(&self.index_url)
            .map_err(|e| GvsError::CatalogUnavailable {
                url: self.index_url.clone(),
                message: e.message,
            })?;
        let entries = parse_index(&body, &self.prefix, platform)?;
        if entries.is_empty() {
            return Err(GvsError::NoVersionsFound {
                url: self.index_url.clone(),
                platform: platform.to_string(),
            });
        }
        Ok(entries)
    }

    pub fn latest(&self, platform: PlatformKey) -> Result<Version> {
        let all = self.fetch_all(platform)?;
        // entries() never returns an empty list
        all.last().copied().ok_or_else(|| GvsError::NoVersionsFound {
            url: self.index_url.clone(),
            platform: platform.to_string(),
        })
    }

    pub fn contains(&self, platform: PlatformKey, version: Version) -> Result<bool> {
        Ok(self.fetch_all(platform)?.contains(&version))
    }

    pub fn find(&self, platform: PlatformKey, version: Version) -> Result<Option<CatalogEntry>> {
        Ok(self
            .entries(platform)?
            .into_iter()
            .find(|e| e.version == version))
    }
}

fn parse_index(body: &str, prefix: &str, platform: PlatformKey) -> Result<Vec<CatalogEntry>> {
    let href = Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#)
        .map_err(|e| GvsError::config(format!("index pattern: {e}")))?;
    let archive = Regex::new(&format!(
        r"^{}(.+)\.{}-{}\.tar\.gz$",
        regex::escape(prefix),
        regex::escape(platform.os.as_str()),
        regex::escape(platform.arch.as_str()),
    ))
    .map_err(|e| GvsError::config(format!("archive pattern for prefix {prefix:?}: {e}")))?;

    // BTreeMap keyed by Version gives dedup and numeric ordering in one go.
    let mut found: BTreeMap<Version, String> = BTreeMap::new();
    for cap in href.captures_iter(body) {
        let target = &cap[1];
        let name = target.rsplit('/').next().unwrap_or(target);
        let Some(m) = archive.captures(name) else {
            continue;
        };
        let raw = &m[1];
        let lowered = raw.to_ascii_lowercase();
        if PRERELEASE_MARKERS.iter().any(|p| lowered.contains(p)) {
            debug!(candidate = %name, "skipping pre-release");
            continue;
        }
        match raw.parse::<Version>() {
            Ok(v) => {
                found.entry(v).or_insert_with(|| name.to_string());
            }
            Err(_) => debug!(candidate = %name, "skipping unparsable version"),
        }
    }
    Ok(found
        .into_iter()
        .map(|(version, archive)| CatalogEntry { version, archive })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use std::cell::Cell;
    use std::fs::File;

    /// Serves a fixed index document and counts requests.
    pub(crate) struct FixtureIndex {
        pub body: Option<String>,
        pub calls: Cell<usize>,
    }

    impl FixtureIndex {
        pub(crate) fn new(body: &str) -> Self {
            Self {
                body: Some(body.to_string()),
                calls: Cell::new(0),
            }
        }

        fn offline() -> Self {
            Self {
                body: None,
                calls: Cell::new(0),
            }
        }
    }

    impl Fetcher for FixtureIndex {
        fn get_text(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.body.clone().ok_or_else(|| FetchError::transport(url, "connection refused"))
        }
        fn download(&self, url: &str, _out: &mut File) -> std::result::Result<u64, FetchError> {
            Err(FetchError::http(url, 404))
        }
    }

    pub(crate) fn listing(names: &[&str]) -> String {
        let mut html = String::from("<html><body><table>\n");
        for n in names {
            html.push_str(&format!(
                "<tr><td><a class=\"download\" href=\"/dl/{n}\">{n}</a></td></tr>\n"
            ));
        }
        html.push_str("</table></body></html>\n");
        html
    }

    fn linux_amd64() -> PlatformKey {
        PlatformKey::resolve_from("linux", "amd64").unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn sorts_numerically_and_reports_latest() {
        let index = FixtureIndex::new(&listing(&[
            "go1.19.0.linux-amd64.tar.gz",
            "go1.9.0.linux-amd64.tar.gz",
            "go1.20.1.linux-amd64.tar.gz",
            "go1.9.0.linux-amd64.tar.gz",
        ]));
        let catalog = VersionCatalog::new(&index, "https://example.test/dl/", "go");
        let all = catalog.fetch_all(linux_amd64()).unwrap();
        assert_eq!(all, vec![v("1.9.0"), v("1.19.0"), v("1.20.1")]);
        assert_eq!(catalog.latest(linux_amd64()).unwrap(), v("1.20.1"));
    }

    #[test]
    fn excludes_prereleases_other_platforms_and_junk() {
        let index = FixtureIndex::new(&listing(&[
            "go1.22rc1.linux-amd64.tar.gz",
            "go1.21beta2.linux-amd64.tar.gz",
            "go1.21.0.darwin-arm64.tar.gz",
            "go1.21.0.linux-amd64.pkg",
            "go1.21.0.linux-amd64.tar.gz.sha256",
            "go1.x.linux-amd64.tar.gz",
            "go1.21.0.src.tar.gz",
            "go1.20.linux-amd64.tar.gz",
            "go1.21.0.linux-amd64.tar.gz",
        ]));
        let catalog = VersionCatalog::new(&index, "u", "go");
        let entries = catalog.entries(linux_amd64()).unwrap();
        assert_eq!(
            entries,
            vec![
                CatalogEntry {
                    version: v("1.20.0"),
                    archive: "go1.20.linux-amd64.tar.gz".into()
                },
                CatalogEntry {
                    version: v("1.21.0"),
                    archive: "go1.21.0.linux-amd64.tar.gz".into()
                },
            ]
        );
    }

    #[test]
    fn result_is_strictly_increasing() {
        let names: Vec<String> = [
            "1.10.1", "1.2", "1.10.0", "1.9.12", "1.10.1", "2.0.0", "1.2.0",
        ]
        .iter()
        .map(|s| format!("go{s}.linux-amd64.tar.gz"))
        .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let index = FixtureIndex::new(&listing(&refs));
        let all = VersionCatalog::new(&index, "u", "go")
            .fetch_all(linux_amd64())
            .unwrap();
        assert!(all.windows(2).all(|w| w[0] < w[1]), "{all:?}");
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn empty_or_unparsable_listing_fails_closed() {
        let index = FixtureIndex::new("<html>maintenance</html>");
        let err = VersionCatalog::new(&index, "u", "go")
            .fetch_all(linux_amd64())
            .unwrap_err();
        assert!(matches!(err, GvsError::NoVersionsFound { .. }));

        let index = FixtureIndex::new(&listing(&["go1.22rc1.linux-amd64.tar.gz"]));
        let err = VersionCatalog::new(&index, "u", "go")
            .latest(linux_amd64())
            .unwrap_err();
        assert!(matches!(err, GvsError::NoVersionsFound { .. }));
    }

    #[test]
    fn transport_failure_is_catalog_unavailable() {
        let index = FixtureIndex::offline();
        let err = VersionCatalog::new(&index, "https://example.test/dl/", "go")
            .contains(linux_amd64(), v("1.21.0"))
            .unwrap_err();
        assert!(matches!(err, GvsError::CatalogUnavailable { .. }));
    }

    #[test]
    fn contains_and_find_use_numeric_equality() {
        let index = FixtureIndex::new(&listing(&["go1.20.linux-amd64.tar.gz"]));
        let catalog = VersionCatalog::new(&index, "u", "go");
        assert!(catalog.contains(linux_amd64(), v("1.20.0")).unwrap());
        assert!(!catalog.contains(linux_amd64(), v("1.20.1")).unwrap());
        let entry = catalog.find(linux_amd64(), v("1.20")).unwrap().unwrap();
        assert_eq!(entry.archive, "go1.20.linux-amd64.tar.gz");
        assert_eq!(index.calls.get(), 3);
    }

    #[test]
    fn single_quoted_and_absolute_links_are_accepted() {
        let body = "<a href='https://dl.example.test/go/go1.21.3.linux-amd64.tar.gz'>x</a>";
        let index = FixtureIndex::new(body);
        let all = VersionCatalog::new(&index, "u", "go")
            .fetch_all(linux_amd64())
            .unwrap();
        assert_eq!(all, vec![v("1.21.3")]);
    }
}
