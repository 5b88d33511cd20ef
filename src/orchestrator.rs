//! High-level flows behind each command.
//!
//! The orchestrator owns no state of its own: everything comes from the
//! [`Context`] and the borrowed collaborators, so tests drive it with an
//! in-memory fetcher and a scripted confirmation policy.

use crate::cache::{ArtifactCache, CacheEntry, CacheKey, Verification};
use crate::catalog::{CatalogEntry, VersionCatalog};
use crate::checksums::{ChecksumSource, PublishedChecksums};
use crate::config::Context;
use crate::confirm::{Confirm, Prompt};
use crate::errors::{GvsError, Result};
use crate::fetch::Fetcher;
use crate::fsutil::check_writable;
use crate::installer;
use crate::platform::PlatformKey;
use crate::registry::{ActiveState, InstalledVersionRegistry, SwitchOutcome};
use crate::version::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cleans up environment/profile settings that point at the toolchain. Runs
/// only for `remove --purge-env`, after the removal succeeded.
pub trait EnvCleanup {
    fn purge(&self, ctx: &Context) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: Version,
    /// `None` when the version was already installed and nothing was fetched.
    pub fetched: Option<Verification>,
    pub switch: SwitchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReport {
    UpToDate(Version),
    Updated { from: Version, report: InstallReport },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed {
        version: Option<Version>,
        path: PathBuf,
    },
    Declined,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub active: ActiveState,
    pub installed: Vec<Version>,
    pub cache: Vec<CacheEntry>,
}

pub struct Orchestrator<'a> {
    ctx: &'a Context,
    fetcher: &'a dyn Fetcher,
    confirm: &'a dyn Confirm,
    env: &'a dyn EnvCleanup,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: &'a Context,
        fetcher: &'a dyn Fetcher,
        confirm: &'a dyn Confirm,
        env: &'a dyn EnvCleanup,
    ) -> Self {
        Self {
            ctx,
            fetcher,
            confirm,
            env,
        }
    }

    pub fn context(&self) -> &Context {
        self.ctx
    }

    fn catalog(&self) -> VersionCatalog<'a> {
        VersionCatalog::new(
            self.fetcher,
            self.ctx.endpoints.index_url.clone(),
            self.ctx.endpoints.archive_prefix.clone(),
        )
    }

    fn registry(&self) -> InstalledVersionRegistry {
        InstalledVersionRegistry::new(&self.ctx.paths, &self.ctx.endpoints.archive_prefix)
    }

    /// Fail early with `PermissionDenied` if any of `dirs` is not writable.
    fn require_writable(&self, dirs: &[&Path]) -> Result<()> {
        for dir in dirs {
            check_writable(dir)?;
        }
        Ok(())
    }

    fn active_parent(&self) -> &Path {
        self.ctx.paths.active.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Install `requested` (or the latest release) and make it active.
    ///
    /// A version that is already installed is activated without consulting
    /// the catalog, so this works offline and, when the version is already
    /// active, touches nothing at all.
    pub fn install(&self, requested: Option<Version>) -> Result<InstallReport> {
        let registry = self.registry();
        if let Some(version) = requested {
            if registry.is_installed(version) {
                debug!(%version, "already installed; skipping catalog");
                self.require_writable(&[self.active_parent()])?;
                return self.finish(&registry, version, None);
            }
        }

        self.require_writable(&[
            self.ctx.paths.cache.as_path(),
            self.ctx.paths.versions.as_path(),
            self.active_parent(),
        ])?;
        let catalog = self.catalog();
        let platform = self.ctx.platform;
        let entry = match requested {
            Some(version) => catalog
                .find(platform, version)?
                .ok_or_else(|| GvsError::VersionNotAvailable {
                    version: version.to_string(),
                    platform: platform.to_string(),
                })?,
            None => {
                let index_url = &self.ctx.endpoints.index_url;
                latest_entry(catalog.entries(platform)?, index_url, platform)?
            }
        };
        self.install_entry(&registry, &entry)
    }

    fn install_entry(
        &self,
        registry: &InstalledVersionRegistry,
        entry: &CatalogEntry,
    ) -> Result<InstallReport> {
        let version = entry.version;
        if registry.is_installed(version) {
            return self.finish(registry, version, None);
        }

        let checksums = self
            .ctx
            .endpoints
            .checksum_url
            .as_deref()
            .map(|url| PublishedChecksums::new(self.fetcher, url));
        let cache = ArtifactCache::new(
            &self.ctx.paths.cache,
            self.fetcher,
            &self.ctx.endpoints.download_url,
            checksums.as_ref().map(|c| c as &dyn ChecksumSource),
        );
        let artifact = cache.fetch(&CacheKey::from_entry(entry)?)?;
        installer::install(&artifact.path, &registry.version_dir(version))?;
        self.finish(registry, version, Some(artifact.verification))
    }

    fn finish(
        &self,
        registry: &InstalledVersionRegistry,
        version: Version,
        fetched: Option<Verification>,
    ) -> Result<InstallReport> {
        let switch = self.activate(registry, version)?;
        Ok(InstallReport {
            version,
            fetched,
            switch,
        })
    }

    /// Switch to `version`, asking first when it would replace a different
    /// active version.
    fn activate(
        &self,
        registry: &InstalledVersionRegistry,
        version: Version,
    ) -> Result<SwitchOutcome> {
        if let ActiveState::Managed(current) = registry.inspect()? {
            if current != version {
                let prompt = Prompt::ReplaceActive {
                    current,
                    next: version,
                };
                if !self.confirm.confirm(&prompt) {
                    warn!(%current, %version, "kept current version active");
                    return Ok(SwitchOutcome::Declined);
                }
            }
        }
        registry.switch(version, self.confirm)
    }

    pub fn update(&self) -> Result<UpdateReport> {
        let registry = self.registry();
        let current = registry.current()?.ok_or(GvsError::NotInstalled)?;
        let platform = self.ctx.platform;
        let latest = latest_entry(
            self.catalog().entries(platform)?,
            &self.ctx.endpoints.index_url,
            platform,
        )?;
        if latest.version <= current {
            info!(%current, "already up to date");
            return Ok(UpdateReport::UpToDate(current));
        }
        self.require_writable(&[
            self.ctx.paths.cache.as_path(),
            self.ctx.paths.versions.as_path(),
            self.active_parent(),
        ])?;
        let report = self.install_entry(&registry, &latest)?;
        Ok(UpdateReport::Updated {
            from: current,
            report,
        })
    }

    /// Remove `version`, or the active installation when `None`.
    pub fn remove(&self, version: Option<Version>, purge_env: bool) -> Result<RemoveOutcome> {
        let registry = self.registry();
        let state = registry.inspect()?;
        self.require_writable(&[self.ctx.paths.versions.as_path(), self.active_parent()])?;

        let outcome = match (version, state) {
            (Some(v), state)
                if state != ActiveState::Managed(v) && state != ActiveState::Dangling(v) =>
            {
                if !registry.is_installed(v) {
                    return Err(GvsError::VersionNotInstalled { version: v.to_string() });
                }
                if !self.confirm.confirm(&Prompt::RemoveVersion { version: v }) {
                    return Ok(RemoveOutcome::Declined);
                }
                registry.remove_version(v)?;
                RemoveOutcome::Removed {
                    version: Some(v),
                    path: registry.version_dir(v),
                }
            }
            (_, ActiveState::Managed(v) | ActiveState::Dangling(v)) => {
                let prompt = Prompt::RemoveActive {
                    version: Some(v),
                    path: registry.active_path().to_path_buf(),
                };
                if !self.confirm.confirm(&prompt) {
                    return Ok(RemoveOutcome::Declined);
                }
                registry.unlink()?;
                if registry.is_installed(v) {
                    registry.remove_version(v)?;
                }
                RemoveOutcome::Removed {
                    version: Some(v),
                    path: registry.version_dir(v),
                }
            }
            (_, ActiveState::Unmanaged { path, version }) => {
                let prompt = Prompt::RemoveActive {
                    version,
                    path: path.clone(),
                };
                if !self.confirm.confirm(&prompt) {
                    return Ok(RemoveOutcome::Declined);
                }
                registry.remove_unmanaged()?;
                RemoveOutcome::Removed { version, path }
            }
            (_, ActiveState::Absent) => return Err(GvsError::NotInstalled),
        };

        if purge_env {
            self.env.purge(self.ctx)?;
        }
        Ok(outcome)
    }

    pub fn use_version(&self, version: Version) -> Result<SwitchOutcome> {
        self.require_writable(&[self.active_parent()])?;
        self.registry().switch(version, self.confirm)
    }

    /// Versions published for this platform.
    pub fn versions(&self) -> Result<Vec<Version>> {
        self.catalog().fetch_all(self.ctx.platform)
    }

    /// Installed versions and the active one, if any.
    pub fn list(&self) -> Result<(Vec<Version>, Option<Version>)> {
        let registry = self.registry();
        Ok((registry.list()?, registry.current()?))
    }

    pub fn status(&self) -> Result<Status> {
        let registry = self.registry();
        Ok(Status {
            active: registry.inspect()?,
            installed: registry.list()?,
            cache: self.local_cache().list()?,
        })
    }

    pub fn cache_entries(&self) -> Result<Vec<CacheEntry>> {
        self.local_cache().list()
    }

    /// Empty the archive cache after confirmation. `None` when declined.
    pub fn clean_cache(&self) -> Result<Option<usize>> {
        let cache = self.local_cache();
        let entries = cache.list()?.len();
        if entries > 0 && !self.confirm.confirm(&Prompt::ClearCache { entries }) {
            return Ok(None);
        }
        cache.clear().map(Some)
    }

    /// The cache without a checksum source, for operations that never download.
    fn local_cache(&self) -> ArtifactCache<'a> {
        ArtifactCache::new(
            &self.ctx.paths.cache,
            self.fetcher,
            &self.ctx.endpoints.download_url,
            None,
        )
    }
}

fn latest_entry(
    entries: Vec<CatalogEntry>,
    url: &str,
    platform: PlatformKey,
) -> Result<CatalogEntry> {
    entries.into_iter().last().ok_or_else(|| GvsError::NoVersionsFound {
        url: url.to_string(),
        platform: platform.to_string(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::tests::sha256_hex;
    use crate::catalog::tests::listing;
    use crate::config::{Endpoints, NetworkPolicy, Paths};
    use crate::confirm::tests::Recorder;
    use crate::confirm::{AutoNo, AutoYes};
    use crate::fetch::FetchError;
    use crate::installer::tests::tar_gz;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::Write;

    const INDEX: &str = "https://dl.test/";
    const FILES: &str = "https://dl.test/files/";
    const SUMS: &str = "https://dl.test/sums.txt";

    /// In-memory index, checksum document and archive server.
    #[derive(Default)]
    struct FakeRemote {
        texts: RefCell<HashMap<String, String>>,
        files: RefCell<HashMap<String, Vec<u8>>>,
        text_calls: Cell<usize>,
        downloads: Cell<usize>,
    }

    impl FakeRemote {
        fn releasing(versions: &[&str]) -> Self {
            let remote = Self::default();
            let names: Vec<String> = versions.iter().map(|v| archive_name(v)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            remote.texts.borrow_mut().insert(INDEX.to_string(), listing(&refs));
            for v in versions {
                remote.files.borrow_mut().insert(archive_name(v), toolchain(v));
            }
            remote
        }

        fn network_calls(&self) -> usize {
            self.text_calls.get() + self.downloads.get()
        }
    }

    impl Fetcher for FakeRemote {
        fn get_text(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.text_calls.set(self.text_calls.get() + 1);
            self.texts.borrow().get(url).cloned().ok_or_else(|| FetchError::http(url, 404))
        }
        fn download(&self, url: &str, out: &mut File) -> std::result::Result<u64, FetchError> {
            self.downloads.set(self.downloads.get() + 1);
            let name = url.strip_prefix(FILES).unwrap_or(url);
            let files = self.files.borrow();
            let body = files.get(name).ok_or_else(|| FetchError::http(url, 404))?;
            out.write_all(body).unwrap();
            Ok(body.len() as u64)
        }
    }

    #[derive(Default)]
    struct CountingCleanup(Cell<usize>);

    impl EnvCleanup for CountingCleanup {
        fn purge(&self, _ctx: &Context) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    fn archive_name(version: &str) -> String {
        format!("go{version}.linux-amd64.tar.gz")
    }

    fn toolchain(version: &str) -> Vec<u8> {
        let stamp = format!("go{version}\n");
        let bin = format!("#!/bin/sh\necho go{version}\n");
        tar_gz(&[("go/VERSION", stamp.as_bytes()), ("go/bin/go", bin.as_bytes())])
    }

    fn context(root: &Path, checksums: bool) -> Context {
        Context {
            platform: PlatformKey::resolve_from("linux", "amd64").unwrap(),
            paths: Paths::with_root(root.to_path_buf()),
            endpoints: Endpoints {
                index_url: INDEX.to_string(),
                download_url: FILES.to_string(),
                checksum_url: checksums.then(|| SUMS.to_string()),
                archive_prefix: "go".to_string(),
            },
            network: NetworkPolicy::default(),
        }
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn install_latest_then_current_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.9.5", "1.21.0", "1.20.3"]);
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);

        let report = gvs.install(None).unwrap();
        assert_eq!(report.version, v("1.21.0"));
        assert_eq!(report.switch, SwitchOutcome::Switched);
        assert!(matches!(report.fetched, Some(Verification::Unverified { .. })));

        let (installed, current) = gvs.list().unwrap();
        assert_eq!(installed, vec![v("1.21.0")]);
        assert_eq!(current, Some(v("1.21.0")));
        let payload = ctx.paths.active.join("VERSION");
        assert_eq!(std::fs::read_to_string(payload).unwrap(), "go1.21.0\n");
    }

    #[test]
    fn reinstalling_the_active_version_is_offline_and_silent() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let env = CountingCleanup::default();
        Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .install(Some(v("1.21.0")))
            .unwrap();
        let calls = remote.network_calls();

        let asked = Recorder::new(false);
        let report = Orchestrator::new(&ctx, &remote, &asked, &env)
            .install(Some(v("1.21.0")))
            .unwrap();
        assert_eq!(report.switch, SwitchOutcome::AlreadyActive);
        assert_eq!(report.fetched, None);
        assert_eq!(remote.network_calls(), calls);
        assert!(asked.seen.borrow().is_empty());
    }

    #[test]
    fn unlisted_version_is_rejected_before_download() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);

        let err = gvs.install(Some(v("1.99.0"))).unwrap_err();
        assert!(matches!(err, GvsError::VersionNotAvailable { .. }), "{err:?}");
        assert_eq!(remote.downloads.get(), 0);
        assert!(gvs.list().unwrap().0.is_empty());
    }

    #[test]
    fn declining_to_replace_active_keeps_new_version_installed() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.20.0", "1.21.0"]);
        let env = CountingCleanup::default();
        Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .install(Some(v("1.20.0")))
            .unwrap();

        let asked = Recorder::new(false);
        let gvs = Orchestrator::new(&ctx, &remote, &asked, &env);
        let report = gvs.install(Some(v("1.21.0"))).unwrap();
        assert_eq!(report.switch, SwitchOutcome::Declined);
        assert_eq!(
            asked.seen.borrow().as_slice(),
            &[Prompt::ReplaceActive {
                current: v("1.20.0"),
                next: v("1.21.0"),
            }]
        );
        let (installed, current) = gvs.list().unwrap();
        assert_eq!(installed, vec![v("1.20.0"), v("1.21.0")]);
        assert_eq!(current, Some(v("1.20.0")));
    }

    #[test]
    fn checksum_mismatch_installs_nothing() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), true);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        remote.texts.borrow_mut().insert(
            SUMS.to_string(),
            format!("{}  {}\n", "0".repeat(64), archive_name("1.21.0")),
        );
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);

        let err = gvs.install(None).unwrap_err();
        assert!(matches!(err, GvsError::ChecksumMismatch { .. }), "{err:?}");
        assert!(!ctx.paths.cache.join(archive_name("1.21.0")).exists());
        assert!(gvs.list().unwrap().0.is_empty());
        assert_eq!(gvs.status().unwrap().active, ActiveState::Absent);
    }

    #[test]
    fn published_digest_is_verified() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), true);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let digest = sha256_hex(&toolchain("1.21.0"));
        let feed = serde_json::json!([{
            "version": "go1.21.0",
            "stable": true,
            "files": [{ "filename": archive_name("1.21.0"), "sha256": digest }],
        }])
        .to_string();
        remote.texts.borrow_mut().insert(SUMS.to_string(), feed);
        let env = CountingCleanup::default();

        let report = Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .install(None)
            .unwrap();
        assert_eq!(report.fetched, Some(Verification::Verified { sha256: digest }));
    }

    #[test]
    fn update_requires_an_active_version() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let env = CountingCleanup::default();
        let err = Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .update()
            .unwrap_err();
        assert!(matches!(err, GvsError::NotInstalled));
        assert_eq!(remote.network_calls(), 0);
    }

    #[test]
    fn update_moves_to_latest_once() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.20.0"]);
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);
        gvs.install(None).unwrap();
        assert_eq!(gvs.update().unwrap(), UpdateReport::UpToDate(v("1.20.0")));

        remote.texts.borrow_mut().insert(
            INDEX.to_string(),
            listing(&[archive_name("1.20.0").as_str(), archive_name("1.21.1").as_str()]),
        );
        remote
            .files
            .borrow_mut()
            .insert(archive_name("1.21.1"), toolchain("1.21.1"));
        match gvs.update().unwrap() {
            UpdateReport::Updated { from, report } => {
                assert_eq!(from, v("1.20.0"));
                assert_eq!(report.version, v("1.21.1"));
                assert_eq!(report.switch, SwitchOutcome::Switched);
            }
            other => panic!("expected an update, got {other:?}"),
        }
        assert_eq!(gvs.list().unwrap().1, Some(v("1.21.1")));
    }

    #[test]
    fn remove_active_unlinks_and_deletes() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let env = CountingCleanup::default();
        Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .install(None)
            .unwrap();

        let outcome = Orchestrator::new(&ctx, &remote, &AutoNo, &env)
            .remove(None, true)
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::Declined);
        assert_eq!(env.0.get(), 0);

        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);
        let outcome = gvs.remove(None, true).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Removed { version: Some(_), .. }));
        assert_eq!(env.0.get(), 1);
        assert_eq!(gvs.status().unwrap().active, ActiveState::Absent);
        assert!(gvs.list().unwrap().0.is_empty());

        let err = gvs.remove(None, false).unwrap_err();
        assert!(matches!(err, GvsError::NotInstalled));
    }

    #[test]
    fn remove_inactive_version_keeps_active_link() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.20.0", "1.21.0"]);
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);
        gvs.install(Some(v("1.20.0"))).unwrap();
        gvs.install(Some(v("1.21.0"))).unwrap();

        gvs.remove(Some(v("1.20.0")), false).unwrap();
        assert_eq!(gvs.list().unwrap(), (vec![v("1.21.0")], Some(v("1.21.0"))));
        let err = gvs.remove(Some(v("1.5.0")), false).unwrap_err();
        assert!(matches!(err, GvsError::VersionNotInstalled { .. }));
    }

    #[test]
    fn use_switches_between_installed_versions_without_network() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.20.0", "1.21.0"]);
        let env = CountingCleanup::default();
        let gvs = Orchestrator::new(&ctx, &remote, &AutoYes, &env);
        gvs.install(Some(v("1.20.0"))).unwrap();
        gvs.install(Some(v("1.21.0"))).unwrap();
        let calls = remote.network_calls();

        assert_eq!(gvs.use_version(v("1.20.0")).unwrap(), SwitchOutcome::Switched);
        assert_eq!(gvs.list().unwrap().1, Some(v("1.20.0")));
        assert_eq!(remote.network_calls(), calls);
        let err = gvs.use_version(v("9.9.9")).unwrap_err();
        assert!(matches!(err, GvsError::VersionNotInstalled { .. }));
    }

    #[test]
    fn cache_clean_is_confirmation_gated() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), false);
        let remote = FakeRemote::releasing(&["1.21.0"]);
        let env = CountingCleanup::default();
        Orchestrator::new(&ctx, &remote, &AutoYes, &env)
            .install(None)
            .unwrap();

        let declined = Orchestrator::new(&ctx, &remote, &AutoNo, &env);
        assert_eq!(declined.cache_entries().unwrap().len(), 1);
        assert_eq!(declined.clean_cache().unwrap(), None);
        assert_eq!(declined.cache_entries().unwrap().len(), 1);

        let accepted = Orchestrator::new(&ctx, &remote, &AutoYes, &env);
        assert_eq!(accepted.clean_cache().unwrap(), Some(1));
        assert!(accepted.cache_entries().unwrap().is_empty());
        // installed payload is independent of the cache
        assert_eq!(accepted.list().unwrap().1, Some(v("1.21.0")));
    }
}
