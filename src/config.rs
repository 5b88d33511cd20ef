use crate::errors::{GvsError, Result};
use crate::platform::{platform, PlatformKey};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the root directory (`~/.gvs`).
pub const GVS_HOME_ENV: &str = "GVS_HOME";

pub const DEFAULT_INDEX_URL: &str = "https://go.dev/dl/";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://dl.google.com/go/";
pub const DEFAULT_CHECKSUM_URL: &str = "https://go.dev/dl/?mode=json&include=all";
pub const DEFAULT_ARCHIVE_PREFIX: &str = "go";

/// On-disk configuration (`<root>/config.toml`). Every key is optional.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub versions_dir: Option<PathBuf>,
    /// Where the active link lives, e.g. `/usr/local/go`.
    #[serde(default)]
    pub active_path: Option<PathBuf>,
    #[serde(default)]
    pub index_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Empty string disables checksum lookups.
    #[serde(default)]
    pub checksum_url: Option<String>,
    #[serde(default)]
    pub archive_prefix: Option<String>,
    /// Override detection, e.g. `linux-arm64`.
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
}

/// Directory layout under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub cache: PathBuf,
    pub versions: PathBuf,
    pub active: PathBuf,
}

impl Paths {
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            cache: root.join("cache"),
            versions: root.join("versions"),
            active: root.join("current"),
            root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub index_url: String,
    pub download_url: String,
    pub checksum_url: Option<String>,
    pub archive_prefix: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            checksum_url: Some(DEFAULT_CHECKSUM_URL.to_string()),
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPolicy {
    pub connect_timeout: Duration,
    /// Whole-request limit for index and checksum lookups.
    pub timeout: Duration,
    /// Whole-request limit for archive downloads, body included.
    pub download_timeout: Duration,
    /// Total attempts per request, including the first.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(3600),
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Everything an operation needs to know about its environment, resolved once
/// per run and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Context {
    pub platform: PlatformKey,
    pub paths: Paths,
    pub endpoints: Endpoints,
    pub network: NetworkPolicy,
}

impl Config {
    /// Load from `path` when given, else from `<root>/config.toml`. A missing
    /// default file yields the default configuration; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_root()?.join("config.toml"), false),
        };
        let data = match fs_err::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default())
            }
            Err(e) => {
                return Err(GvsError::config(format!("reading {}: {e}", path.display())))
            }
        };
        Self::parse(&data)
            .map_err(|e| GvsError::config(format!("parsing {}: {e}", path.display())))
    }

    pub fn parse(data: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    /// Resolve the platform (config override first) before anything touches
    /// the network or the filesystem.
    pub fn resolve_platform(&self) -> Result<PlatformKey> {
        match &self.platform {
            Some(p) => p.parse(),
            None => PlatformKey::resolve(),
        }
    }

    /// Resolve the layout. The root is made absolute against the working
    /// directory so the active link never records a relative target.
    pub fn paths(&self) -> Result<Paths> {
        let root = match &self.root {
            Some(r) => r.clone(),
            None => default_root()?,
        };
        let root = std::path::absolute(&root)
            .map_err(|e| GvsError::io(format!("resolving root {}", root.display()), e))?;
        let mut paths = Paths::with_root(root.clone());
        if let Some(p) = &self.cache_dir {
            paths.cache = root.join(p);
        }
        if let Some(p) = &self.versions_dir {
            paths.versions = root.join(p);
        }
        if let Some(p) = &self.active_path {
            paths.active = root.join(p);
        }
        Ok(paths)
    }

    pub fn endpoints(&self) -> Endpoints {
        let defaults = Endpoints::default();
        Endpoints {
            index_url: self.index_url.clone().unwrap_or(defaults.index_url),
            download_url: self.download_url.clone().unwrap_or(defaults.download_url),
            checksum_url: match &self.checksum_url {
                Some(url) if url.trim().is_empty() => None,
                Some(url) => Some(url.clone()),
                None => defaults.checksum_url,
            },
            archive_prefix: self
                .archive_prefix
                .clone()
                .unwrap_or(defaults.archive_prefix),
        }
    }

    pub fn network(&self) -> NetworkPolicy {
        let d = NetworkPolicy::default();
        let n = &self.network;
        NetworkPolicy {
            connect_timeout: n
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.connect_timeout),
            timeout: n.timeout_secs.map(Duration::from_secs).unwrap_or(d.timeout),
            download_timeout: n
                .download_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.download_timeout),
            attempts: n.retries.map(|r| r.max(1)).unwrap_or(d.attempts),
            backoff: n.backoff_ms.map(Duration::from_millis).unwrap_or(d.backoff),
        }
    }

    pub fn context(&self, platform: PlatformKey) -> Result<Context> {
        Ok(Context {
            platform,
            paths: self.paths()?,
            endpoints: self.endpoints(),
            network: self.network(),
        })
    }
}

fn default_root() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(GVS_HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    platform()
        .home_dir()
        .map(|h| h.join(".gvs"))
        .ok_or_else(|| {
            GvsError::config(format!("cannot determine home directory; set {GVS_HOME_ENV}"))
        })
}
