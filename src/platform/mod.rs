//! Platform detection and the handful of OS-specific filesystem operations
//! gvs needs.

use crate::errors::{GvsError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub fn platform() -> &'static dyn PlatformOps {
    &ConcretePlatform
}

pub trait PlatformOps: Sync + Send {
    fn home_dir(&self) -> Option<PathBuf>;
    /// Create a directory indirection at `link` pointing at `target`.
    fn link_dir(&self, target: &Path, link: &Path) -> std::io::Result<()>;
    /// Remove an indirection created by [`PlatformOps::link_dir`] without
    /// touching its target.
    fn remove_link(&self, link: &Path) -> std::io::Result<()>;
    /// Give a freshly created directory the usual `rwxr-xr-x` mode.
    fn make_executable(&self, path: &Path) -> std::io::Result<()>;
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::UNIX_PLATFORM as ConcretePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WINDOWS_PLATFORM as ConcretePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
    X86,
    Armv6l,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
        }
    }

    fn normalize(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" => Some(Self::Darwin),
            _ => None,
        }
    }
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::X86 => "386",
            Self::Armv6l => "armv6l",
        }
    }

    fn normalize(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Some(Self::Amd64),
            "aarch64" | "arm64" => Some(Self::Arm64),
            "x86" | "i386" | "i686" | "386" => Some(Self::X86),
            "arm" | "armv6l" | "armv7l" => Some(Self::Armv6l),
            _ => None,
        }
    }
}

/// The (os, arch) pair archives are published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformKey {
    /// Detect the platform this binary was built for.
    pub fn resolve() -> Result<Self> {
        Self::resolve_from(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Normalize raw OS / machine names (`macos`, `aarch64`, `x86_64`, ...)
    /// into the canonical key.
    pub fn resolve_from(os: &str, arch: &str) -> Result<Self> {
        match (Os::normalize(os), Arch::normalize(arch)) {
            (Some(os), Some(arch)) => Ok(Self { os, arch }),
            _ => Err(GvsError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

impl FromStr for PlatformKey {
    type Err = GvsError;

    /// Accepts `<os>-<arch>` using the same alias tables as detection.
    fn from_str(s: &str) -> Result<Self> {
        let Some((os, arch)) = s.trim().split_once('-') else {
            return Err(GvsError::UnsupportedPlatform {
                os: s.to_string(),
                arch: String::new(),
            });
        };
        Self::resolve_from(os, arch)
    }
}
