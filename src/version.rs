use crate::errors::{GvsError, Result};
use std::fmt;
use std::str::FromStr;

/// A toolchain release number. A missing patch component parses as 0, so
/// `1.20` and `1.20.0` are the same version.
///
/// Field order matters: the derived `Ord` compares major, then minor, then
/// patch, numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `input` after removing an optional archive prefix (`go1.21.3`) or a
    /// leading `v`.
    pub fn parse_with_prefix(input: &str, prefix: &str) -> Result<Self> {
        let trimmed = input.trim();
        let bare = if !prefix.is_empty() {
            trimmed.strip_prefix(prefix).unwrap_or(trimmed)
        } else {
            trimmed
        };
        bare.parse()
    }
}

impl FromStr for Version {
    type Err = GvsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GvsError::InvalidVersion {
            input: s.to_string(),
        };
        let body = s.trim();
        let body = body.strip_prefix('v').unwrap_or(body);
        let parts: Vec<&str> = body.split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
