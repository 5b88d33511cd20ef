use crate::platform::PlatformOps;
use std::path::{Path, PathBuf};

pub static WINDOWS_PLATFORM: Windows = Windows;

pub struct Windows;

impl PlatformOps for Windows {
    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
    fn link_dir(&self, target: &Path, link: &Path) -> std::io::Result<()> {
        std::os::windows::fs::symlink_dir(target, link)
    }
    fn remove_link(&self, link: &Path) -> std::io::Result<()> {
        // directory symlinks are removed with remove_dir on Windows
        std::fs::remove_dir(link)
    }
    fn make_executable(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}
