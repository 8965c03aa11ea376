use directories::BaseDirs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::platform::{Os, Platform, copy_unix_mode, project_data_dir};

const QUARANTINE_ATTRIBUTE: &str = "com.apple.quarantine";

pub struct MacPlatform {
    user_data_dir: Option<PathBuf>,
    application_dirs: Vec<PathBuf>,
}

impl MacPlatform {
    pub fn new() -> Self {
        let mut application_dirs = vec![PathBuf::from("/Applications")];
        if let Some(base) = BaseDirs::new() {
            application_dirs.push(base.home_dir().join("Applications"));
        }
        Self {
            user_data_dir: project_data_dir(),
            application_dirs,
        }
    }

    pub fn with_dirs(user_data_dir: PathBuf, application_dirs: Vec<PathBuf>) -> Self {
        Self {
            user_data_dir: Some(user_data_dir),
            application_dirs,
        }
    }
}

impl Default for MacPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MacPlatform {
    fn os(&self) -> Os {
        Os::MacOs
    }

    fn user_data_dir(&self) -> Option<PathBuf> {
        self.user_data_dir.clone()
    }

    fn is_installed(&self, exe_dir: &Path) -> bool {
        self.application_dirs
            .iter()
            .any(|dir| exe_dir.starts_with(dir))
    }

    fn set_executable_attributes(&self, original: &Path, staged: &Path) -> io::Result<()> {
        copy_unix_mode(original, staged)
    }

    fn clear_download_attributes(&self, staged: &Path) {
        remove_quarantine(staged);
    }
}

#[cfg(target_os = "macos")]
fn remove_quarantine(path: &Path) {
    match std::process::Command::new("xattr")
        .args(["-d", QUARANTINE_ATTRIBUTE])
        .arg(path)
        .output()
    {
        Ok(output) if output.status.success() => {
            debug!(path = %path.display(), "removed quarantine attribute");
        }
        Ok(_) => {
            debug!(path = %path.display(), "no quarantine attribute to remove");
        }
        Err(err) => {
            debug!(error = %err, "xattr unavailable, quarantine left in place");
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn remove_quarantine(path: &Path) {
    debug!(
        path = %path.display(),
        attribute = QUARANTINE_ATTRIBUTE,
        "quarantine removal skipped off macOS"
    );
}
