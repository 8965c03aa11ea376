use std::io;
use std::path::{Path, PathBuf};

use crate::platform::{Os, Platform, copy_unix_mode, project_data_dir};

/// Prefixes a package manager, Flatpak or Snap installs into.
const SYSTEM_PREFIXES: [&str; 7] = [
    "/usr/bin",
    "/usr/local/bin",
    "/usr/lib",
    "/usr/share",
    "/opt",
    "/app",
    "/snap",
];

pub struct LinuxPlatform {
    user_data_dir: Option<PathBuf>,
    system_prefixes: Vec<PathBuf>,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self {
            user_data_dir: project_data_dir(),
            system_prefixes: SYSTEM_PREFIXES.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_user_data_dir(user_data_dir: PathBuf) -> Self {
        Self {
            user_data_dir: Some(user_data_dir),
            ..Self::new()
        }
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LinuxPlatform {
    fn os(&self) -> Os {
        Os::Linux
    }

    fn user_data_dir(&self) -> Option<PathBuf> {
        self.user_data_dir.clone()
    }

    fn is_installed(&self, exe_dir: &Path) -> bool {
        self.system_prefixes
            .iter()
            .any(|prefix| exe_dir.starts_with(prefix))
    }

    fn set_executable_attributes(&self, original: &Path, staged: &Path) -> io::Result<()> {
        copy_unix_mode(original, staged)
    }
}
