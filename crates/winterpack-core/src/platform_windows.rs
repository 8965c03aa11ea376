use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::platform::{Os, Platform, project_data_dir, same_dir};
use crate::probe::InstallMode;

#[cfg_attr(not(windows), allow(dead_code))]
const REGISTRY_KEY: &str = r"Software\Winterpack";
#[cfg_attr(not(windows), allow(dead_code))]
const REGISTRY_VALUE: &str = "InstallPath";

pub struct WindowsPlatform {
    user_data_dir: Option<PathBuf>,
    registered_dir: Option<PathBuf>,
}

impl WindowsPlatform {
    pub fn new() -> Self {
        Self {
            user_data_dir: project_data_dir(),
            registered_dir: read_registered_install_dir(),
        }
    }

    pub fn with_dirs(user_data_dir: PathBuf, registered_dir: Option<PathBuf>) -> Self {
        Self {
            user_data_dir: Some(user_data_dir),
            registered_dir,
        }
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for WindowsPlatform {
    fn os(&self) -> Os {
        Os::Windows
    }

    fn user_data_dir(&self) -> Option<PathBuf> {
        self.user_data_dir.clone()
    }

    fn is_installed(&self, exe_dir: &Path) -> bool {
        match &self.registered_dir {
            Some(registered) => exe_dir.is_dir() && same_dir(registered, exe_dir),
            None => false,
        }
    }

    fn data_dir(&self, mode: InstallMode, exe_dir: &Path) -> Option<PathBuf> {
        match mode {
            InstallMode::Portable => Some(exe_dir.to_path_buf()),
            InstallMode::Installed => self.user_data_dir(),
        }
    }

    fn replaces_running_executable(&self) -> bool {
        false
    }

    fn set_executable_attributes(&self, original: &Path, staged: &Path) -> io::Result<()> {
        let mut permissions = fs::metadata(staged)?.permissions();
        let readonly = match fs::metadata(original) {
            Ok(metadata) => metadata.permissions().readonly(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err),
        };
        permissions.set_readonly(readonly);
        fs::set_permissions(staged, permissions)
    }
}

#[cfg(windows)]
fn read_registered_install_dir() -> Option<PathBuf> {
    use winreg::RegKey;
    use winreg::enums::HKEY_CURRENT_USER;

    let key = RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey(REGISTRY_KEY)
        .ok()?;
    let value: String = key.get_value(REGISTRY_VALUE).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

#[cfg(not(windows))]
fn read_registered_install_dir() -> Option<PathBuf> {
    None
}
