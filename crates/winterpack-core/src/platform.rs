//! Per-OS capabilities used by installation probing and update application.
//!
//! Every OS-specific decision the update core makes goes through [`Platform`]
//! so the probe, the applier and the migrator never branch on the target OS
//! themselves. One implementation per OS lives in `platform_linux`,
//! `platform_macos` and `platform_windows`; [`current_platform`] picks the one
//! for the running target. All three compile everywhere so their decision
//! logic can be tested on any host; only the syscalls they make are gated.

use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::probe::InstallMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
        }
    }
}

pub trait Platform: Send + Sync {
    fn os(&self) -> Os;

    /// The fixed per-user data directory, if the OS reports a home.
    fn user_data_dir(&self) -> Option<PathBuf>;

    /// Whether an executable living in `exe_dir` counts as installed.
    fn is_installed(&self, exe_dir: &Path) -> bool;

    /// Canonical data directory for `mode`, ignoring any override.
    fn data_dir(&self, mode: InstallMode, exe_dir: &Path) -> Option<PathBuf> {
        let _ = (mode, exe_dir);
        self.user_data_dir()
    }

    /// False where the OS locks an executable while it runs.
    fn replaces_running_executable(&self) -> bool {
        true
    }

    /// Copies the executable bit/attributes of `original` onto `staged`.
    fn set_executable_attributes(&self, original: &Path, staged: &Path) -> io::Result<()>;

    /// Strips download provenance markers from a freshly staged file. Best
    /// effort.
    fn clear_download_attributes(&self, staged: &Path) {
        let _ = staged;
    }

    /// Moves the staged artifact over the target in one step.
    fn promote(&self, staged: &Path, target: &Path) -> io::Result<()> {
        fs::rename(staged, target)
    }
}

pub fn current_platform() -> Box<dyn Platform> {
    #[cfg(target_os = "windows")]
    {
        Box::new(crate::platform_windows::WindowsPlatform::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(crate::platform_macos::MacPlatform::new())
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Box::new(crate::platform_linux::LinuxPlatform::new())
    }
}

/// Per-user data directory shared by every mode that does not keep data
/// beside the executable.
pub(crate) fn project_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "winterpack", "Winterpack").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Sibling path the new artifact is staged at before promotion.
pub fn staged_path(target: &Path) -> PathBuf {
    sibling_with_suffix(target, "new")
}

/// Sibling path an interrupted update may have parked the old binary at.
pub fn parked_path(target: &Path) -> PathBuf {
    sibling_with_suffix(target, "old")
}

fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

/// Path equality that tolerates symlinks and, on Windows, case differences.
pub(crate) fn same_dir(a: &Path, b: &Path) -> bool {
    let a = fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let b = fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    if cfg!(windows) {
        a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
    } else {
        a == b
    }
}

#[cfg(unix)]
pub(crate) fn copy_unix_mode(original: &Path, staged: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match fs::metadata(original) {
        Ok(metadata) => metadata.permissions().mode(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => 0o755,
        Err(err) => return Err(err),
    };
    fs::set_permissions(staged, fs::Permissions::from_mode(mode))?;
    let applied = fs::metadata(staged)?.permissions().mode();
    if applied & 0o111 == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not executable after update", staged.display()),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn copy_unix_mode(original: &Path, staged: &Path) -> io::Result<()> {
    let _ = original;
    fs::metadata(staged).map(|_| ())
}
