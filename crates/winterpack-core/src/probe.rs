use anyhow::Context;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::platform::Platform;

/// Forces the canonical data directory, whatever the detected mode.
pub const DATA_DIR_ENV: &str = "WINTERPACK_DATA_DIR";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallMode {
    Portable,
    Installed,
}

impl InstallMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMode::Portable => "portable",
            InstallMode::Installed => "installed",
        }
    }
}

/// How this process is installed. Recomputed on every start, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallationRecord {
    pub mode: InstallMode,
    /// Directory holding the executable.
    pub root_path: PathBuf,
    pub exe_path: PathBuf,
    pub data_path: PathBuf,
    /// Set when `data_path` came from [`DATA_DIR_ENV`].
    pub data_overridden: bool,
}

#[derive(Clone, Debug)]
pub struct ProbeContext {
    pub exe_path: PathBuf,
    pub data_dir_override: Option<PathBuf>,
}

impl ProbeContext {
    pub fn from_env() -> anyhow::Result<Self> {
        let exe_path = env::current_exe().context("resolve current executable")?;
        let exe_path = fs::canonicalize(&exe_path).unwrap_or(exe_path);
        Ok(Self {
            exe_path,
            data_dir_override: data_dir_override(env::var_os(DATA_DIR_ENV)),
        })
    }
}

fn data_dir_override(value: Option<OsString>) -> Option<PathBuf> {
    value
        .filter(|value| !value.to_string_lossy().trim().is_empty())
        .map(PathBuf::from)
}

pub fn probe(platform: &dyn Platform, ctx: &ProbeContext) -> anyhow::Result<InstallationRecord> {
    let root_path = ctx
        .exe_path
        .parent()
        .map(Path::to_path_buf)
        .context("executable path has no parent directory")?;
    let mode = if platform.is_installed(&root_path) {
        InstallMode::Installed
    } else {
        InstallMode::Portable
    };
    let (data_path, data_overridden) = match &ctx.data_dir_override {
        Some(path) => (path.clone(), true),
        None => (
            platform
                .data_dir(mode, &root_path)
                .context("resolve per-user data directory")?,
            false,
        ),
    };
    debug!(
        os = platform.os().as_str(),
        mode = mode.as_str(),
        root = %root_path.display(),
        data = %data_path.display(),
        data_overridden,
        "probed installation"
    );
    Ok(InstallationRecord {
        mode,
        root_path,
        exe_path: ctx.exe_path.clone(),
        data_path,
        data_overridden,
    })
}
