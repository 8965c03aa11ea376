use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::UpdateError;
use crate::fs_util::write_atomic;
use crate::memory::{auto_memory_mb, clamp_memory_mb, total_ram_mb};
use crate::version::Channel;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// User-configurable launcher settings. Field order here is the order on
/// disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settings {
    #[serde(rename = "memoryMB")]
    pub memory_mb: u32,
    #[serde(rename = "autoRam")]
    pub auto_ram: bool,
    #[serde(rename = "devBuildsEnabled")]
    pub dev_builds_enabled: bool,
    #[serde(rename = "debugEnabled")]
    pub debug_enabled: bool,
}

impl Settings {
    pub fn defaults(total_ram_mb: u64) -> Self {
        Self {
            memory_mb: auto_memory_mb(total_ram_mb),
            auto_ram: true,
            dev_builds_enabled: false,
            debug_enabled: false,
        }
    }

    pub fn update_channel(&self) -> Channel {
        if self.dev_builds_enabled {
            Channel::Dev
        } else {
            Channel::Stable
        }
    }

    pub fn reset_to_auto(&mut self, total_ram_mb: u64) {
        self.auto_ram = true;
        self.memory_mb = auto_memory_mb(total_ram_mb);
    }

    pub fn set_memory_mb(&mut self, mb: i64) {
        self.memory_mb = clamp_memory_mb(mb);
    }

    fn normalized(&self) -> Self {
        Self {
            memory_mb: clamp_memory_mb(self.memory_mb as i64),
            ..self.clone()
        }
    }
}

#[derive(Deserialize)]
struct StoredSettings {
    #[serde(rename = "memoryMB", default)]
    memory_mb: Option<i64>,
    #[serde(rename = "autoRam", default)]
    auto_ram: Option<bool>,
    #[serde(rename = "devBuildsEnabled", default)]
    dev_builds_enabled: Option<bool>,
    #[serde(rename = "debugEnabled", default)]
    debug_enabled: Option<bool>,
}

impl StoredSettings {
    fn into_settings(self, total_ram_mb: u64) -> Settings {
        let memory_mb = match self.memory_mb {
            None | Some(0) => auto_memory_mb(total_ram_mb),
            Some(value) => clamp_memory_mb(value),
        };
        Settings {
            memory_mb,
            auto_ram: self.auto_ram.unwrap_or(true),
            dev_builds_enabled: self.dev_builds_enabled.unwrap_or(false),
            debug_enabled: self.debug_enabled.unwrap_or(false),
        }
    }
}

/// Sole owner of the persisted [`Settings`]. Callers serialise concurrent
/// edits themselves (one save per user action).
pub struct SettingsStore {
    path: PathBuf,
    total_ram_mb: Option<u64>,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SETTINGS_FILE_NAME),
            total_ram_mb: None,
        }
    }

    /// Uses a fixed RAM size instead of probing the machine.
    pub fn with_total_ram(data_dir: &Path, total_ram_mb: u64) -> Self {
        Self {
            path: data_dir.join(SETTINGS_FILE_NAME),
            total_ram_mb: Some(total_ram_mb),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_ram_mb(&self) -> u64 {
        self.total_ram_mb.unwrap_or_else(total_ram_mb)
    }

    /// Loads settings, replacing a missing or corrupt file with freshly
    /// persisted defaults. Only a failure to persist those defaults is an
    /// error.
    pub fn load(&self) -> anyhow::Result<Settings> {
        match self.read() {
            Ok(Some(settings)) => Ok(settings),
            Ok(None) => {
                info!(path = %self.path.display(), "no settings file, writing defaults");
                self.save_defaults()
            }
            Err(err) => {
                warn!(error = %err, "replacing corrupt settings with defaults");
                self.save_defaults()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let settings = settings.normalized();
        let data = serde_json::to_string_pretty(&settings).context("serialize settings")?;
        write_atomic(&self.path, data.as_bytes()).context("write settings")?;
        info!(
            memory_mb = settings.memory_mb,
            auto_ram = settings.auto_ram,
            dev_builds = settings.dev_builds_enabled,
            debug = settings.debug_enabled,
            "saved settings"
        );
        Ok(())
    }

    fn read(&self) -> Result<Option<Settings>, UpdateError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.corrupt(err.to_string())),
        };
        let stored: StoredSettings =
            serde_json::from_str(&data).map_err(|err| self.corrupt(err.to_string()))?;
        Ok(Some(stored.into_settings(self.total_ram_mb())))
    }

    fn corrupt(&self, cause: String) -> UpdateError {
        UpdateError::SettingsCorrupt {
            path: self.path.clone(),
            cause,
        }
    }

    fn save_defaults(&self) -> anyhow::Result<Settings> {
        let defaults = Settings::defaults(self.total_ram_mb());
        self.save(&defaults)
            .context("persist default settings")?;
        Ok(defaults)
    }
}
