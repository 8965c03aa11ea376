use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::error::UpdateError;
use crate::fs_util::write_atomic;

pub const CHECK_STATE_FILE_NAME: &str = "update-check.json";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Bookkeeping for the scheduled update check. Never holds release data;
/// every check fetches fresh metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckState {
    #[serde(default)]
    pub last_check: Option<u64>,
    #[serde(default)]
    pub last_result: Option<String>,
    #[serde(default)]
    pub last_version: Option<String>,
    #[serde(default)]
    pub last_channel: Option<String>,
}

impl UpdateCheckState {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(CHECK_STATE_FILE_NAME)
    }

    /// Missing or unreadable state counts as "never checked".
    pub fn load(data_dir: &Path) -> Self {
        match Self::try_load(data_dir) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "ignoring update check state");
                Self::default()
            }
        }
    }

    /// Like [`load`](Self::load), but reports a corrupt file instead of
    /// defaulting it. A missing file is still "never checked".
    pub fn try_load(data_dir: &Path) -> Result<Self, UpdateError> {
        let path = Self::path(data_dir);
        let Ok(data) = fs::read_to_string(&path) else {
            return Ok(Self::default());
        };
        serde_json::from_str(&data).map_err(|err| UpdateError::Parse {
            what: path.display().to_string(),
            cause: err.to_string(),
        })
    }

    pub fn save(&self, data_dir: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self).context("serialize update check state")?;
        write_atomic(&Self::path(data_dir), data.as_bytes()).context("write update check state")
    }

    pub fn record(&mut self, now: u64, result: &str, latest_version: Option<String>, channel: &str) {
        self.last_check = Some(now);
        self.last_result = Some(result.to_string());
        self.last_version = latest_version;
        self.last_channel = Some(channel.to_string());
    }
}

pub fn update_check_due(state: &UpdateCheckState, now: u64, interval_secs: u64) -> bool {
    match state.last_check {
        Some(last) => now.saturating_sub(last) >= interval_secs,
        None => true,
    }
}

pub fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
