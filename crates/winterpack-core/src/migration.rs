//! One-time move of a legacy portable layout into the canonical data
//! directory.
//!
//! The legacy tree is backed up and the backup verified before anything is
//! copied. Legacy files are copied, never moved, and never overwrite what is
//! already in the data directory: identical files are skipped, differing ones
//! are reported as conflicts and listed in the completion marker. The marker
//! is written last and atomically, so any failure before it simply makes the
//! next launch try again.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::error::UpdateError;
use crate::fs_util::{ExistingFile, copy_tree, find_mismatch, write_atomic};
use crate::platform::same_dir;

pub const MARKER_FILE_NAME: &str = ".migration-completed";

/// Directories whose presence identifies a legacy portable layout.
pub const LEGACY_INDICATORS: [&str; 3] = ["instances", "config", "prism"];
/// Directories carried over when present, indicators included.
pub const LEGACY_DIRS: [&str; 5] = ["instances", "config", "prism", "util", "logs"];
/// Top-level files carried over when present.
pub const LEGACY_FILES: [&str; 2] = ["settings.json", "modpacks.json"];

const BACKUP_PREFIX: &str = "winterpack-portable-backup-";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationStatus {
    NotNeeded,
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::NotNeeded => "not-needed",
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in-progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationState {
    pub status: MigrationStatus,
    pub backup_path: Option<PathBuf>,
    /// RFC 3339, UTC.
    pub completed_at: Option<String>,
}

impl MigrationState {
    fn bare(status: MigrationStatus) -> Self {
        Self {
            status,
            backup_path: None,
            completed_at: None,
        }
    }
}

/// Contents of the completion marker. Only the file's existence is
/// consulted; the fields are for humans and support requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationMarker {
    pub completed_at: String,
    pub legacy_root: PathBuf,
    pub entries: Vec<String>,
    pub copied_files: usize,
    pub backup_path: PathBuf,
    #[serde(default)]
    pub conflicts: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct MigrationReport {
    pub state: MigrationState,
    pub entries: Vec<String>,
    pub copied_files: usize,
    pub identical_files: usize,
    pub conflicts: Vec<PathBuf>,
}

impl MigrationReport {
    pub fn unchanged(state: MigrationState) -> Self {
        Self {
            state,
            entries: Vec::new(),
            copied_files: 0,
            identical_files: 0,
            conflicts: Vec::new(),
        }
    }
}

pub struct Migrator {
    legacy_root: PathBuf,
    data_dir: PathBuf,
    backup_root: PathBuf,
}

impl Migrator {
    /// `legacy_root` is the directory beside the executable; backups go to
    /// the system temp directory.
    pub fn new(legacy_root: &Path, data_dir: &Path) -> Self {
        Self::with_backup_root(legacy_root, data_dir, &env::temp_dir())
    }

    pub fn with_backup_root(legacy_root: &Path, data_dir: &Path, backup_root: &Path) -> Self {
        Self {
            legacy_root: legacy_root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            backup_root: backup_root.to_path_buf(),
        }
    }

    pub fn marker_path(&self) -> PathBuf {
        self.data_dir.join(MARKER_FILE_NAME)
    }

    pub fn detect(&self) -> MigrationState {
        if same_dir(&self.legacy_root, &self.data_dir) {
            return MigrationState::bare(MigrationStatus::NotNeeded);
        }
        let marker_path = self.marker_path();
        if marker_path.exists() {
            let marker = fs::read_to_string(&marker_path)
                .ok()
                .and_then(|data| serde_json::from_str::<MigrationMarker>(&data).ok());
            return MigrationState {
                status: MigrationStatus::Completed,
                backup_path: marker.as_ref().map(|marker| marker.backup_path.clone()),
                completed_at: marker.map(|marker| marker.completed_at),
            };
        }
        if self.has_legacy_layout() {
            MigrationState::bare(MigrationStatus::Pending)
        } else {
            MigrationState::bare(MigrationStatus::NotNeeded)
        }
    }

    fn has_legacy_layout(&self) -> bool {
        LEGACY_INDICATORS
            .iter()
            .any(|name| self.legacy_root.join(name).is_dir())
    }

    /// Present legacy entries, directories first.
    fn legacy_entries(&self) -> Vec<String> {
        let dirs = LEGACY_DIRS
            .iter()
            .filter(|name| self.legacy_root.join(name).is_dir());
        let files = LEGACY_FILES
            .iter()
            .filter(|name| self.legacy_root.join(name).is_file());
        dirs.chain(files).map(|name| name.to_string()).collect()
    }

    /// Runs the migration when it is pending; otherwise reports the current
    /// state and touches nothing.
    pub fn run(&self) -> Result<MigrationReport, UpdateError> {
        let state = self.detect();
        if state.status != MigrationStatus::Pending {
            info!(status = state.status.as_str(), "migration not required");
            return Ok(MigrationReport::unchanged(state));
        }

        let entries = self.legacy_entries();
        info!(
            status = MigrationStatus::InProgress.as_str(),
            legacy = %self.legacy_root.display(),
            data = %self.data_dir.display(),
            entries = entries.join(","),
            "migrating portable installation"
        );

        let backup_path = self.backup(&entries)?;
        info!(backup = %backup_path.display(), "legacy data backed up");

        match self.copy_and_finish(entries, &backup_path) {
            Ok(report) => Ok(report),
            Err(err) => {
                // legacy tree is untouched; the next attempt backs it up again
                if let Err(remove_err) = fs::remove_dir_all(&backup_path) {
                    warn!(
                        backup = %backup_path.display(),
                        error = %remove_err,
                        "could not remove backup of failed migration"
                    );
                }
                Err(err)
            }
        }
    }

    fn copy_and_finish(
        &self,
        entries: Vec<String>,
        backup_path: &Path,
    ) -> Result<MigrationReport, UpdateError> {
        let mut copied_files = 0;
        let mut identical_files = 0;
        let mut conflicts = Vec::new();
        for entry in &entries {
            let report = copy_tree(
                &self.legacy_root.join(entry),
                &self.data_dir.join(entry),
                ExistingFile::Keep,
            )
            .map_err(|err| UpdateError::migration(format!("copy {entry}: {err:#}")))?;
            copied_files += report.copied;
            identical_files += report.identical;
            conflicts.extend(report.conflicts);
        }

        if let Some(missing) = entries
            .iter()
            .find(|entry| !self.data_dir.join(entry.as_str()).exists())
        {
            return Err(UpdateError::migration(format!(
                "{missing} is missing from {} after copy",
                self.data_dir.display()
            )));
        }

        for conflict in &conflicts {
            warn!(
                path = %conflict.display(),
                "kept existing file; legacy copy differs and stays in the backup"
            );
        }

        let completed_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| UpdateError::migration(format!("format completion time: {err}")))?;
        let marker = MigrationMarker {
            completed_at: completed_at.clone(),
            legacy_root: self.legacy_root.clone(),
            entries: entries.clone(),
            copied_files,
            backup_path: backup_path.to_path_buf(),
            conflicts: conflicts.clone(),
        };
        self.write_marker(&marker)
            .map_err(|err| UpdateError::migration(format!("{err:#}")))?;

        info!(
            copied = copied_files,
            identical = identical_files,
            conflicts = conflicts.len(),
            "migration completed"
        );
        Ok(MigrationReport {
            state: MigrationState {
                status: MigrationStatus::Completed,
                backup_path: Some(backup_path.to_path_buf()),
                completed_at: Some(completed_at),
            },
            entries,
            copied_files,
            identical_files,
            conflicts,
        })
    }

    fn backup(&self, entries: &[String]) -> Result<PathBuf, UpdateError> {
        let backup_path = unique_backup_path(&self.backup_root);
        if let Err(err) = self.copy_and_verify_backup(entries, &backup_path) {
            let _ = fs::remove_dir_all(&backup_path);
            return Err(UpdateError::migration(format!(
                "back up legacy data: {err:#}"
            )));
        }
        Ok(backup_path)
    }

    fn copy_and_verify_backup(&self, entries: &[String], backup_path: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(backup_path)
            .with_context(|| format!("create backup directory {}", backup_path.display()))?;
        for entry in entries {
            copy_tree(
                &self.legacy_root.join(entry),
                &backup_path.join(entry),
                ExistingFile::Overwrite,
            )?;
        }
        for entry in entries {
            if let Some(mismatch) =
                find_mismatch(&self.legacy_root.join(entry), &backup_path.join(entry))?
            {
                bail!("backup differs from legacy data at {}", mismatch.display());
            }
        }
        Ok(())
    }

    fn write_marker(&self, marker: &MigrationMarker) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(marker).context("serialize migration marker")?;
        write_atomic(&self.marker_path(), data.as_bytes()).context("write migration marker")
    }
}

fn unique_backup_path(root: &Path) -> PathBuf {
    let stamp = backup_timestamp(OffsetDateTime::now_utc());
    let base = root.join(format!("{BACKUP_PREFIX}{stamp}"));
    if !base.exists() {
        return base;
    }
    (1u32..)
        .map(|n| root.join(format!("{BACKUP_PREFIX}{stamp}-{n}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

fn backup_timestamp(now: OffsetDateTime) -> String {
    time::format_description::parse("[year]-[month]-[day]-[hour]-[minute]-[second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}
